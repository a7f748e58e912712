//! Dependency pattern parsing.
//!
//! A pattern is the opaque string key used throughout resolution, usually
//! `name@range` (`left-pad@^1.0.0`) but also scoped (`@types/node@*`) or
//! exotic (`foo@file:../foo`).

/// A pattern split into its package name and requested range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternParts {
    pub name: String,
    pub range: String,
}

/// Split a pattern into name and range.
///
/// A bare name gets the `latest` range; a trailing `@` with nothing after
/// it means any version. Scoped names keep their leading `@`.
pub fn normalize_pattern(pattern: &str) -> PatternParts {
    let mut name = pattern;
    let mut range = "latest".to_string();

    // strip the scope marker so the name/range split below doesn't see it
    let is_scoped = name.starts_with('@');
    if is_scoped {
        name = &name[1..];
    }

    if let Some(at) = name.find('@') {
        let (head, tail) = name.split_at(at);
        range = match &tail[1..] {
            "" => "*".to_string(),
            rest => rest.to_string(),
        };
        name = head;
    }

    let name = if is_scoped {
        format!("@{name}")
    } else {
        name.to_string()
    };

    PatternParts { name, range }
}

/// Rebuild a pattern from a name and range.
pub fn make_pattern(name: &str, range: &str) -> String {
    format!("{name}@{range}")
}
