//! npm version range helpers layered over the `semver` crate.
//!
//! npm metadata is loose in ways `semver` is not: versions carry leading
//! `v` or `=`, comparator sets are space-separated instead of
//! comma-separated, hyphen ranges (`1.2 - 2.0`) exist, and `||` joins
//! alternatives. This module normalizes all of that before delegating the
//! actual satisfaction arithmetic to `semver`.

use semver::{Version, VersionReq};

use pakt_util::errors::{PaktError, PaktResult};

/// Parse a concrete version string leniently.
pub fn parse_version(version: &str) -> PaktResult<Version> {
    let cleaned = version.trim().trim_start_matches('=').trim_start_matches('v');
    Version::parse(cleaned).map_err(|e| {
        PaktError::Manifest {
            message: format!("Invalid version '{version}': {e}"),
        }
        .into()
    })
}

/// True when the range matches anything: a wildcard or the `latest` tag.
pub fn is_wildcard(range: &str) -> bool {
    matches!(range.trim(), "" | "*" | "latest" | "x")
}

/// Check whether a concrete version satisfies an npm range.
///
/// `||` alternatives are satisfied when any branch matches. A branch that
/// fails to parse satisfies nothing.
pub fn satisfies(version: &Version, range: &str) -> bool {
    if is_wildcard(range) {
        return true;
    }
    range
        .split("||")
        .any(|branch| matches!(parse_range(branch), Ok(req) if req.matches(version)))
}

/// Pick the highest version from `candidates` satisfying `range`.
pub fn max_satisfying<'a, I>(candidates: I, range: &str) -> Option<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    candidates
        .into_iter()
        .filter(|v| satisfies(v, range))
        .max()
}

/// Parse one range branch (no `||`) into a `VersionReq`.
fn parse_range(branch: &str) -> Result<VersionReq, semver::Error> {
    let branch = branch.trim();
    if is_wildcard(branch) {
        return VersionReq::parse("*");
    }

    // hyphen range: `1.2.3 - 2.3.4` means `>=1.2.3, <=2.3.4`
    if let Some((lower, upper)) = branch.split_once(" - ") {
        return VersionReq::parse(&format!(">={}, <={}", lower.trim(), upper.trim()));
    }

    // npm separates comparators with spaces; semver wants commas
    let comparators: Vec<String> = branch
        .split_whitespace()
        .map(normalize_comparator)
        .collect();
    VersionReq::parse(&comparators.join(", "))
}

/// Bridge npm's bare-version semantics onto the `semver` crate, which
/// reads `1.2.3` as `^1.2.3`. npm treats `1.2.3` as an exact pin and
/// `1.2` as `1.2.x`.
fn normalize_comparator(token: &str) -> String {
    if Version::parse(token).is_ok() {
        return format!("={token}");
    }
    let mut parts = token.splitn(2, '.');
    let is_partial_numeric = parts.next().is_some_and(|s| {
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
    }) && parts
        .next()
        .is_some_and(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));
    if is_partial_numeric {
        return format!("~{token}");
    }
    token.to_string()
}
