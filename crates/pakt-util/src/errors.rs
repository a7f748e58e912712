use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all pakt operations.
#[derive(Debug, Error, Diagnostic)]
pub enum PaktError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed package manifest: bad pattern syntax, missing
    /// identity fields (name/version/uid), or a version that isn't semver.
    #[error("Manifest error: {message}")]
    #[diagnostic(help("Check the package manifest for missing or malformed fields"))]
    Manifest { message: String },

    /// Dependency resolution failed.
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// No published version satisfies the requested range.
    #[error("No version of {name} satisfies {range}")]
    #[diagnostic(help("Pick one of the published versions or widen the range"))]
    Conflict {
        name: String,
        range: String,
        available: Vec<String>,
    },

    /// Hoisting recursion exceeded the dependency depth guard, which means
    /// the dependency graph is pathological or was built incorrectly.
    #[error("Dependency chain at {key} exceeds maximum depth of {depth}")]
    CycleDepth { key: String, depth: usize },

    /// Network request failed after exhausting retries.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Internal invariant broken. This is a bug, not a user error.
    #[error("Internal invariant violated: {message}")]
    Invariant { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type PaktResult<T> = miette::Result<T>;
