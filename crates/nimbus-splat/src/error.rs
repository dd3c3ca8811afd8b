use thiserror::Error;

/// Failure while turning a `.ply` file into a [`crate::SplatDataset`].
///
/// These are the only recoverable errors in the crate: they surface before
/// any sorting state exists, so the caller can print a diagnostic and exit.
/// Once a dataset has been constructed, the sort engine and scheduler treat
/// internal inconsistencies as fatal (they panic).
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not a binary little-endian PLY 1.0 file")]
    UnsupportedFormat,

    #[error("malformed PLY header: {0}")]
    BadHeader(String),

    #[error("PLY property `{0}` does not exist")]
    MissingProperty(String),

    #[error("PLY property `{name}` has type {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        found: &'static str,
        expected: &'static str,
    },

    #[error("file body holds {actual} bytes, header promises {expected}")]
    Truncated { expected: usize, actual: usize },
}
