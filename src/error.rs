use thiserror::Error;

use crate::backend::Version;

/// Conditions detected by the source itself. Everything else raised while
/// opening (I/O, format, option types) is passed through as-is.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backend does not record the originating file of each variable, so
    /// coordinates cannot be derived from paths.
    #[error(
        "array backend version is '{found}'. Recording the source path of variables was \
         added in {required}, so pattern urlpaths are not supported"
    )]
    SourcePathUnsupported { found: Version, required: Version },

    #[error("resolved path '{path}' does not match pattern '{pattern}': {reason}")]
    PatternMismatch {
        pattern: String,
        path: String,
        reason: String,
    },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("dataset has no data variables to read a source path from")]
    NoDataVariables,

    #[error("no source path recorded for variable '{variable}'")]
    MissingSource { variable: String },
}
