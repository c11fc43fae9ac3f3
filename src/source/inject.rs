use crate::backend::{Version, SOURCE_ENCODING_SINCE};
use crate::dataset::{Dataset, Variable};
use crate::error::SourceError;
use crate::pattern::{self, reverse_format};

/// Adds the fields of a path pattern as scalar coordinates to the dataset
/// opened from a path matching it.
#[derive(Debug, Clone)]
pub struct PathCoordinates {
    pattern: String,
}

impl PathCoordinates {
    /// Fails if a backend of version `backend` does not record the file each
    /// variable was read from, or if `pattern` is malformed.
    pub fn new<S: Into<String>>(pattern: S, backend: Version) -> Result<PathCoordinates, SourceError> {
        if backend < SOURCE_ENCODING_SINCE {
            return Err(SourceError::SourcePathUnsupported {
                found: backend,
                required: SOURCE_ENCODING_SINCE,
            });
        }

        let pattern = pattern.into();
        pattern::parse(&pattern)?;

        Ok(PathCoordinates { pattern })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The source of the first data variable is matched against the pattern.
    pub fn apply(&self, ds: Dataset) -> anyhow::Result<Dataset> {
        let (name, var) = ds.first_data_var().ok_or(SourceError::NoDataVariables)?;
        let source = var
            .source()
            .ok_or_else(|| SourceError::MissingSource {
                variable: name.clone(),
            })?;

        let fields = reverse_format(&self.pattern, &source.to_string_lossy())?;
        log::debug!("{}: adding coordinates {fields:?}", source.display());

        ds.assign_coords(fields.into_iter().map(|(k, v)| (k, Variable::scalar(v))))
    }
}
