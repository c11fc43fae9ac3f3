//! Data sources opening datasets from NetCDF and HDF5 files.
//!
//! ```no_run
//! use ncsource::prelude::*;
//!
//! let mut source = NetCDFSource::new("data/air_{year}.nc")
//!     .with_chunks(Chunks::Uniform(10))
//!     .with_concat_dim("year");
//!
//! let ds = source.to_dask()?;
//! println!("{:?}", ds.coords()["year"].values()?);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::fmt;

use crate::backend::{ArrayBackend, Engines, Preprocess, Version};
use crate::dataset::{Dataset, Values};
use crate::error::SourceError;
use crate::fs::{FileSystem, LocalFileSystem};
use crate::options::{Chunks, Metadata, OpenOptions, PathAsPattern, PathSpec, SourceArgs, StorageOptions};
use crate::pattern::{has_fields, path_to_glob};

mod inject;
mod schema;

pub use inject::PathCoordinates;
pub use schema::Schema;

pub trait DataSource {
    fn name(&self) -> &'static str;

    /// Kind of object produced.
    fn container(&self) -> &'static str;

    fn version(&self) -> Version;

    fn metadata(&self) -> &Metadata;

    /// Open the dataset if needed and describe it.
    fn discover(&mut self) -> anyhow::Result<Schema>;

    /// The lazily read dataset. Opened on first call, the same dataset is
    /// returned afterwards.
    fn to_dask(&mut self) -> anyhow::Result<&Dataset>;

    /// The dataset with all values read into memory.
    fn read(&mut self) -> anyhow::Result<Dataset>;
}

/// Opens one or several NetCDF files as a single dataset.
///
/// A path containing `*`, or a list of paths, is opened as several files
/// concatenated along `concat_dim`. Format fields in the path
/// (`air_{year}.nc`) are globbed to find the files, and their values in each
/// file name are added as coordinates.
pub struct NetCDFSource {
    args: SourceArgs,
    fs: Box<dyn FileSystem>,
    backend: Box<dyn ArrayBackend>,
    ds: Option<Dataset>,
}

impl fmt::Debug for NetCDFSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetCDFSource")
            .field("args", &self.args)
            .field("backend", &self.backend.version())
            .field("open", &self.ds.is_some())
            .finish_non_exhaustive()
    }
}

impl NetCDFSource {
    pub fn new<P: Into<PathSpec>>(urlpath: P) -> NetCDFSource {
        NetCDFSource {
            args: SourceArgs::new(urlpath),
            fs: Box::new(LocalFileSystem),
            backend: Box::new(Engines),
            ds: None,
        }
    }

    /// Source from the arguments of a catalog entry. Fails if the path
    /// pattern is malformed.
    pub fn from_args(args: SourceArgs) -> anyhow::Result<NetCDFSource> {
        let source = NetCDFSource {
            args,
            ..NetCDFSource::new(Vec::<String>::new())
        };
        source.resolve()?;

        Ok(source)
    }

    #[must_use]
    pub fn with_chunks(mut self, chunks: Chunks) -> NetCDFSource {
        self.args.chunks = Some(chunks);
        self
    }

    #[must_use]
    pub fn with_concat_dim<S: Into<String>>(mut self, dim: S) -> NetCDFSource {
        self.args.concat_dim = dim.into();
        self
    }

    #[must_use]
    pub fn with_xarray_kwargs(mut self, kwargs: OpenOptions) -> NetCDFSource {
        self.args.xarray_kwargs = kwargs;
        self
    }

    #[must_use]
    pub fn with_path_as_pattern(mut self, path_as_pattern: PathAsPattern) -> NetCDFSource {
        self.args.path_as_pattern = path_as_pattern;
        self
    }

    #[must_use]
    pub fn with_storage_options(mut self, storage_options: StorageOptions) -> NetCDFSource {
        self.args.storage_options = storage_options;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> NetCDFSource {
        self.args.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_filesystem<F: FileSystem + 'static>(mut self, fs: F) -> NetCDFSource {
        self.fs = Box::new(fs);
        self
    }

    #[must_use]
    pub fn with_backend<B: ArrayBackend + 'static>(mut self, backend: B) -> NetCDFSource {
        self.backend = Box::new(backend);
        self
    }

    pub fn args(&self) -> &SourceArgs {
        &self.args
    }

    pub fn original_urlpath(&self) -> &PathSpec {
        &self.args.urlpath
    }

    /// The path opened: the glob form of the path when it is a pattern.
    pub fn urlpath(&self) -> Result<PathSpec, SourceError> {
        self.resolve().map(|(urlpath, _)| urlpath)
    }

    /// Pattern the coordinates are read from, if any.
    pub fn pattern(&self) -> Result<Option<String>, SourceError> {
        self.resolve().map(|(_, pattern)| pattern)
    }

    fn resolve(&self) -> Result<(PathSpec, Option<String>), SourceError> {
        let urlpath = &self.args.urlpath;

        if !self.args.path_as_pattern.enabled() {
            return Ok((urlpath.clone(), None));
        }

        match (&self.args.path_as_pattern, urlpath) {
            (_, PathSpec::Single(s)) => {
                let glob = PathSpec::Single(path_to_glob(s)?);
                match &self.args.path_as_pattern {
                    PathAsPattern::Pattern(p) => Ok((glob, Some(p.clone()))),
                    PathAsPattern::Flag(_) => Ok((glob, has_fields(s).then(|| s.clone()))),
                }
            }
            // files in a list are opened as given
            (PathAsPattern::Pattern(p), PathSpec::Many(_)) => Ok((urlpath.clone(), Some(p.clone()))),
            (PathAsPattern::Flag(_), PathSpec::Many(_)) => Ok((urlpath.clone(), None)),
        }
    }

    fn open_dataset(&self) -> anyhow::Result<Dataset> {
        let (urlpath, pattern) = self.resolve()?;
        let chunks = self.args.chunks.as_ref();
        let mut options = self.args.xarray_kwargs.clone();

        if urlpath.is_multi() {
            options.set_default("concat_dim", self.args.concat_dim.as_str());

            let coords = pattern
                .map(|p| PathCoordinates::new(p, self.backend.version()))
                .transpose()?;

            options.set_default("combine", "nested");

            let paths = self.fs.open_local(&urlpath, &self.args.storage_options)?;
            log::debug!("opening {} files with {options}", paths.len());

            let preprocess = coords.as_ref().map(|c| move |ds: Dataset| c.apply(ds));

            self.backend.open_mfdataset(
                &paths,
                chunks,
                &options,
                preprocess.as_ref().map(|f| f as &Preprocess),
            )
        } else {
            let paths = self.fs.open_local(&urlpath, &self.args.storage_options)?;
            ensure!(
                paths.len() == 1,
                "expected a single file for {urlpath:?}, found {}",
                paths.len()
            );
            log::debug!("opening {} with {options}", paths[0].display());

            self.backend.open_dataset(&paths[0], chunks, &options)
        }
    }

    /// Values of chunk `index` of `variable`. Only the files holding the chunk
    /// are read.
    pub fn read_partition(&mut self, variable: &str, index: &[usize]) -> anyhow::Result<Values> {
        let ds = self.to_dask()?;
        let var = ds
            .variable(variable)
            .ok_or_else(|| anyhow!("no variable '{variable}'"))?;

        var.read_chunk(index)
    }

    /// Drop the dataset. To open it again, create a new source.
    pub fn close(self) {
        if self.ds.is_some() {
            log::debug!("closing {:?}", self.args.urlpath);
        }
    }
}

impl DataSource for NetCDFSource {
    fn name(&self) -> &'static str {
        "netcdf"
    }

    fn container(&self) -> &'static str {
        "xarray"
    }

    fn version(&self) -> Version {
        Version::CURRENT
    }

    fn metadata(&self) -> &Metadata {
        &self.args.metadata
    }

    fn discover(&mut self) -> anyhow::Result<Schema> {
        let schema = Schema::from(self.to_dask()?);

        for (k, v) in &schema.attrs {
            if !self.args.metadata.contains_key(k) {
                self.args.metadata.insert(k.clone(), serde_json::to_value(v)?);
            }
        }

        Ok(schema)
    }

    fn to_dask(&mut self) -> anyhow::Result<&Dataset> {
        let ds = match self.ds.take() {
            Some(ds) => ds,
            None => {
                let ds = self.open_dataset()?;
                log::info!(
                    "opened {:?}: {} data variables, dims {:?}",
                    self.args.urlpath,
                    ds.data_vars().len(),
                    ds.dims()
                );
                ds
            }
        };

        Ok(&*self.ds.insert(ds))
    }

    fn read(&mut self) -> anyhow::Result<Dataset> {
        self.to_dask()?.load()
    }
}
