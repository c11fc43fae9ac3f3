//! Opening files as lazy datasets.
//!
//! An [`ArrayBackend`] opens one file ([`ArrayBackend::open_dataset`]) or
//! several files merged into one dataset ([`ArrayBackend::open_mfdataset`]).
//! Only headers are read when opening, values are read when asked for.
//!
//! [`Engines`] is the backend used by default, it dispatches on the `engine`
//! option to the NetCDF (`netcdf4`) or HDF5 (`h5netcdf`) reader.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::combine::{combine_by_coords, combine_nested};
use crate::dataset::Dataset;
use crate::options::{Chunks, OpenOptions};

pub mod hdf5;
#[cfg(feature = "netcdf")]
pub mod netcdf;

/// Version of an array backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

const fn parse_component(s: &str) -> u64 {
    let b = s.as_bytes();
    let mut v = 0;
    let mut i = 0;
    while i < b.len() {
        v = v * 10 + (b[i] - b'0') as u64;
        i += 1;
    }
    v
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Version {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// Version of the backends in this crate.
    pub const CURRENT: Version = Version::new(
        parse_component(env!("CARGO_PKG_VERSION_MAJOR")),
        parse_component(env!("CARGO_PKG_VERSION_MINOR")),
        parse_component(env!("CARGO_PKG_VERSION_PATCH")),
    );
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    /// Parses `major[.minor[.patch]]`, ignoring any pre-release or build suffix.
    fn from_str(s: &str) -> Result<Version, anyhow::Error> {
        let core = s.split(['-', '+']).next().unwrap_or(s);
        let mut c = core.split('.').map(|p| {
            p.parse::<u64>()
                .map_err(|_| anyhow!("invalid version: '{s}'"))
        });

        let major = c.next().ok_or_else(|| anyhow!("empty version"))??;
        let minor = c.next().transpose()?.unwrap_or(0);
        let patch = c.next().transpose()?.unwrap_or(0);
        ensure!(c.next().is_none(), "invalid version: '{s}'");

        Ok(Version::new(major, minor, patch))
    }
}

/// First version where every variable records the file it was opened from in
/// [`Encoding::source`](crate::dataset::Encoding::source).
pub const SOURCE_ENCODING_SINCE: Version = Version::new(0, 11, 2);

/// Hook run on the dataset of each file before merging.
pub type Preprocess<'a> = dyn Fn(Dataset) -> anyhow::Result<Dataset> + 'a;

/// How datasets of several files are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// In the order of the files, along `concat_dim`.
    Nested,
    /// In the order of the dimension coordinate which differs between files.
    #[default]
    ByCoords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Engine {
    #[serde(rename = "netcdf4")]
    Netcdf4,
    #[serde(rename = "h5netcdf", alias = "hdf5")]
    H5netcdf,
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Netcdf4 => "netcdf4",
            Engine::H5netcdf => "h5netcdf",
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        if cfg!(feature = "netcdf") {
            Engine::Netcdf4
        } else {
            Engine::H5netcdf
        }
    }
}

/// Options understood when opening a single file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetKwargs {
    #[serde(default)]
    pub engine: Option<Engine>,

    #[serde(default)]
    pub drop_variables: Vec<String>,
}

/// Options understood when opening several files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MfDatasetKwargs {
    #[serde(default)]
    pub engine: Option<Engine>,

    #[serde(default)]
    pub drop_variables: Vec<String>,

    #[serde(default)]
    pub concat_dim: Option<String>,

    #[serde(default)]
    pub combine: Combine,

    /// Open the files in parallel.
    #[serde(default)]
    pub parallel: bool,
}

/// Keys only used for merging, not passed on to the open call of each file.
const MERGE_KEYS: &[&str] = &["concat_dim", "combine", "parallel"];

pub trait ArrayBackend: Send + Sync {
    fn version(&self) -> Version;

    /// Open a single file.
    fn open_dataset(
        &self,
        path: &Path,
        chunks: Option<&Chunks>,
        options: &OpenOptions,
    ) -> anyhow::Result<Dataset>;

    /// Open several files and merge them into one dataset.
    fn open_mfdataset(
        &self,
        paths: &[PathBuf],
        chunks: Option<&Chunks>,
        options: &OpenOptions,
        preprocess: Option<&Preprocess>,
    ) -> anyhow::Result<Dataset> {
        open_and_combine(self, paths, chunks, options, preprocess)
    }
}

/// Open every file with `backend`, run `preprocess` on each in order and
/// combine them as requested in `options`.
pub fn open_and_combine<B>(
    backend: &B,
    paths: &[PathBuf],
    chunks: Option<&Chunks>,
    options: &OpenOptions,
    preprocess: Option<&Preprocess>,
) -> anyhow::Result<Dataset>
where
    B: ArrayBackend + ?Sized,
{
    let kwargs: MfDatasetKwargs = options.parse()?;
    ensure!(!paths.is_empty(), "no files to open");

    let per_file = options.without(MERGE_KEYS);
    let open = |p: &PathBuf| backend.open_dataset(p, chunks, &per_file);

    let fragments = if kwargs.parallel {
        paths.par_iter().map(open).collect::<anyhow::Result<Vec<_>>>()?
    } else {
        paths.iter().map(open).collect::<anyhow::Result<Vec<_>>>()?
    };

    let fragments = match preprocess {
        Some(f) => fragments
            .into_iter()
            .map(f)
            .collect::<anyhow::Result<Vec<_>>>()?,
        None => fragments,
    };

    match kwargs.combine {
        Combine::Nested => {
            let dim = kwargs
                .concat_dim
                .ok_or_else(|| anyhow!("concat_dim is required when combine is 'nested'"))?;
            combine_nested(fragments, &dim)
        }
        Combine::ByCoords => {
            if let Some(dim) = kwargs.concat_dim {
                log::warn!("concat_dim '{dim}' has no effect when combine is 'by_coords'");
            }
            combine_by_coords(fragments)
        }
    }
}

/// Opens files with the engine named in the `engine` option.
#[derive(Debug, Default, Clone, Copy)]
pub struct Engines;

impl ArrayBackend for Engines {
    fn version(&self) -> Version {
        Version::CURRENT
    }

    fn open_dataset(
        &self,
        path: &Path,
        chunks: Option<&Chunks>,
        options: &OpenOptions,
    ) -> anyhow::Result<Dataset> {
        let kwargs: DatasetKwargs = options.parse()?;
        let engine = kwargs.engine.unwrap_or_default();

        log::debug!("opening {} with {}", path.display(), engine.name());

        let ds = match engine {
            #[cfg(feature = "netcdf")]
            Engine::Netcdf4 => netcdf::open(path)?,
            #[cfg(not(feature = "netcdf"))]
            Engine::Netcdf4 => return Err(anyhow!("engine 'netcdf4' requires the 'netcdf' feature")),
            Engine::H5netcdf => hdf5::open(path)?,
        };

        let ds = ds.drop_vars(&kwargs.drop_variables);

        match chunks {
            Some(chunks) => ds.map_variables(|_, v| v.with_chunks(chunks)),
            None => Ok(ds),
        }
    }
}
