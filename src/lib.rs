//! # NCSOURCE
//!
//! A data source opening one or many NetCDF (v4) or HDF5 files as a single lazily read,
//! labeled dataset.
//!
//! A [source](source::NetCDFSource) is configured with a path (possibly containing a glob
//! or format fields like `air_{year}.nc`), a chunking hint and options for the
//! [backend](backend::ArrayBackend). Nothing is read until the dataset is asked for, and then
//! only the headers of the files. Values are read when a variable, or a chunk of it, is read.
//!
//! When several files are opened they are concatenated along a dimension. Fields of a path
//! pattern are recovered from the name of each file and become coordinates of the combined
//! dataset.
//!
//! ## Usage
//!
//! ```no_run
//! use ncsource::prelude::*;
//!
//! let mut src = NetCDFSource::new("tests/data/air_{year}.nc").with_concat_dim("year");
//!
//! let schema = src.discover().unwrap();
//! println!("dims: {:?}", schema.dims);
//!
//! let air = src.to_dask().unwrap().data_vars()["air"].values().unwrap();
//! println!("air: {:?}", air);
//! ```
//!
//! Sources can also be built from the arguments of a catalog entry, see
//! [`options::SourceArgs`].

#[macro_use]
extern crate anyhow;

pub mod backend;
pub mod dataset;
pub mod error;
pub mod fs;
pub mod options;
pub mod pattern;
pub mod source;

pub mod prelude {
    pub use super::backend::{ArrayBackend, Engines, Version};
    pub use super::dataset::{Dataset, Values, Variable};
    pub use super::error::SourceError;
    pub use super::options::{Chunks, OpenOptions, PathAsPattern, PathSpec, SourceArgs};
    pub use super::source::{DataSource, NetCDFSource, Schema};
}
