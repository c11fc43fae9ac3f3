//! Print the schema of a NetCDF source as JSON.

#[macro_use]
extern crate anyhow;

use std::path::PathBuf;

use clap::Parser;
use serde::de::DeserializeOwned;

use ncsource::options::{PathSpec, StorageOptions};
use ncsource::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "ncsource")]
#[command(about = "Open NetCDF or HDF5 files as one dataset and print its schema")]
struct Args {
    /// Path(s) to the file(s). May contain `*` or format fields like `{year}`.
    urlpath: Vec<String>,

    /// Chunk size, or chunk sizes per dimension as JSON (`{"time": 10}`).
    #[arg(long)]
    chunks: Option<String>,

    /// Dimension to concatenate multiple files along.
    #[arg(long)]
    concat_dim: Option<String>,

    /// Pattern to read coordinates from, instead of the path.
    #[arg(long, conflicts_with = "no_pattern")]
    pattern: Option<String>,

    /// Do not treat the path as a pattern.
    #[arg(long)]
    no_pattern: bool,

    /// Options for the backend as a JSON object.
    #[arg(long)]
    kwargs: Option<String>,

    /// Options for the filesystem as a JSON object.
    #[arg(long)]
    storage_options: Option<String>,

    /// Read the arguments of the source from a JSON file, other flags override them.
    #[arg(long)]
    args: Option<PathBuf>,

    /// Read every variable.
    #[arg(long)]
    load: bool,
}

fn json<T: DeserializeOwned>(flag: &str, s: &str) -> anyhow::Result<T> {
    serde_json::from_str(s).map_err(|e| anyhow!("invalid --{flag}: {e}"))
}

fn source_args(args: Args) -> anyhow::Result<(SourceArgs, bool)> {
    let mut sargs = match &args.args {
        Some(p) => serde_json::from_reader(std::fs::File::open(p)?)?,
        None => {
            ensure!(!args.urlpath.is_empty(), "no urlpath given");
            SourceArgs::new(PathSpec::Single(String::new()))
        }
    };

    match args.urlpath.len() {
        0 => {}
        1 => sargs.urlpath = PathSpec::from(args.urlpath[0].clone()),
        _ => sargs.urlpath = PathSpec::from(args.urlpath),
    }

    if let Some(c) = &args.chunks {
        sargs.chunks = Some(json("chunks", c)?);
    }
    if let Some(d) = args.concat_dim {
        sargs.concat_dim = d;
    }
    if let Some(p) = args.pattern {
        sargs.path_as_pattern = PathAsPattern::Pattern(p);
    }
    if args.no_pattern {
        sargs.path_as_pattern = PathAsPattern::Flag(false);
    }
    if let Some(k) = &args.kwargs {
        sargs.xarray_kwargs = json::<OpenOptions>("kwargs", k)?;
    }
    if let Some(s) = &args.storage_options {
        sargs.storage_options = json::<StorageOptions>("storage-options", s)?;
    }

    Ok((sargs, args.load))
}

fn main() -> Result<(), anyhow::Error> {
    let (args, load) = source_args(Args::parse())?;

    let mut src = NetCDFSource::from_args(args)?;
    let schema = src.discover()?;

    println!("{}", serde_json::to_string_pretty(&schema)?);

    if load {
        let ds = src.read()?;
        for (name, var) in ds.variables() {
            println!("{name}: {:?}", var.shape());
        }
    }

    Ok(())
}
