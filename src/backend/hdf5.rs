//! The `h5netcdf` engine, reading HDF5 files (including NetCDF-4 files)
//! through the HDF5 library.
//!
//! Datasets in the root group become variables. HDF5 has no named
//! dimensions, these are taken from dimension scales: a dataset with a
//! `CLASS` attribute is a scale and names its own dimension. Other axes take
//! the name of the only scale of equal length, or `phony_dim_<len>`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use hdf5::types::{VarLenAscii, VarLenUnicode};
use ndarray::{ArrayD, IxDyn, Slice, SliceInfo, SliceInfoElem};

use super::Engine;
use crate::dataset::{AttrValue, Dataset, Datatype, Encoding, ReadArray, Variable};

/// Attributes describing dimension scales, not carried to the variables.
const RESERVED: &[&str] = &["CLASS", "NAME", "DIMENSION_LIST", "REFERENCE_LIST"];

#[derive(Debug)]
pub struct Hdf5Array {
    path: PathBuf,
    name: String,
    shape: Vec<usize>,
}

impl ReadArray for Hdf5Array {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn read(&self, start: &[usize], count: &[usize]) -> anyhow::Result<ArrayD<f64>> {
        ensure!(
            start.len() == self.shape.len() && count.len() == self.shape.len(),
            "{}: region does not match rank of '{}'",
            self.path.display(),
            self.name
        );

        if count.contains(&0) {
            return Ok(ArrayD::zeros(IxDyn(count)));
        }

        let hf = hdf5::File::open(&self.path)?;
        let ds = hf.dataset(&self.name)?;

        if self.shape.is_empty() {
            return Ok(ArrayD::from_elem(IxDyn(&[]), ds.read_scalar::<f64>()?));
        }

        let slice = start
            .iter()
            .zip(count)
            .map(|(&s, &n)| SliceInfoElem::from(Slice::from(s..s + n)))
            .collect::<Vec<_>>();
        let slice = SliceInfo::<_, IxDyn, IxDyn>::try_from(slice)?;

        Ok(ds.read_slice::<f64, _, IxDyn>(slice)?)
    }
}

fn attribute(a: &hdf5::Attribute) -> Option<AttrValue> {
    if !a.is_scalar() {
        return match Datatype::from(a.dtype().ok()?) {
            Datatype::Int(_) | Datatype::UInt(_) => a.read_raw::<i64>().ok().map(AttrValue::Ints),
            _ => a.read_raw::<f64>().ok().map(AttrValue::Floats),
        };
    }

    if let Ok(s) = a.read_scalar::<VarLenUnicode>() {
        return Some(AttrValue::Str(s.to_string()));
    }
    if let Ok(s) = a.read_scalar::<VarLenAscii>() {
        return Some(AttrValue::Str(s.to_string()));
    }

    match Datatype::from(a.dtype().ok()?) {
        Datatype::Int(_) | Datatype::UInt(_) => a.read_scalar::<i64>().ok().map(AttrValue::Int),
        Datatype::Float(_) => a.read_scalar::<f64>().ok().map(AttrValue::Float),
        _ => None,
    }
}

fn attributes(loc: &hdf5::Location) -> anyhow::Result<BTreeMap<String, AttrValue>> {
    Ok(loc
        .attr_names()?
        .into_iter()
        .filter(|n| !RESERVED.contains(&n.as_str()) && !n.starts_with('_'))
        .filter_map(|n| {
            let v = loc.attr(&n).ok().as_ref().and_then(attribute)?;
            Some((n, v))
        })
        .collect())
}

fn text_attr(d: &hdf5::Dataset, name: &str) -> Option<String> {
    let a = d.attr(name).ok()?;
    a.read_scalar::<VarLenUnicode>()
        .map(|s| s.to_string())
        .or_else(|_| a.read_scalar::<VarLenAscii>().map(|s| s.to_string()))
        .ok()
}

/// Dimension names of a dataset of `shape` which is not a scale.
fn dim_names(scales: &BTreeMap<String, usize>, shape: &[usize]) -> Vec<String> {
    let mut dims: Vec<String> = Vec::with_capacity(shape.len());

    for &len in shape {
        let mut matching = scales.iter().filter(|&(_, &n)| n == len);
        let name = match (matching.next(), matching.next()) {
            (Some((scale, _)), None) if !dims.contains(scale) => scale.clone(),
            _ => {
                let phony = format!("phony_dim_{len}");
                let mut name = phony.clone();
                let mut i = 0;
                while dims.contains(&name) {
                    i += 1;
                    name = format!("{phony}_{i}");
                }
                name
            }
        };
        dims.push(name);
    }

    dims
}

/// Open the HDF5 file at `path`. Only metadata is read, values are read when
/// asked for. Non-numeric datasets are skipped.
pub fn open(path: &Path) -> anyhow::Result<Dataset> {
    let hf = hdf5::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let datasets = hf
        .member_names()?
        .into_iter()
        .filter_map(|m| hf.dataset(&m).ok().map(|d| (m, d)))
        .collect::<Vec<_>>();

    let scales = datasets
        .iter()
        .filter(|(_, d)| d.ndim() == 1 && text_attr(d, "CLASS").as_deref() == Some("DIMENSION_SCALE"))
        .map(|(m, d)| (m.clone(), d.shape()[0]))
        .collect::<BTreeMap<_, _>>();

    let encoding = Encoding {
        source: Some(path.to_path_buf()),
        engine: Some(Engine::H5netcdf.name().to_string()),
    };

    let mut ds = Dataset::new();

    for (name, d) in &datasets {
        let dtype = Datatype::from(d.dtype()?);
        if !dtype.is_numeric() {
            log::debug!("{}: skipping non-numeric dataset '{name}'", path.display());
            continue;
        }

        let is_scale = scales.contains_key(name);

        // netCDF-4 dimensions without a variable
        if is_scale
            && text_attr(d, "NAME").is_some_and(|n| n.starts_with("This is a netCDF dimension"))
        {
            continue;
        }

        let shape = d.shape();
        let dims = if is_scale {
            vec![name.clone()]
        } else {
            dim_names(&scales, &shape)
        };

        let reader = Arc::new(Hdf5Array {
            path: path.to_path_buf(),
            name: name.clone(),
            shape,
        });

        let v = Variable::lazy(dims, dtype, reader)?
            .with_attrs(attributes(d)?)
            .with_encoding(encoding.clone());

        if is_scale {
            ds.add_coord(name.clone(), v)?;
        } else {
            ds.add_data_var(name.clone(), v)?;
        }
    }

    ds.set_attrs(attributes(&hf)?);

    Ok(ds)
}
