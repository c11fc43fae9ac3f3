//! The `netcdf4` engine, reading through the NetCDF C library.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ndarray::{ArrayD, IxDyn};

use super::Engine;
use crate::dataset::{AttrValue, Dataset, Datatype, Encoding, ReadArray, Variable};

/// A variable in a NetCDF file, read on demand.
#[derive(Debug)]
pub struct NetcdfArray {
    path: PathBuf,
    name: String,
    shape: Vec<usize>,
}

impl ReadArray for NetcdfArray {
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

        let file = netcdf::open(&self.path)?;
        let var = file
            .variable(&self.name)
            .ok_or_else(|| anyhow!("{}: no variable '{}'", self.path.display(), self.name))?;

        let values = if self.shape.is_empty() {
            var.get_values::<f64, _>(..)?
        } else {
            let extents = start
                .iter()
                .zip(count)
                .map(|(&s, &c)| s..s + c)
                .collect::<Vec<_>>();
            var.get_values::<f64, _>(extents)?
        };

        Ok(ArrayD::from_shape_vec(IxDyn(count), values)?)
    }
}

fn attribute(a: &netcdf::Attribute) -> Option<AttrValue> {
    use netcdf::AttributeValue as A;

    Some(match a.value().ok()? {
        A::Str(s) => AttrValue::Str(s),
        A::Strs(s) => AttrValue::Strs(s),
        A::Double(v) => AttrValue::Float(v),
        A::Float(v) => AttrValue::Float(v.into()),
        A::Doubles(v) => AttrValue::Floats(v),
        A::Floats(v) => AttrValue::Floats(v.into_iter().map(f64::from).collect()),
        A::Schar(v) => AttrValue::Int(v.into()),
        A::Uchar(v) => AttrValue::Int(v.into()),
        A::Short(v) => AttrValue::Int(v.into()),
        A::Ushort(v) => AttrValue::Int(v.into()),
        A::Int(v) => AttrValue::Int(v.into()),
        A::Uint(v) => AttrValue::Int(v.into()),
        A::Longlong(v) => AttrValue::Int(v),
        A::Shorts(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        A::Ints(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        A::Longlongs(v) => AttrValue::Ints(v),
        _ => return None,
    })
}

fn attributes<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> BTreeMap<String, AttrValue> {
    attrs
        .filter_map(|a| attribute(&a).map(|v| (a.name().to_string(), v)))
        .collect()
}

/// Open the NetCDF file at `path`. Only the header is read, variables are
/// read when their values are asked for.
///
/// A one-dimensional variable named after its dimension is a coordinate.
/// Non-numeric variables are skipped.
pub fn open(path: &Path) -> anyhow::Result<Dataset> {
    let file = netcdf::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let encoding = Encoding {
        source: Some(path.to_path_buf()),
        engine: Some(Engine::Netcdf4.name().to_string()),
    };

    let mut ds = Dataset::new();

    for var in file.variables() {
        let name = var.name();
        let dtype = Datatype::from(var.vartype());

        if !dtype.is_numeric() {
            log::debug!("{}: skipping non-numeric variable '{name}'", path.display());
            continue;
        }

        let dims = var.dimensions().iter().map(|d| d.name()).collect::<Vec<_>>();
        let shape = var.dimensions().iter().map(|d| d.len()).collect::<Vec<_>>();
        let is_coord = dims.len() == 1 && dims[0] == name;

        let reader = Arc::new(NetcdfArray {
            path: path.to_path_buf(),
            name: name.clone(),
            shape,
        });

        let v = Variable::lazy(dims, dtype, reader)?
            .with_attrs(attributes(var.attributes()))
            .with_encoding(encoding.clone());

        if is_coord {
            ds.add_coord(name, v)?;
        } else {
            ds.add_data_var(name, v)?;
        }
    }

    ds.set_attrs(attributes(file.attributes()));

    Ok(ds)
}
