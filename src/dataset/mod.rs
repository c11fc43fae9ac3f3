//! A labeled collection of lazily read arrays.
//!
//! Opening files produces a [`Dataset`] of [`Variable`]s whose data stays in the
//! files until it is asked for. Datasets opened from several files are combined
//! with the functions in [`combine`].

use std::collections::BTreeMap;

pub mod combine;
mod types;
mod values;
mod variable;

pub use types::*;
pub use values::*;
pub use variable::*;

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    dims: BTreeMap<String, usize>,
    coords: BTreeMap<String, Variable>,
    data_vars: BTreeMap<String, Variable>,
    attrs: BTreeMap<String, AttrValue>,
}

impl Dataset {
    pub fn new() -> Dataset {
        Dataset::default()
    }

    fn add_dims(&mut self, name: &str, var: &Variable) -> anyhow::Result<()> {
        for (dim, &len) in var.dims().iter().zip(var.shape()) {
            match self.dims.get(dim) {
                Some(&n) if n != len => {
                    return Err(anyhow!(
                        "variable '{name}' has length {len} along '{dim}', dataset has {n}"
                    ))
                }
                Some(_) => {}
                None => {
                    self.dims.insert(dim.clone(), len);
                }
            }
        }

        Ok(())
    }

    pub fn add_data_var<S: Into<String>>(&mut self, name: S, var: Variable) -> anyhow::Result<()> {
        let name = name.into();
        ensure!(
            !self.coords.contains_key(&name),
            "'{name}' is already a coordinate"
        );

        self.add_dims(&name, &var)?;
        self.data_vars.insert(name, var);
        Ok(())
    }

    /// Add or replace a coordinate. A data variable of the same name becomes
    /// the coordinate.
    pub fn add_coord<S: Into<String>>(&mut self, name: S, var: Variable) -> anyhow::Result<()> {
        let name = name.into();

        self.add_dims(&name, &var)?;
        self.data_vars.remove(&name);
        self.coords.insert(name, var);
        Ok(())
    }

    /// Add or replace several coordinates.
    pub fn assign_coords<I, S>(mut self, coords: I) -> anyhow::Result<Dataset>
    where
        I: IntoIterator<Item = (S, Variable)>,
        S: Into<String>,
    {
        for (name, var) in coords {
            self.add_coord(name, var)?;
        }

        Ok(self)
    }

    pub fn set_attr<K: Into<String>, V: Into<AttrValue>>(&mut self, key: K, value: V) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn set_attrs(&mut self, attrs: BTreeMap<String, AttrValue>) {
        self.attrs = attrs;
    }

    pub fn dims(&self) -> &BTreeMap<String, usize> {
        &self.dims
    }

    pub fn coords(&self) -> &BTreeMap<String, Variable> {
        &self.coords
    }

    pub fn data_vars(&self) -> &BTreeMap<String, Variable> {
        &self.data_vars
    }

    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    /// Data variable or coordinate named `name`.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.data_vars.get(name).or_else(|| self.coords.get(name))
    }

    /// All variables, data variables first.
    pub fn variables(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.data_vars.iter().chain(self.coords.iter())
    }

    /// The first data variable by name.
    pub fn first_data_var(&self) -> Option<(&String, &Variable)> {
        self.data_vars.iter().next()
    }

    /// Coordinates which label `var`: those whose dimensions all belong to it.
    pub fn coords_of(&self, var: &Variable) -> Vec<String> {
        self.coords
            .iter()
            .filter(|(_, c)| c.dims().iter().all(|d| var.dims().contains(d)))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Without the variables in `names`. Dimensions no longer used are dropped.
    #[must_use]
    pub fn drop_vars(mut self, names: &[String]) -> Dataset {
        for n in names {
            self.data_vars.remove(n);
            self.coords.remove(n);
        }

        self.dims.retain(|d, _| {
            self.data_vars
                .values()
                .chain(self.coords.values())
                .any(|v| v.dims().contains(d))
        });

        self
    }

    /// Chunk sizes along each chunked dimension.
    pub fn chunks(&self) -> BTreeMap<String, Vec<usize>> {
        let mut chunks = BTreeMap::new();

        for (_, var) in self.variables() {
            if let Some(c) = var.chunks() {
                for (dim, sizes) in var.dims().iter().zip(c) {
                    chunks.entry(dim.clone()).or_insert_with(|| sizes.clone());
                }
            }
        }

        chunks
    }

    /// Replace every variable by `f(name, variable)`. `f` must keep dimensions.
    pub fn map_variables<F>(self, mut f: F) -> anyhow::Result<Dataset>
    where
        F: FnMut(&str, Variable) -> anyhow::Result<Variable>,
    {
        let mut out = Dataset {
            dims: self.dims,
            attrs: self.attrs,
            ..Dataset::default()
        };

        for (k, v) in self.coords {
            let v = f(&k, v)?;
            out.coords.insert(k, v);
        }
        for (k, v) in self.data_vars {
            let v = f(&k, v)?;
            out.data_vars.insert(k, v);
        }

        Ok(out)
    }

    pub fn is_lazy(&self) -> bool {
        self.variables().any(|(_, v)| v.is_lazy())
    }

    /// A copy with all values read into memory.
    pub fn load(&self) -> anyhow::Result<Dataset> {
        let load = |m: &BTreeMap<String, Variable>| {
            m.iter()
                .map(|(k, v)| v.load().map(|v| (k.clone(), v)))
                .collect::<anyhow::Result<BTreeMap<_, _>>>()
        };

        Ok(Dataset {
            dims: self.dims.clone(),
            coords: load(&self.coords)?,
            data_vars: load(&self.data_vars)?,
            attrs: self.attrs.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::FieldValue;
    use ndarray::{arr1, arr2};

    pub(crate) fn air(source: &str, time: &[f64]) -> Dataset {
        let n = time.len();
        let mut ds = Dataset::new();

        let values = ndarray::Array::from_shape_fn((n, 2), |(t, x)| (t * 10 + x) as f64).into_dyn();
        ds.add_data_var(
            "air",
            Variable::from_values(["time", "x"], Values::Float(values))
                .unwrap()
                .with_source(source),
        )
        .unwrap();
        ds.add_coord(
            "time",
            Variable::from_values(["time"], Values::Float(arr1(time).into_dyn()))
                .unwrap()
                .with_source(source),
        )
        .unwrap();
        ds.set_attr("title", "air");

        ds
    }

    #[test]
    fn dims_must_agree() {
        let mut ds = air("a.nc", &[0., 1.]);

        let bad = Variable::from_values(["time"], Values::Float(arr1(&[1., 2., 3.]).into_dyn())).unwrap();
        assert!(ds.add_data_var("bad", bad).is_err());

        assert_eq!(ds.dims()["time"], 2);
        assert_eq!(ds.dims()["x"], 2);
    }

    #[test]
    fn assign_scalar_coords() {
        let ds = air("a.nc", &[0.])
            .assign_coords([("year", Variable::scalar(FieldValue::Str("1999".into())))])
            .unwrap();

        let year = ds.coords().get("year").unwrap();
        assert_eq!(year.ndim(), 0);
        assert_eq!(
            year.values().unwrap(),
            Values::from(FieldValue::Str("1999".into()))
        );
        assert_eq!(ds.coords_of(&ds.data_vars()["air"]), vec!["time", "year"]);
    }

    #[test]
    fn coordinate_replaces_data_var() {
        let mut ds = air("a.nc", &[0.]);
        ds.add_coord(
            "air",
            Variable::from_values(["time", "x"], Values::Float(arr2(&[[0., 0.]]).into_dyn())).unwrap(),
        )
        .unwrap();

        assert!(ds.data_vars().is_empty());
        assert!(ds.first_data_var().is_none());
    }

    #[test]
    fn drop_unused_dims() {
        let ds = air("a.nc", &[0., 1.]).drop_vars(&["air".to_string()]);
        assert!(ds.dims().contains_key("time"));
        assert!(!ds.dims().contains_key("x"));
    }

    #[test]
    fn load_in_memory() {
        let ds = air("a.nc", &[0., 1.]);
        let l = ds.load().unwrap();
        assert!(!l.is_lazy());
        assert_eq!(l.attrs()["title"], AttrValue::from("air"));
    }
}
