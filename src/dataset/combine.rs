//! Joining datasets opened from several files into one.
//!
//! Lazy data is never read while combining: the parts of each variable are
//! re-based into the combined variable. Only the first value of dimension
//! coordinates is read when ordering by coordinates.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use itertools::Itertools;

use super::{Data, Dataset, OrderKey, Values, Variable};

fn memory_values(v: &Variable) -> Option<&Values> {
    match v.data() {
        Data::Memory(values) => Some(values),
        Data::Lazy(_) => None,
    }
}

/// Concatenate variables along `dim`. A variable without `dim` gets it as a new
/// leading dimension, with one entry per variable.
pub fn concat_variables(vars: &[&Variable], dim: &str) -> anyhow::Result<Variable> {
    let first = *vars.first().ok_or_else(|| anyhow!("nothing to concatenate"))?;

    if let Some(v) = vars.iter().find(|v| v.dims() != first.dims()) {
        return Err(anyhow!(
            "cannot concatenate variables with dimensions {:?} and {:?}",
            first.dims(),
            v.dims()
        ));
    }

    let existing = first.axis(dim);

    let (dims, shape, axis) = match existing {
        Some(axis) => {
            for v in vars {
                for (i, (&a, &b)) in first.shape().iter().zip(v.shape()).enumerate() {
                    ensure!(
                        i == axis || a == b,
                        "cannot concatenate along '{dim}': '{}' has length {a} and {b}",
                        first.dims()[i]
                    );
                }
            }

            let mut shape = first.shape().to_vec();
            shape[axis] = vars.iter().map(|v| v.shape()[axis]).sum();
            (first.dims().to_vec(), shape, axis)
        }
        None => {
            ensure!(
                vars.iter().all(|v| v.shape() == first.shape()),
                "cannot stack variables of different shapes along '{dim}'"
            );

            let dims = std::iter::once(dim.to_string())
                .chain(first.dims().iter().cloned())
                .collect();
            let shape = std::iter::once(vars.len())
                .chain(first.shape().iter().copied())
                .collect();
            (dims, shape, 0)
        }
    };

    let chunks = vars
        .iter()
        .map(|v| v.chunks())
        .collect::<Option<Vec<_>>>()
        .map(|all| {
            let mut chunks = all[0].to_vec();
            match existing {
                Some(axis) => chunks[axis] = all.iter().flat_map(|c| c[axis].iter().copied()).collect(),
                None => chunks.insert(0, vec![1; vars.len()]),
            }
            chunks
        });

    let data = match vars.iter().map(|v| memory_values(v)).collect::<Option<Vec<_>>>() {
        Some(values) => {
            let values = values
                .into_iter()
                .map(|v| match existing {
                    Some(_) => v.clone(),
                    None => v.clone().insert_axis(0),
                })
                .collect::<Vec<_>>();
            Data::Memory(Values::concatenate(axis, &values)?)
        }
        None => {
            let mut parts = Vec::new();
            let mut offset = 0;

            for (i, v) in vars.iter().enumerate() {
                for p in v.parts()? {
                    parts.push(match existing {
                        Some(axis) => p.shifted(axis, offset),
                        None => p.expanded(i),
                    });
                }
                if let Some(axis) = existing {
                    offset += v.shape()[axis];
                }
            }

            Data::Lazy(parts)
        }
    };

    Ok(Variable::from_parts(first, dims, shape, chunks, data))
}

/// `v` repeated `n` times along a new leading dimension `dim`. Lazy data is
/// not read.
fn repeat(v: &Variable, dim: &str, n: usize) -> anyhow::Result<Variable> {
    let data = match v.data() {
        Data::Memory(values) => {
            let copies = vec![values.clone().insert_axis(0); n];
            Data::Memory(Values::concatenate(0, &copies)?)
        }
        Data::Lazy(parts) => Data::Lazy(parts.iter().map(|p| p.repeated(n)).collect()),
    };

    let dims = std::iter::once(dim.to_string())
        .chain(v.dims().iter().cloned())
        .collect();
    let shape = std::iter::once(n).chain(v.shape().iter().copied()).collect();
    let chunks = v
        .chunks()
        .map(|c| std::iter::once(vec![n]).chain(c.iter().cloned()).collect());

    Ok(Variable::from_parts(v, dims, shape, chunks, data))
}

/// Each variable repeated over the length of `dim` in its file, then
/// concatenated along it.
fn spread(fragments: &[Dataset], vars: &[&Variable], dim: &str) -> anyhow::Result<Variable> {
    let spread = fragments
        .iter()
        .zip(vars)
        .map(|(f, v)| repeat(v, dim, f.dims()[dim]))
        .collect::<anyhow::Result<Vec<_>>>()?;
    concat_variables(&spread.iter().collect::<Vec<_>>(), dim)
}

/// Concatenate datasets along `dim` in the order given.
///
/// All data variables are concatenated. Coordinates along `dim` are
/// concatenated, other coordinates are taken from the first dataset unless
/// they are in memory and differ, in which case they are stacked along `dim`
/// (this is how scalar coordinates from file names become labels of `dim`).
/// When `dim` already exists, data variables without it are repeated over
/// its length in each file.
pub fn combine_nested(fragments: Vec<Dataset>, dim: &str) -> anyhow::Result<Dataset> {
    let first = fragments
        .first()
        .ok_or_else(|| anyhow!("no files to open"))?;

    let names = first.data_vars().keys().collect::<BTreeSet<_>>();
    let existing = first.dims().contains_key(dim);

    for (i, f) in fragments.iter().enumerate().skip(1) {
        let other = f.data_vars().keys().collect::<BTreeSet<_>>();
        ensure!(
            names == other,
            "data variables differ between files: {} in file 0, {} in file {i}",
            names.iter().join(", "),
            other.iter().join(", ")
        );

        ensure!(
            f.dims().contains_key(dim) == existing,
            "dimension '{dim}' is present in some files but not others"
        );

        for (d, n) in f.dims() {
            if let Some(m) = first.dims().get(d) {
                ensure!(
                    d == dim || m == n,
                    "dimension '{d}' has length {m} in file 0 and {n} in file {i}"
                );
            }
        }
    }

    let mut out = Dataset::new();
    out.set_attrs(first.attrs().clone());

    let coords = first
        .coords()
        .keys()
        .filter(|k| fragments.iter().all(|f| f.coords().contains_key(*k)));

    for name in coords {
        let vars = fragments.iter().map(|f| &f.coords()[name]).collect::<Vec<_>>();

        let stack = vars[0].axis(dim).is_some()
            || vars
                .iter()
                .map(|v| memory_values(v))
                .collect::<Option<Vec<_>>>()
                .map_or(false, |values| !values.iter().all_equal());

        let var = if stack && existing && vars[0].axis(dim).is_none() {
            spread(&fragments, &vars, dim)?
        } else if stack {
            concat_variables(&vars, dim)?
        } else {
            vars[0].clone()
        };

        out.add_coord(name.clone(), var)?;
    }

    for name in names {
        let vars = fragments
            .iter()
            .map(|f| &f.data_vars()[name])
            .collect::<Vec<_>>();

        let var = if existing && vars[0].axis(dim).is_none() {
            spread(&fragments, &vars, dim)?
        } else {
            concat_variables(&vars, dim)?
        };
        out.add_data_var(name.clone(), var)?;
    }

    log::debug!(
        "combined {} files along '{dim}': {:?}",
        fragments.len(),
        out.dims()
    );

    Ok(out)
}

/// First value of the dimension coordinate of `dim`, if there is one.
fn first_label(ds: &Dataset, dim: &str) -> anyhow::Result<Option<OrderKey>> {
    match ds.coords().get(dim) {
        Some(c) if c.dims() == [dim] && !c.is_empty() => Ok(c.read(&[0..1])?.first()),
        _ => Ok(None),
    }
}

/// Order datasets by the dimension coordinate which differs between them,
/// then concatenate along it.
pub fn combine_by_coords(fragments: Vec<Dataset>) -> anyhow::Result<Dataset> {
    ensure!(!fragments.is_empty(), "no files to open");

    if fragments.len() == 1 {
        return Ok(fragments.into_iter().next().unwrap_or_default());
    }

    let mut candidates = Vec::new();

    for dim in fragments[0].dims().keys() {
        let labels = fragments
            .iter()
            .map(|f| first_label(f, dim))
            .collect::<anyhow::Result<Vec<_>>>()?;

        if labels.iter().all(Option::is_some) && !labels.iter().all_equal() {
            candidates.push((dim.clone(), labels));
        }
    }

    let (dim, labels) = match candidates.len() {
        0 => {
            return Err(anyhow!(
                "could not find any dimension coordinates to use to order the datasets for concatenation"
            ))
        }
        1 => candidates.remove(0),
        _ => {
            return Err(anyhow!(
                "combining along several dimensions is not supported: {}",
                candidates.iter().map(|(d, _)| d).join(", ")
            ))
        }
    };

    let mut ordered = labels.into_iter().zip(fragments).collect::<Vec<_>>();
    ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    combine_nested(ordered.into_iter().map(|(_, f)| f).collect(), &dim)
}
