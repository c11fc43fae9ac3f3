use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataset::{AttrValue, Dataset};

/// Structure of a dataset, without its values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub dims: BTreeMap<String, usize>,

    /// Data variables and the names of the coordinates labelling them.
    pub data_vars: BTreeMap<String, Vec<String>>,

    pub coords: Vec<String>,

    /// Chunk sizes along chunked dimensions.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub chunks: BTreeMap<String, Vec<usize>>,

    pub attrs: BTreeMap<String, AttrValue>,
}

impl From<&Dataset> for Schema {
    fn from(ds: &Dataset) -> Self {
        Schema {
            dims: ds.dims().clone(),
            data_vars: ds
                .data_vars()
                .iter()
                .map(|(k, v)| (k.clone(), ds.coords_of(v)))
                .collect(),
            coords: ds.coords().keys().cloned().collect(),
            chunks: ds.chunks(),
            attrs: ds.attrs().clone(),
        }
    }
}
