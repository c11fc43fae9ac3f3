//! Arguments a source is constructed from.
//!
//! These are the arguments of a catalog entry. All of them deserialize with
//! [serde](https://serde.rs/), so an entry like
//!
//! ```
//! # use ncsource::options::SourceArgs;
//! let args: SourceArgs = serde_json::from_str(r#"{
//!     "urlpath": "data/air_{year}.nc",
//!     "chunks": {"time": 10},
//!     "xarray_kwargs": {"combine": "by_coords"}
//! }"#).unwrap();
//! assert_eq!(args.concat_dim, "concat_dim");
//! ```
//!
//! can be handed straight to [`NetCDFSource::from_args`](crate::source::NetCDFSource::from_args).

use std::collections::BTreeMap;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Name of the dimension files are concatenated along when nothing else is given.
pub const DEFAULT_CONCAT_DIM: &str = "concat_dim";

/// Options for the filesystem layer, passed through untouched.
pub type StorageOptions = BTreeMap<String, Value>;

/// Free-form description of a source.
pub type Metadata = BTreeMap<String, Value>;

/// One path (possibly a glob or a pattern) or a list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSpec {
    Single(String),
    Many(Vec<String>),
}

impl PathSpec {
    /// Whether this refers to several files which need to be merged.
    pub fn is_multi(&self) -> bool {
        match self {
            PathSpec::Single(s) => s.contains('*'),
            PathSpec::Many(_) => true,
        }
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            PathSpec::Single(s) => std::slice::from_ref(s),
            PathSpec::Many(v) => v.as_slice(),
        }
    }
}

impl From<&str> for PathSpec {
    fn from(s: &str) -> Self {
        PathSpec::Single(s.to_string())
    }
}

impl From<String> for PathSpec {
    fn from(s: String) -> Self {
        PathSpec::Single(s)
    }
}

impl From<Vec<String>> for PathSpec {
    fn from(v: Vec<String>) -> Self {
        PathSpec::Many(v)
    }
}

impl From<Vec<&str>> for PathSpec {
    fn from(v: Vec<&str>) -> Self {
        PathSpec::Many(v.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PathSpec {
    fn from(v: [&str; N]) -> Self {
        PathSpec::Many(v.iter().map(|s| s.to_string()).collect())
    }
}

/// Chunking hint.
///
/// `Uniform(n)` chunks every dimension by `n`, `PerDim` chunks the named
/// dimensions and leaves the rest whole. An empty `PerDim` gives a single chunk
/// per variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Chunks {
    Uniform(usize),
    PerDim(BTreeMap<String, usize>),
}

impl Chunks {
    /// Chunk sizes along each dimension of a variable.
    pub fn layout(&self, dims: &[String], shape: &[usize]) -> anyhow::Result<Vec<Vec<usize>>> {
        ensure!(dims.len() == shape.len(), "dimensions do not match shape");

        dims.iter()
            .zip(shape)
            .map(|(dim, &len)| {
                let size = match self {
                    Chunks::Uniform(n) => *n,
                    Chunks::PerDim(m) => m.get(dim).copied().unwrap_or(len),
                };
                ensure!(
                    size > 0 || len == 0,
                    "chunk size for dimension '{dim}' must be positive"
                );
                Ok(chunk_sizes(len, size))
            })
            .collect()
    }
}

/// Split `len` into chunks of `size`, the last one possibly shorter.
pub fn chunk_sizes(len: usize, size: usize) -> Vec<usize> {
    if len == 0 || size == 0 {
        return vec![len];
    }

    let mut sizes = vec![size; len / size];
    if len % size != 0 {
        sizes.push(len % size);
    }
    sizes
}

/// Whether the path holds pattern fields (`data_{field}.nc`) which should be
/// turned into coordinates. A string is used as the pattern instead of the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathAsPattern {
    Flag(bool),
    Pattern(String),
}

impl Default for PathAsPattern {
    fn default() -> Self {
        PathAsPattern::Flag(true)
    }
}

impl PathAsPattern {
    /// Whether coordinates are read from paths. An empty pattern reads none.
    pub fn enabled(&self) -> bool {
        match self {
            PathAsPattern::Flag(b) => *b,
            PathAsPattern::Pattern(p) => !p.is_empty(),
        }
    }
}

/// Keyword options for the backend open call.
///
/// Explicitly given keys always win, defaults are only filled in with
/// [`set_default`](OpenOptions::set_default).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenOptions(BTreeMap<String, Value>);

impl OpenOptions {
    pub fn new() -> OpenOptions {
        OpenOptions::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<Value>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.0.insert(key.into(), value.into())
    }

    /// Insert `value` unless `key` is already set. Returns whether it was inserted.
    pub fn set_default<K, V>(&mut self, key: K, value: V) -> bool
    where
        K: Into<String>,
        V: Into<Value>,
    {
        use std::collections::btree_map::Entry;

        match self.0.entry(key.into()) {
            Entry::Vacant(e) => {
                e.insert(value.into());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// A copy without `keys`.
    #[must_use]
    pub fn without(&self, keys: &[&str]) -> OpenOptions {
        OpenOptions(
            self.0
                .iter()
                .filter(|(k, _)| !keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interpret the options as `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        let map = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<String, Value>>();

        serde_json::from_value(Value::Object(map))
            .with_context(|| format!("invalid open options: {}", self))
    }
}

impl std::fmt::Display for OpenOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(&self.0).map_err(|_| std::fmt::Error)?;
        f.write_str(&s)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for OpenOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        OpenOptions(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, Value>> for OpenOptions {
    fn from(m: BTreeMap<String, Value>) -> Self {
        OpenOptions(m)
    }
}

fn default_concat_dim() -> String {
    DEFAULT_CONCAT_DIM.to_string()
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Arguments of a `netcdf` catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceArgs {
    /// Path to the source file(s). May include glob `*` characters, format
    /// pattern fields or be a list.
    pub urlpath: PathSpec,

    #[serde(default)]
    pub chunks: Option<Chunks>,

    /// Dimension to concatenate multiple files along, new or existing.
    #[serde(default = "default_concat_dim")]
    pub concat_dim: String,

    /// Extra options for the backend open call.
    #[serde(default, deserialize_with = "null_as_default")]
    pub xarray_kwargs: OpenOptions,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,

    #[serde(default)]
    pub path_as_pattern: PathAsPattern,

    #[serde(default, deserialize_with = "null_as_default")]
    pub storage_options: StorageOptions,
}

impl SourceArgs {
    pub fn new<P: Into<PathSpec>>(urlpath: P) -> SourceArgs {
        SourceArgs {
            urlpath: urlpath.into(),
            chunks: None,
            concat_dim: default_concat_dim(),
            xarray_kwargs: OpenOptions::default(),
            metadata: Metadata::default(),
            path_as_pattern: PathAsPattern::default(),
            storage_options: StorageOptions::default(),
        }
    }
}
