use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::izip;
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use serde::Serialize;

use super::{AttrValue, Datatype, Values};
use crate::options::Chunks;

/// Something a region of a lazy variable can be read from, typically one
/// variable in one file.
pub trait ReadArray: fmt::Debug + Send + Sync {
    /// Shape of the whole array.
    fn shape(&self) -> &[usize];

    /// Read `count` elements starting at `start` along each axis.
    fn read(&self, start: &[usize], count: &[usize]) -> anyhow::Result<ArrayD<f64>>;
}

/// Numeric values in memory taking part in a lazy variable.
#[derive(Debug)]
pub struct MemoryArray(ArrayD<f64>);

impl MemoryArray {
    pub fn new(a: ArrayD<f64>) -> MemoryArray {
        MemoryArray(a)
    }
}

impl ReadArray for MemoryArray {
    fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    fn read(&self, start: &[usize], count: &[usize]) -> anyhow::Result<ArrayD<f64>> {
        ensure!(
            start.len() == self.0.ndim() && count.len() == self.0.ndim(),
            "region does not match rank"
        );

        Ok(self
            .0
            .slice_each_axis(|ax| {
                let i = ax.axis.index();
                Slice::from(start[i]..start[i] + count[i])
            })
            .to_owned())
    }
}

/// A region of a lazy variable backed by a reader.
#[derive(Debug, Clone)]
pub struct Part {
    reader: Arc<dyn ReadArray>,

    /// Position of the region in the variable.
    origin: Vec<usize>,

    /// Shape of the region in the variable.
    shape: Vec<usize>,

    /// Number of leading axes the reader does not have. The reader's values
    /// are repeated along them.
    expand: usize,
}

impl Part {
    pub fn new(reader: Arc<dyn ReadArray>) -> Part {
        let shape = reader.shape().to_vec();

        Part {
            reader,
            origin: vec![0; shape.len()],
            shape,
            expand: 0,
        }
    }

    pub fn origin(&self) -> &[usize] {
        &self.origin
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Moved by `offset` along `axis`.
    pub(crate) fn shifted(&self, axis: usize, offset: usize) -> Part {
        let mut p = self.clone();
        p.origin[axis] += offset;
        p
    }

    /// With a new leading axis, placed at `index` along it.
    pub(crate) fn expanded(&self, index: usize) -> Part {
        let mut p = self.clone();
        p.origin.insert(0, index);
        p.shape.insert(0, 1);
        p.expand += 1;
        p
    }

    /// With a new leading axis of length `n`, the same values at every index.
    pub(crate) fn repeated(&self, n: usize) -> Part {
        let mut p = self.clone();
        p.origin.insert(0, 0);
        p.shape.insert(0, n);
        p.expand += 1;
        p
    }

    /// The part of `region` this covers, if any.
    fn overlap(&self, region: &[Range<usize>]) -> Option<Vec<Range<usize>>> {
        izip!(region, &self.origin, &self.shape)
            .map(|(r, &o, &n)| {
                let start = r.start.max(o);
                let end = r.end.min(o + n);
                (start < end).then_some(start..end)
            })
            .collect()
    }

    fn read(&self, overlap: &[Range<usize>]) -> anyhow::Result<ArrayD<f64>> {
        let (start, count): (Vec<usize>, Vec<usize>) = overlap
            .iter()
            .zip(&self.origin)
            .skip(self.expand)
            .map(|(r, o)| (r.start - o, r.len()))
            .unzip();

        let mut a = self.reader.read(&start, &count)?;
        for _ in 0..self.expand {
            a = a.insert_axis(Axis(0));
        }

        let shape = overlap.iter().map(Range::len).collect::<Vec<_>>();
        if a.shape() != shape.as_slice() {
            a = a
                .broadcast(IxDyn(&shape))
                .ok_or_else(|| anyhow!("cannot repeat region of shape {:?} to {shape:?}", a.shape()))?
                .to_owned();
        }

        Ok(a)
    }
}

/// Data of a variable.
#[derive(Debug, Clone)]
pub enum Data {
    Memory(Values),
    Lazy(Vec<Part>),
}

/// How a variable was stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Encoding {
    /// The file the variable was opened from.
    pub source: Option<PathBuf>,
    pub engine: Option<String>,
}

/// A labeled array, either in memory or read lazily from files.
#[derive(Debug, Clone)]
pub struct Variable {
    dims: Vec<String>,
    shape: Vec<usize>,
    dtype: Datatype,
    attrs: BTreeMap<String, AttrValue>,
    encoding: Encoding,
    chunks: Option<Vec<Vec<usize>>>,
    data: Data,
}

impl Variable {
    pub fn from_values<I, D>(dims: I, values: Values) -> anyhow::Result<Variable>
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        ensure!(
            dims.len() == values.ndim(),
            "{} dimensions given for values of rank {}",
            dims.len(),
            values.ndim()
        );

        Ok(Variable {
            dims,
            shape: values.shape().to_vec(),
            dtype: values.dtype(),
            attrs: BTreeMap::new(),
            encoding: Encoding::default(),
            chunks: None,
            data: Data::Memory(values),
        })
    }

    /// A variable without dimensions.
    pub fn scalar<V: Into<Values>>(value: V) -> Variable {
        let values = value.into();
        debug_assert_eq!(values.ndim(), 0);

        Variable {
            dims: Vec::new(),
            shape: Vec::new(),
            dtype: values.dtype(),
            attrs: BTreeMap::new(),
            encoding: Encoding::default(),
            chunks: None,
            data: Data::Memory(values),
        }
    }

    pub fn lazy<I, D>(dims: I, dtype: Datatype, reader: Arc<dyn ReadArray>) -> anyhow::Result<Variable>
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        let part = Part::new(reader);
        ensure!(
            dims.len() == part.shape.len(),
            "{} dimensions given for array of rank {}",
            dims.len(),
            part.shape.len()
        );

        Ok(Variable {
            dims,
            shape: part.shape.clone(),
            dtype,
            attrs: BTreeMap::new(),
            encoding: Encoding::default(),
            chunks: None,
            data: Data::Lazy(vec![part]),
        })
    }

    /// A variable with the type, attributes and encoding of `template`.
    pub(crate) fn from_parts(
        template: &Variable,
        dims: Vec<String>,
        shape: Vec<usize>,
        chunks: Option<Vec<Vec<usize>>>,
        data: Data,
    ) -> Variable {
        Variable {
            dims,
            shape,
            dtype: template.dtype,
            attrs: template.attrs.clone(),
            encoding: template.encoding.clone(),
            chunks,
            data,
        }
    }

    #[must_use]
    pub fn with_attr<K: Into<String>, V: Into<AttrValue>>(mut self, key: K, value: V) -> Variable {
        self.attrs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: BTreeMap<String, AttrValue>) -> Variable {
        self.attrs = attrs;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Variable {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_source<P: Into<PathBuf>>(mut self, source: P) -> Variable {
        self.encoding.source = Some(source.into());
        self
    }

    /// Chunk the variable according to `chunks`.
    pub fn with_chunks(mut self, chunks: &Chunks) -> anyhow::Result<Variable> {
        self.chunks = Some(chunks.layout(&self.dims, &self.shape)?);
        Ok(self)
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Datatype {
        self.dtype
    }

    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn source(&self) -> Option<&Path> {
        self.encoding.source.as_deref()
    }

    /// Chunk sizes along each dimension, if chunked.
    pub fn chunks(&self) -> Option<&[Vec<usize>]> {
        self.chunks.as_deref()
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.data, Data::Lazy(_))
    }

    pub fn axis(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Read all values.
    pub fn values(&self) -> anyhow::Result<Values> {
        let full = self.shape.iter().map(|&n| 0..n).collect::<Vec<_>>();
        self.read(&full)
    }

    /// Read the values in `region`, one range per dimension. Only the parts
    /// overlapping the region are read.
    pub fn read(&self, region: &[Range<usize>]) -> anyhow::Result<Values> {
        ensure!(
            region.len() == self.ndim(),
            "region has {} dimensions, variable has {}",
            region.len(),
            self.ndim()
        );
        ensure!(
            region
                .iter()
                .zip(&self.shape)
                .all(|(r, &n)| r.start <= r.end && r.end <= n),
            "region {:?} out of bounds for shape {:?}",
            region,
            self.shape
        );

        let parts = match &self.data {
            Data::Memory(v) => return v.slice(region),
            Data::Lazy(parts) => parts,
        };

        let count = region.iter().map(|r| r.len()).collect::<Vec<_>>();
        let mut out = ArrayD::<f64>::from_elem(IxDyn(&count), f64::NAN);

        if out.is_empty() {
            return Ok(Values::Float(out));
        }

        for part in parts {
            let Some(overlap) = part.overlap(region) else {
                continue;
            };

            let a = part.read(&overlap)?;
            ensure!(
                a.shape().iter().copied().eq(overlap.iter().map(|r| r.len())),
                "reader returned shape {:?} for region {:?}",
                a.shape(),
                overlap
            );

            out.slice_each_axis_mut(|ax| {
                let i = ax.axis.index();
                Slice::from(overlap[i].start - region[i].start..overlap[i].end - region[i].start)
            })
            .assign(&a);
        }

        Ok(Values::Float(out))
    }

    /// Region covered by the chunk at `index`.
    pub fn chunk_region(&self, index: &[usize]) -> anyhow::Result<Vec<Range<usize>>> {
        ensure!(
            index.len() == self.ndim(),
            "chunk index has {} dimensions, variable has {}",
            index.len(),
            self.ndim()
        );

        let whole = self.shape.iter().map(|&n| vec![n]).collect::<Vec<_>>();
        let chunks = self.chunks.as_ref().unwrap_or(&whole);

        izip!(index, chunks, &self.dims)
            .map(|(&i, sizes, dim)| {
                ensure!(
                    i < sizes.len(),
                    "chunk index {i} out of range along '{dim}' ({} chunks)",
                    sizes.len()
                );
                let start = sizes[..i].iter().sum::<usize>();
                Ok(start..start + sizes[i])
            })
            .collect()
    }

    /// Read one chunk.
    pub fn read_chunk(&self, index: &[usize]) -> anyhow::Result<Values> {
        let region = self.chunk_region(index)?;
        self.read(&region)
    }

    /// A copy with all values in memory.
    pub fn load(&self) -> anyhow::Result<Variable> {
        let mut v = self.clone();
        if let Data::Lazy(_) = self.data {
            v.data = Data::Memory(self.values()?);
        }
        Ok(v)
    }

    /// The data as lazy parts. Numeric values in memory become a single part.
    pub(crate) fn parts(&self) -> anyhow::Result<Vec<Part>> {
        match &self.data {
            Data::Lazy(parts) => Ok(parts.clone()),
            Data::Memory(v) => {
                let a = v
                    .to_f64()
                    .ok_or_else(|| anyhow!("cannot combine non-numeric values with lazy data"))?;
                Ok(vec![Part::new(Arc::new(MemoryArray::new(a)))])
            }
        }
    }
}
