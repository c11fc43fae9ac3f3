use std::ops::Range;

use chrono::NaiveDateTime;
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};

use super::Datatype;
use crate::pattern::FieldValue;

/// Values of a variable held in memory.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
    Str(ArrayD<String>),
    DateTime(ArrayD<NaiveDateTime>),
}

macro_rules! map_values {
    ($values:expr, $a:ident => $e:expr) => {
        match $values {
            Values::Float($a) => Values::Float($e),
            Values::Int($a) => Values::Int($e),
            Values::Str($a) => Values::Str($e),
            Values::DateTime($a) => Values::DateTime($e),
        }
    };
}

/// Key used to order fragments by their coordinates.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum OrderKey {
    Num(f64),
    Str(String),
    Time(NaiveDateTime),
}

impl Values {
    pub fn shape(&self) -> &[usize] {
        match self {
            Values::Float(a) => a.shape(),
            Values::Int(a) => a.shape(),
            Values::Str(a) => a.shape(),
            Values::DateTime(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Datatype {
        match self {
            Values::Float(_) => Datatype::Float(8),
            Values::Int(_) => Datatype::Int(8),
            Values::Str(_) => Datatype::Str,
            Values::DateTime(_) => Datatype::DateTime,
        }
    }

    #[must_use]
    pub fn insert_axis(self, axis: usize) -> Values {
        map_values!(self, a => a.insert_axis(Axis(axis)))
    }

    /// Copy of the values in `region`, one range per axis.
    pub fn slice(&self, region: &[Range<usize>]) -> anyhow::Result<Values> {
        ensure!(region.len() == self.ndim(), "region does not match rank");
        ensure!(
            region.iter().zip(self.shape()).all(|(r, &n)| r.end <= n),
            "region out of bounds"
        );

        Ok(map_values!(self, a => a
            .slice_each_axis(|ax| Slice::from(region[ax.axis.index()].clone()))
            .to_owned()))
    }

    /// Numeric values as floats.
    pub fn to_f64(&self) -> Option<ArrayD<f64>> {
        match self {
            Values::Float(a) => Some(a.clone()),
            Values::Int(a) => Some(a.mapv(|v| v as f64)),
            _ => None,
        }
    }

    /// The first element, used to order fragments.
    pub fn first(&self) -> Option<OrderKey> {
        match self {
            Values::Float(a) => a.iter().next().map(|v| OrderKey::Num(*v)),
            Values::Int(a) => a.iter().next().map(|v| OrderKey::Num(*v as f64)),
            Values::Str(a) => a.iter().next().map(|v| OrderKey::Str(v.clone())),
            Values::DateTime(a) => a.iter().next().map(|v| OrderKey::Time(*v)),
        }
    }

    /// Join `values` along `axis`. Integers mixed with floats become floats.
    pub fn concatenate(axis: usize, values: &[Values]) -> anyhow::Result<Values> {
        fn join<T: Clone>(axis: usize, arrays: Vec<ArrayViewD<'_, T>>) -> anyhow::Result<ArrayD<T>> {
            Ok(ndarray::concatenate(Axis(axis), &arrays)?)
        }

        ensure!(!values.is_empty(), "nothing to concatenate");

        let all = |f: fn(&Values) -> bool| values.iter().all(f);

        if all(|v| matches!(v, Values::Float(_) | Values::Int(_))) {
            if all(|v| matches!(v, Values::Int(_))) {
                let arrays = values
                    .iter()
                    .filter_map(|v| match v {
                        Values::Int(a) => Some(a.view()),
                        _ => None,
                    })
                    .collect();
                return Ok(Values::Int(join(axis, arrays)?));
            }

            let floats = values.iter().filter_map(Values::to_f64).collect::<Vec<_>>();
            let arrays = floats.iter().map(|a| a.view()).collect();
            return Ok(Values::Float(join(axis, arrays)?));
        }

        if all(|v| matches!(v, Values::Str(_))) {
            let arrays = values
                .iter()
                .filter_map(|v| match v {
                    Values::Str(a) => Some(a.view()),
                    _ => None,
                })
                .collect();
            return Ok(Values::Str(join(axis, arrays)?));
        }

        if all(|v| matches!(v, Values::DateTime(_))) {
            let arrays = values
                .iter()
                .filter_map(|v| match v {
                    Values::DateTime(a) => Some(a.view()),
                    _ => None,
                })
                .collect();
            return Ok(Values::DateTime(join(axis, arrays)?));
        }

        Err(anyhow!("cannot concatenate values of different types"))
    }
}

impl From<FieldValue> for Values {
    fn from(v: FieldValue) -> Self {
        let scalar = IxDyn(&[]);
        match v {
            FieldValue::Str(s) => Values::Str(ArrayD::from_elem(scalar, s)),
            FieldValue::Int(i) => Values::Int(ArrayD::from_elem(scalar, i)),
            FieldValue::Float(f) => Values::Float(ArrayD::from_elem(scalar, f)),
            FieldValue::DateTime(d) => Values::DateTime(ArrayD::from_elem(scalar, d)),
        }
    }
}

impl From<ArrayD<f64>> for Values {
    fn from(a: ArrayD<f64>) -> Self {
        Values::Float(a)
    }
}

impl From<ArrayD<i64>> for Values {
    fn from(a: ArrayD<i64>) -> Self {
        Values::Int(a)
    }
}

impl From<ArrayD<String>> for Values {
    fn from(a: ArrayD<String>) -> Self {
        Values::Str(a)
    }
}

/// Attribute of a variable or dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strs(Vec<String>),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn concatenate_promotes() {
        let a = Values::Int(arr1(&[1i64, 2]).into_dyn());
        let b = Values::Float(arr1(&[3.5]).into_dyn());

        let c = Values::concatenate(0, &[a.clone(), b]).unwrap();
        assert_eq!(c, Values::Float(arr1(&[1., 2., 3.5]).into_dyn()));

        let c = Values::concatenate(0, &[a.clone(), a]).unwrap();
        assert_eq!(c.dtype(), Datatype::Int(8));
        assert_eq!(c.shape(), &[4]);
    }

    #[test]
    fn concatenate_mixed_fails() {
        let a = Values::Int(arr1(&[1i64]).into_dyn());
        let s = Values::from(FieldValue::Str("x".into())).insert_axis(0);
        assert!(Values::concatenate(0, &[a, s]).is_err());
    }

    #[test]
    fn scalars_along_new_axis() {
        let v = ["1999", "2000"]
            .into_iter()
            .map(|y| Values::from(FieldValue::Str(y.into())).insert_axis(0))
            .collect::<Vec<_>>();

        let c = Values::concatenate(0, &v).unwrap();
        assert_eq!(
            c,
            Values::Str(arr1(&["1999".to_string(), "2000".to_string()]).into_dyn())
        );
        assert_eq!(c.first(), Some(OrderKey::Str("1999".into())));
    }

    #[test]
    fn slice_region() {
        let v = Values::Float(arr2(&[[1., 2., 3.], [4., 5., 6.]]).into_dyn());
        let s = v.slice(&[1..2, 0..2]).unwrap();
        assert_eq!(s, Values::Float(arr2(&[[4., 5.]]).into_dyn()));

        assert!(v.slice(&[0..3, 0..1]).is_err());
    }
}
