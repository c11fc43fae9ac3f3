use serde::{Deserialize, Serialize};

/// Element type of a variable as stored in the file.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
pub enum Datatype {
    UInt(usize),
    Int(usize),
    Float(usize),
    Str,
    DateTime,
    Custom(usize),
}

impl Datatype {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Datatype::UInt(_) | Datatype::Int(_) | Datatype::Float(_))
    }
}

impl From<hdf5::Datatype> for Datatype {
    fn from(dtype: hdf5::Datatype) -> Self {
        match dtype {
            _ if dtype.is::<u8>() => Datatype::UInt(dtype.size()),
            _ if dtype.is::<u16>() => Datatype::UInt(dtype.size()),
            _ if dtype.is::<u32>() => Datatype::UInt(dtype.size()),
            _ if dtype.is::<u64>() => Datatype::UInt(dtype.size()),
            _ if dtype.is::<i8>() => Datatype::Int(dtype.size()),
            _ if dtype.is::<i16>() => Datatype::Int(dtype.size()),
            _ if dtype.is::<i32>() => Datatype::Int(dtype.size()),
            _ if dtype.is::<i64>() => Datatype::Int(dtype.size()),
            _ if dtype.is::<f32>() => Datatype::Float(dtype.size()),
            _ if dtype.is::<f64>() => Datatype::Float(dtype.size()),
            _ => Datatype::Custom(dtype.size()),
        }
    }
}

#[cfg(feature = "netcdf")]
impl From<netcdf::types::NcVariableType> for Datatype {
    fn from(vartype: netcdf::types::NcVariableType) -> Self {
        use netcdf::types::{FloatType, IntType, NcVariableType};

        match vartype {
            NcVariableType::Int(IntType::U8) => Datatype::UInt(1),
            NcVariableType::Int(IntType::U16) => Datatype::UInt(2),
            NcVariableType::Int(IntType::U32) => Datatype::UInt(4),
            NcVariableType::Int(IntType::U64) => Datatype::UInt(8),
            NcVariableType::Int(IntType::I8) => Datatype::Int(1),
            NcVariableType::Int(IntType::I16) => Datatype::Int(2),
            NcVariableType::Int(IntType::I32) => Datatype::Int(4),
            NcVariableType::Int(IntType::I64) => Datatype::Int(8),
            NcVariableType::Float(FloatType::F32) => Datatype::Float(4),
            NcVariableType::Float(FloatType::F64) => Datatype::Float(8),
            NcVariableType::String | NcVariableType::Char => Datatype::Str,
            _ => Datatype::Custom(0),
        }
    }
}
