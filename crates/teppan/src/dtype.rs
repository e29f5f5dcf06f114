use std::fmt;

/// Data types of the serving type system.
///
/// Configuration files spell these as `TYPE_<NAME>` (e.g. `TYPE_FP32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Fp16,
    Fp32,
    Fp64,
    Bf16,
    /// Variable length byte strings.
    Bytes,
}

impl DataType {
    /// Parse the configuration spelling, `TYPE_FP32` etc.
    pub fn from_config_str(s: &str) -> Option<DataType> {
        let name = s.strip_prefix("TYPE_")?;
        let dtype = match name {
            "BOOL" => DataType::Bool,
            "UINT8" => DataType::Uint8,
            "UINT16" => DataType::Uint16,
            "UINT32" => DataType::Uint32,
            "UINT64" => DataType::Uint64,
            "INT8" => DataType::Int8,
            "INT16" => DataType::Int16,
            "INT32" => DataType::Int32,
            "INT64" => DataType::Int64,
            "FP16" => DataType::Fp16,
            "FP32" => DataType::Fp32,
            "FP64" => DataType::Fp64,
            "BF16" => DataType::Bf16,
            "STRING" => DataType::Bytes,
            _ => return None,
        };
        Some(dtype)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Uint8 => "UINT8",
            DataType::Uint16 => "UINT16",
            DataType::Uint32 => "UINT32",
            DataType::Uint64 => "UINT64",
            DataType::Int8 => "INT8",
            DataType::Int16 => "INT16",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::Fp16 => "FP16",
            DataType::Fp32 => "FP32",
            DataType::Fp64 => "FP64",
            DataType::Bf16 => "BF16",
            DataType::Bytes => "BYTES",
        }
    }

    /// Size of one element in bytes, `None` for variable length types.
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            DataType::Bool | DataType::Uint8 | DataType::Int8 => Some(1),
            DataType::Uint16 | DataType::Int16 | DataType::Fp16 | DataType::Bf16 => Some(2),
            DataType::Uint32 | DataType::Int32 | DataType::Fp32 => Some(4),
            DataType::Uint64 | DataType::Int64 | DataType::Fp64 => Some(8),
            DataType::Bytes => None,
        }
    }

    /// Whether the wrapped tensor runtime has an equivalent type.
    ///
    /// Unsigned types wider than a byte and byte strings have no runtime
    /// equivalent and are rejected when the schema is built.
    pub fn is_model_supported(&self) -> bool {
        !matches!(
            self,
            DataType::Uint16 | DataType::Uint32 | DataType::Uint64 | DataType::Bytes
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Byte size of a dense tensor of `dtype` with `shape`.
///
/// Returns `None` for variable length types or on overflow.
pub fn byte_size_for(dtype: DataType, shape: &[usize]) -> Option<usize> {
    shape
        .iter()
        .try_fold(dtype.byte_size()?, |acc, dim| acc.checked_mul(*dim))
}

/// A Rust scalar type with a fixed serving data type.
pub trait Element: bytemuck::Pod {
    const DATA_TYPE: DataType;
}

macro_rules! element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$dtype;
        })*
    };
}

element! {
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    half::f16 => Fp16,
    half::bf16 => Bf16,
    f32 => Fp32,
    f64 => Fp64,
}
