use std::fmt;

/// A dense tensor literal, as found in `Constant` attributes and graph initializers.
///
/// Numeric contents are always kept as little-endian raw bytes, whichever typed
/// field the tensor was stored in originally.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub name: String,
    pub dims: Vec<i64>,
    pub elem_ty: TensorElemType,
    pub data: TensorData,
    pub metadata: Vec<(String, String)>,
    pub doc_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TensorData {
    Raw(Vec<u8>),
    Strings(Vec<Vec<u8>>),
    /// Contents live outside of the model file. Holds the `external_data` entries.
    External(Vec<(String, String)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorElemType {
    F32,
    U8,
    I8,
    U16,
    I16,
    I32,
    I64,
    String,
    Bool,
    F16,
    F64,
    U32,
    U64,
    Complex64,
    Complex128,
    BF16,
    F8E4M3FN,
    F8E4M3FNUZ,
    F8E5M2,
    F8E5M2FNUZ,
    U4,
    I4,
    F4E2M1,
}

pub trait TensorElemTypeExt: Copy {
    fn get_type() -> TensorElemType;
    fn extend_le_bytes(self, buf: &mut Vec<u8>);
}

impl Tensor {
    pub fn new<T: TensorElemTypeExt>(dims: Vec<i64>, data: Vec<T>) -> Self {
        let mut raw = Vec::with_capacity(data.len() * std::mem::size_of::<T>());
        for x in data {
            x.extend_le_bytes(&mut raw);
        }
        Self::new_from_raw(dims, T::get_type(), raw)
    }

    pub fn new_from_raw(dims: Vec<i64>, elem_ty: TensorElemType, data: Vec<u8>) -> Self {
        Self {
            name: String::new(),
            dims,
            elem_ty,
            data: TensorData::Raw(data),
            metadata: Vec::new(),
            doc_string: String::new(),
        }
    }

    pub fn new_strings(dims: Vec<i64>, data: Vec<Vec<u8>>) -> Self {
        Self {
            name: String::new(),
            dims,
            elem_ty: TensorElemType::String,
            data: TensorData::Strings(data),
            metadata: Vec::new(),
            doc_string: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn scalar<T: TensorElemTypeExt>(x: T) -> Self {
        Self::new(vec![], vec![x])
    }

    pub fn elem_ty(&self) -> TensorElemType {
        self.elem_ty
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }
}

impl TensorElemType {
    /// Returns the size of an element in bytes, or `None` for types that are not byte-aligned
    /// or have no fixed size.
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::U8
            | Self::I8
            | Self::Bool
            | Self::F8E4M3FN
            | Self::F8E4M3FNUZ
            | Self::F8E5M2
            | Self::F8E5M2FNUZ => Some(1),
            Self::U16 | Self::I16 | Self::F16 | Self::BF16 => Some(2),
            Self::F32 | Self::I32 | Self::U32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 | Self::Complex64 => Some(8),
            Self::Complex128 => Some(16),
            Self::String | Self::U4 | Self::I4 | Self::F4E2M1 => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String)
    }
}

impl fmt::Display for TensorElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => "f32",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::String => "string",
            Self::Bool => "bool",
            Self::F16 => "f16",
            Self::F64 => "f64",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Complex64 => "c64",
            Self::Complex128 => "c128",
            Self::BF16 => "bf16",
            Self::F8E4M3FN => "f8e4m3fn",
            Self::F8E4M3FNUZ => "f8e4m3fnuz",
            Self::F8E5M2 => "f8e5m2",
            Self::F8E5M2FNUZ => "f8e5m2fnuz",
            Self::U4 => "u4",
            Self::I4 => "i4",
            Self::F4E2M1 => "f4e2m1",
        };
        write!(f, "{name}")
    }
}

macro_rules! impl_elem_type_ext {
    ($($t:ty => $ty:ident),* $(,)?) => {
        $(
            impl TensorElemTypeExt for $t {
                fn get_type() -> TensorElemType {
                    TensorElemType::$ty
                }

                fn extend_le_bytes(self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_elem_type_ext! {
    f32 => F32,
    f64 => F64,
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
}

impl TensorElemTypeExt for bool {
    fn get_type() -> TensorElemType {
        TensorElemType::Bool
    }

    fn extend_le_bytes(self, buf: &mut Vec<u8>) {
        buf.push(self as u8);
    }
}

#[test]
fn raw_bytes_are_little_endian() {
    let t = Tensor::new(vec![2], vec![1i32, 256]);
    assert_eq!(t.elem_ty(), TensorElemType::I32);
    assert_eq!(t.data, TensorData::Raw(vec![1, 0, 0, 0, 0, 1, 0, 0]));
}

#[test]
fn scalar_has_no_dims() {
    let t = Tensor::scalar(true);
    assert!(t.dims().is_empty());
    assert_eq!(t.data, TensorData::Raw(vec![1]));
}
