use crate::{
    graph::Graph,
    onnx::proto::{SparseTensorProto, TypeProto},
    tensor::Tensor,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
    pub doc_string: String,
}

/// Static value of a node attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(Vec<u8>),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<Vec<u8>>),
    Tensor(Tensor),
    Tensors(Vec<Tensor>),
    Type(TypeProto),
    Types(Vec<TypeProto>),
    Graph(Graph),
    Graphs(Vec<Graph>),
    SparseTensor(SparseTensorProto),
    SparseTensors(Vec<SparseTensorProto>),
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            doc_string: String::new(),
        }
    }
}

impl AttributeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Float(_) => "FLOAT",
            Self::Int(_) => "INT",
            Self::String(_) => "STRING",
            Self::Floats(_) => "FLOATS",
            Self::Ints(_) => "INTS",
            Self::Strings(_) => "STRINGS",
            Self::Tensor(_) => "TENSOR",
            Self::Tensors(_) => "TENSORS",
            Self::Type(_) => "TYPE_PROTO",
            Self::Types(_) => "TYPE_PROTOS",
            Self::Graph(_) => "GRAPH",
            Self::Graphs(_) => "GRAPHS",
            Self::SparseTensor(_) => "SPARSE_TENSOR",
            Self::SparseTensors(_) => "SPARSE_TENSORS",
        }
    }
}

impl From<f32> for AttributeValue {
    fn from(x: f32) -> Self {
        Self::Float(x)
    }
}

impl From<i64> for AttributeValue {
    fn from(x: i64) -> Self {
        Self::Int(x)
    }
}

impl From<&str> for AttributeValue {
    fn from(x: &str) -> Self {
        Self::String(x.as_bytes().to_vec())
    }
}

impl From<Vec<f32>> for AttributeValue {
    fn from(x: Vec<f32>) -> Self {
        Self::Floats(x)
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(x: Vec<i64>) -> Self {
        Self::Ints(x)
    }
}

impl From<Tensor> for AttributeValue {
    fn from(x: Tensor) -> Self {
        Self::Tensor(x)
    }
}

impl From<TypeProto> for AttributeValue {
    fn from(x: TypeProto) -> Self {
        Self::Type(x)
    }
}

impl From<Graph> for AttributeValue {
    fn from(x: Graph) -> Self {
        Self::Graph(x)
    }
}
