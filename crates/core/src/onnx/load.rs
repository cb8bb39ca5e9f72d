use prost::{DecodeError, Message};
use std::{borrow::Cow, fs, io, path::Path};
use thiserror::Error;

use crate::{
    attribute::{Attribute, AttributeValue},
    graph::{Graph, ValueInfo},
    model::Model,
    node::Node,
    tensor::{Tensor, TensorData, TensorElemType},
};

use super::proto::{
    attribute_proto::AttributeType,
    tensor_proto::{DataLocation, DataType},
    AttributeProto, GraphProto, ModelProto, NodeProto, StringStringEntryProto, TensorProto,
    ValueInfoProto,
};

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("Model does not contain any graph")]
    NoGraph,

    #[error("Model is invalid: {0}")]
    InvalidModel(DecodeError),

    #[error("Attribute '{0}' has unknown type {1}")]
    UnknownAttributeType(String, i32),

    #[error("Attribute '{0}' has no value")]
    NoAttributeValue(String),

    #[error("Unknown tensor data type: {0}")]
    UnknownDataType(i32),

    #[error("Something went wrong: {0}")]
    Todo(Cow<'static, str>),
}

pub fn load_onnx(path: impl AsRef<Path>) -> Result<Model, ModelLoadError> {
    load_onnx_from_buffer(&fs::read(path)?)
}

pub fn load_onnx_from_buffer(buf: &[u8]) -> Result<Model, ModelLoadError> {
    let model = ModelProto::decode(buf).map_err(ModelLoadError::InvalidModel)?;
    load_onnx_from_model_proto(model)
}

pub fn load_onnx_from_model_proto(model_proto: ModelProto) -> Result<Model, ModelLoadError> {
    let graph = model_proto.graph.ok_or(ModelLoadError::NoGraph)?;
    Ok(Model {
        graph: load_graph(graph)?,
        ir_version: model_proto.ir_version,
        opset_import: model_proto
            .opset_import
            .into_iter()
            .map(|opset| (opset.domain, opset.version))
            .collect(),
        producer_name: model_proto.producer_name,
        producer_version: model_proto.producer_version,
        domain: model_proto.domain,
        model_version: model_proto.model_version,
        doc_string: model_proto.doc_string,
        metadata: pairs(model_proto.metadata_props),
        functions: model_proto.functions,
        training_info: model_proto.training_info,
        configuration: model_proto.configuration,
    })
}

fn load_graph(graph: GraphProto) -> Result<Graph, ModelLoadError> {
    Ok(Graph {
        name: graph.name,
        nodes: graph
            .node
            .into_iter()
            .map(load_node)
            .collect::<Result<_, _>>()?,
        inputs: graph.input.into_iter().map(load_value_info).collect(),
        outputs: graph.output.into_iter().map(load_value_info).collect(),
        inits: graph
            .initializer
            .into_iter()
            .map(load_tensor)
            .collect::<Result<_, _>>()?,
        sparse_inits: graph.sparse_initializer,
        value_infos: graph.value_info.into_iter().map(load_value_info).collect(),
        quantization_annotations: graph.quantization_annotation,
        metadata: pairs(graph.metadata_props),
        doc_string: graph.doc_string,
    })
}

fn load_node(node: NodeProto) -> Result<Node, ModelLoadError> {
    Ok(Node {
        name: node.name,
        op_type: node.op_type,
        domain: node.domain,
        overload: node.overload,
        inputs: node.input,
        outputs: node.output,
        attributes: node
            .attribute
            .into_iter()
            .map(load_attribute)
            .collect::<Result<_, _>>()?,
        metadata: pairs(node.metadata_props),
        device_configurations: node.device_configurations,
        doc_string: node.doc_string,
    })
}

fn load_attribute(attr: AttributeProto) -> Result<Attribute, ModelLoadError> {
    if !attr.ref_attr_name.is_empty() {
        return Err(ModelLoadError::Todo(
            format!(
                "Attribute '{}' refers to a function attribute, which is only valid in functions",
                attr.name
            )
            .into(),
        ));
    }

    let name = attr.name;
    let missing = || ModelLoadError::NoAttributeValue(name.clone());
    let value = match AttributeType::from_i32(attr.r#type) {
        Some(AttributeType::Float) => AttributeValue::Float(attr.f),
        Some(AttributeType::Int) => AttributeValue::Int(attr.i),
        Some(AttributeType::String) => AttributeValue::String(attr.s),
        Some(AttributeType::Tensor) => {
            AttributeValue::Tensor(load_tensor(attr.t.ok_or_else(missing)?)?)
        }
        Some(AttributeType::Graph) => AttributeValue::Graph(load_graph(attr.g.ok_or_else(missing)?)?),
        Some(AttributeType::SparseTensor) => {
            AttributeValue::SparseTensor(attr.sparse_tensor.ok_or_else(missing)?)
        }
        Some(AttributeType::TypeProto) => AttributeValue::Type(attr.tp.ok_or_else(missing)?),
        Some(AttributeType::Floats) => AttributeValue::Floats(attr.floats),
        Some(AttributeType::Ints) => AttributeValue::Ints(attr.ints),
        Some(AttributeType::Strings) => AttributeValue::Strings(attr.strings),
        Some(AttributeType::Tensors) => AttributeValue::Tensors(
            attr.tensors
                .into_iter()
                .map(load_tensor)
                .collect::<Result<_, _>>()?,
        ),
        Some(AttributeType::Graphs) => AttributeValue::Graphs(
            attr.graphs
                .into_iter()
                .map(load_graph)
                .collect::<Result<_, _>>()?,
        ),
        Some(AttributeType::SparseTensors) => AttributeValue::SparseTensors(attr.sparse_tensors),
        Some(AttributeType::TypeProtos) => AttributeValue::Types(attr.type_protos),
        Some(AttributeType::Undefined) | None => {
            return Err(ModelLoadError::UnknownAttributeType(name, attr.r#type))
        }
    };

    Ok(Attribute {
        name,
        value,
        doc_string: attr.doc_string,
    })
}

fn load_tensor(tensor: TensorProto) -> Result<Tensor, ModelLoadError> {
    if tensor.segment.is_some() {
        return Err(ModelLoadError::Todo(
            format!("Tensor '{}' is segmented", tensor.name).into(),
        ));
    }

    let elem_ty = TensorElemType::try_from(
        DataType::from_i32(tensor.data_type)
            .ok_or(ModelLoadError::UnknownDataType(tensor.data_type))?,
    )?;
    let data = if tensor.data_location == DataLocation::External as i32 {
        TensorData::External(pairs(tensor.external_data))
    } else if elem_ty.is_string() {
        TensorData::Strings(tensor.string_data)
    } else if !tensor.raw_data.is_empty() {
        TensorData::Raw(tensor.raw_data)
    } else {
        TensorData::Raw(typed_data_to_raw(elem_ty, &tensor))
    };

    Ok(Tensor {
        name: tensor.name,
        dims: tensor.dims,
        elem_ty,
        data,
        metadata: pairs(tensor.metadata_props),
        doc_string: tensor.doc_string,
    })
}

/// Converts the typed storage fields of a tensor into little-endian raw bytes.
fn typed_data_to_raw(elem_ty: TensorElemType, tensor: &TensorProto) -> Vec<u8> {
    let mut raw = Vec::new();
    match elem_ty {
        TensorElemType::F32 | TensorElemType::Complex64 => {
            tensor
                .float_data
                .iter()
                .for_each(|x| raw.extend_from_slice(&x.to_le_bytes()));
        }
        TensorElemType::F64 | TensorElemType::Complex128 => {
            tensor
                .double_data
                .iter()
                .for_each(|x| raw.extend_from_slice(&x.to_le_bytes()));
        }
        TensorElemType::I64 => {
            tensor
                .int64_data
                .iter()
                .for_each(|x| raw.extend_from_slice(&x.to_le_bytes()));
        }
        TensorElemType::U32 => {
            tensor
                .uint64_data
                .iter()
                .for_each(|&x| raw.extend_from_slice(&(x as u32).to_le_bytes()));
        }
        TensorElemType::U64 => {
            tensor
                .uint64_data
                .iter()
                .for_each(|x| raw.extend_from_slice(&x.to_le_bytes()));
        }
        TensorElemType::String => {}
        // Everything else is stored in `int32_data`, one element (or one packed byte of
        // 4-bit elements) per entry.
        _ => {
            let width = elem_ty.size().unwrap_or(1);
            tensor
                .int32_data
                .iter()
                .for_each(|x| raw.extend_from_slice(&x.to_le_bytes()[..width]));
        }
    }
    raw
}

fn load_value_info(info: ValueInfoProto) -> ValueInfo {
    ValueInfo {
        name: info.name,
        ty: info.r#type,
        metadata: pairs(info.metadata_props),
        doc_string: info.doc_string,
    }
}

fn pairs(entries: Vec<StringStringEntryProto>) -> Vec<(String, String)> {
    entries.into_iter().map(|e| (e.key, e.value)).collect()
}

impl TryFrom<DataType> for TensorElemType {
    type Error = ModelLoadError;

    fn try_from(ty: DataType) -> Result<Self, Self::Error> {
        match ty {
            DataType::Float => Ok(TensorElemType::F32),
            DataType::Uint8 => Ok(TensorElemType::U8),
            DataType::Int8 => Ok(TensorElemType::I8),
            DataType::Uint16 => Ok(TensorElemType::U16),
            DataType::Int16 => Ok(TensorElemType::I16),
            DataType::Int32 => Ok(TensorElemType::I32),
            DataType::Int64 => Ok(TensorElemType::I64),
            DataType::String => Ok(TensorElemType::String),
            DataType::Bool => Ok(TensorElemType::Bool),
            DataType::Float16 => Ok(TensorElemType::F16),
            DataType::Double => Ok(TensorElemType::F64),
            DataType::Uint32 => Ok(TensorElemType::U32),
            DataType::Uint64 => Ok(TensorElemType::U64),
            DataType::Complex64 => Ok(TensorElemType::Complex64),
            DataType::Complex128 => Ok(TensorElemType::Complex128),
            DataType::Bfloat16 => Ok(TensorElemType::BF16),
            DataType::Float8e4m3fn => Ok(TensorElemType::F8E4M3FN),
            DataType::Float8e4m3fnuz => Ok(TensorElemType::F8E4M3FNUZ),
            DataType::Float8e5m2 => Ok(TensorElemType::F8E5M2),
            DataType::Float8e5m2fnuz => Ok(TensorElemType::F8E5M2FNUZ),
            DataType::Uint4 => Ok(TensorElemType::U4),
            DataType::Int4 => Ok(TensorElemType::I4),
            DataType::Float4e2m1 => Ok(TensorElemType::F4E2M1),
            DataType::Undefined => Err(ModelLoadError::UnknownDataType(ty as i32)),
        }
    }
}

#[test]
fn typed_storage_is_normalized() {
    let from_typed = TensorProto {
        dims: vec![2],
        data_type: DataType::Float as i32,
        float_data: vec![1.0, 2.0],
        ..Default::default()
    };
    let from_raw = TensorProto {
        dims: vec![2],
        data_type: DataType::Float as i32,
        raw_data: [1.0f32.to_le_bytes(), 2.0f32.to_le_bytes()].concat(),
        ..Default::default()
    };
    assert_eq!(
        load_tensor(from_typed).unwrap(),
        load_tensor(from_raw).unwrap()
    );
}

#[test]
fn narrow_ints_use_their_own_width() {
    let tensor = TensorProto {
        dims: vec![3],
        data_type: DataType::Int16 as i32,
        int32_data: vec![1, -1, 258],
        ..Default::default()
    };
    let tensor = load_tensor(tensor).unwrap();
    assert_eq!(tensor.elem_ty, TensorElemType::I16);
    assert_eq!(tensor.data, TensorData::Raw(vec![1, 0, 0xff, 0xff, 2, 1]));
}

#[test]
fn untyped_attribute_is_rejected() {
    let attr = AttributeProto {
        name: "axis".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        load_attribute(attr),
        Err(ModelLoadError::UnknownAttributeType(name, 0)) if name == "axis"
    ));
}

#[test]
fn model_without_graph_is_rejected() {
    let buf = ModelProto::default().encode_to_vec();
    assert!(matches!(
        load_onnx_from_buffer(&buf),
        Err(ModelLoadError::NoGraph)
    ));
}
