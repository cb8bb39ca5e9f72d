use std::{fs, io, path::Path};

use prost::Message;
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
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    StringStringEntryProto, TensorProto, ValueInfoProto,
};

#[derive(Error, Debug)]
pub enum ModelSaveError {
    #[error("{0}")]
    Io(#[from] io::Error),
}

pub fn save_onnx(model: &Model, path: impl AsRef<Path>) -> Result<(), ModelSaveError> {
    fs::write(path, save_onnx_to_buffer(model))?;
    Ok(())
}

pub fn save_onnx_to_buffer(model: &Model) -> Vec<u8> {
    encode_model(model).encode_to_vec()
}

pub fn encode_model(model: &Model) -> ModelProto {
    ModelProto {
        ir_version: model.ir_version,
        opset_import: model
            .opset_import
            .iter()
            .map(|(domain, version)| OperatorSetIdProto {
                domain: domain.clone(),
                version: *version,
            })
            .collect(),
        producer_name: model.producer_name.clone(),
        producer_version: model.producer_version.clone(),
        domain: model.domain.clone(),
        model_version: model.model_version,
        doc_string: model.doc_string.clone(),
        graph: Some(encode_graph(&model.graph)),
        metadata_props: entries(&model.metadata),
        training_info: model.training_info.clone(),
        functions: model.functions.clone(),
        configuration: model.configuration.clone(),
    }
}

fn encode_graph(graph: &Graph) -> GraphProto {
    GraphProto {
        node: graph.nodes.iter().map(encode_node).collect(),
        name: graph.name.clone(),
        initializer: graph.inits.iter().map(encode_tensor).collect(),
        sparse_initializer: graph.sparse_inits.clone(),
        doc_string: graph.doc_string.clone(),
        input: graph.inputs.iter().map(encode_value_info).collect(),
        output: graph.outputs.iter().map(encode_value_info).collect(),
        value_info: graph.value_infos.iter().map(encode_value_info).collect(),
        quantization_annotation: graph.quantization_annotations.clone(),
        metadata_props: entries(&graph.metadata),
    }
}

fn encode_node(node: &Node) -> NodeProto {
    NodeProto {
        input: node.inputs.clone(),
        output: node.outputs.clone(),
        name: node.name.clone(),
        op_type: node.op_type.clone(),
        domain: node.domain.clone(),
        overload: node.overload.clone(),
        attribute: node.attributes.iter().map(encode_attribute).collect(),
        doc_string: node.doc_string.clone(),
        metadata_props: entries(&node.metadata),
        device_configurations: node.device_configurations.clone(),
    }
}

fn encode_attribute(attr: &Attribute) -> AttributeProto {
    let mut proto = AttributeProto {
        name: attr.name.clone(),
        doc_string: attr.doc_string.clone(),
        ..Default::default()
    };
    let ty = match &attr.value {
        AttributeValue::Float(x) => {
            proto.f = *x;
            AttributeType::Float
        }
        AttributeValue::Int(x) => {
            proto.i = *x;
            AttributeType::Int
        }
        AttributeValue::String(s) => {
            proto.s = s.clone();
            AttributeType::String
        }
        AttributeValue::Floats(xs) => {
            proto.floats = xs.clone();
            AttributeType::Floats
        }
        AttributeValue::Ints(xs) => {
            proto.ints = xs.clone();
            AttributeType::Ints
        }
        AttributeValue::Strings(ss) => {
            proto.strings = ss.clone();
            AttributeType::Strings
        }
        AttributeValue::Tensor(t) => {
            proto.t = Some(encode_tensor(t));
            AttributeType::Tensor
        }
        AttributeValue::Tensors(ts) => {
            proto.tensors = ts.iter().map(encode_tensor).collect();
            AttributeType::Tensors
        }
        AttributeValue::Type(tp) => {
            proto.tp = Some(tp.clone());
            AttributeType::TypeProto
        }
        AttributeValue::Types(tps) => {
            proto.type_protos = tps.clone();
            AttributeType::TypeProtos
        }
        AttributeValue::Graph(g) => {
            proto.g = Some(encode_graph(g));
            AttributeType::Graph
        }
        AttributeValue::Graphs(gs) => {
            proto.graphs = gs.iter().map(encode_graph).collect();
            AttributeType::Graphs
        }
        AttributeValue::SparseTensor(t) => {
            proto.sparse_tensor = Some(t.clone());
            AttributeType::SparseTensor
        }
        AttributeValue::SparseTensors(ts) => {
            proto.sparse_tensors = ts.clone();
            AttributeType::SparseTensors
        }
    };
    proto.r#type = ty as i32;
    proto
}

fn encode_tensor(tensor: &Tensor) -> TensorProto {
    let mut proto = TensorProto {
        dims: tensor.dims.clone(),
        data_type: DataType::from(tensor.elem_ty) as i32,
        name: tensor.name.clone(),
        doc_string: tensor.doc_string.clone(),
        metadata_props: entries(&tensor.metadata),
        ..Default::default()
    };
    match &tensor.data {
        TensorData::Raw(raw) => proto.raw_data = raw.clone(),
        TensorData::Strings(ss) => proto.string_data = ss.clone(),
        TensorData::External(external) => {
            proto.external_data = entries(external);
            proto.data_location = DataLocation::External as i32;
        }
    }
    proto
}

fn encode_value_info(info: &ValueInfo) -> ValueInfoProto {
    ValueInfoProto {
        name: info.name.clone(),
        r#type: info.ty.clone(),
        doc_string: info.doc_string.clone(),
        metadata_props: entries(&info.metadata),
    }
}

fn entries(pairs: &[(String, String)]) -> Vec<StringStringEntryProto> {
    pairs
        .iter()
        .map(|(key, value)| StringStringEntryProto {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

impl From<TensorElemType> for DataType {
    fn from(ty: TensorElemType) -> Self {
        match ty {
            TensorElemType::F32 => DataType::Float,
            TensorElemType::U8 => DataType::Uint8,
            TensorElemType::I8 => DataType::Int8,
            TensorElemType::U16 => DataType::Uint16,
            TensorElemType::I16 => DataType::Int16,
            TensorElemType::I32 => DataType::Int32,
            TensorElemType::I64 => DataType::Int64,
            TensorElemType::String => DataType::String,
            TensorElemType::Bool => DataType::Bool,
            TensorElemType::F16 => DataType::Float16,
            TensorElemType::F64 => DataType::Double,
            TensorElemType::U32 => DataType::Uint32,
            TensorElemType::U64 => DataType::Uint64,
            TensorElemType::Complex64 => DataType::Complex64,
            TensorElemType::Complex128 => DataType::Complex128,
            TensorElemType::BF16 => DataType::Bfloat16,
            TensorElemType::F8E4M3FN => DataType::Float8e4m3fn,
            TensorElemType::F8E4M3FNUZ => DataType::Float8e4m3fnuz,
            TensorElemType::F8E5M2 => DataType::Float8e5m2,
            TensorElemType::F8E5M2FNUZ => DataType::Float8e5m2fnuz,
            TensorElemType::U4 => DataType::Uint4,
            TensorElemType::I4 => DataType::Int4,
            TensorElemType::F4E2M1 => DataType::Float4e2m1,
        }
    }
}

#[test]
fn save_and_load_round_trip() {
    use super::load::load_onnx;

    let branch = Graph::new("then")
        .with_outputs(["t"])
        .with_node(Node::new("Identity").with_in("x").with_out("t"));
    let graph = Graph::new("main")
        .with_inputs(["c", "x"])
        .with_outputs(["y"])
        .with_init(Tensor::new(vec![2], vec![1i64, 2]).with_name("shape"))
        .with_node(
            Node::new("If")
                .with_name("if0")
                .with_in("c")
                .with_out("y")
                .with_attr("then_branch", branch.clone())
                .with_attr("else_branch", branch)
                .with_metadata("origin", "test"),
        );
    let model = Model::new(graph);

    let file = tempfile::NamedTempFile::new().unwrap();
    save_onnx(&model, file.path()).unwrap();
    assert_eq!(load_onnx(file.path()).unwrap(), model);
}
