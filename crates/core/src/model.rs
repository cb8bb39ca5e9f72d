use crate::{
    graph::Graph,
    onnx::proto::{DeviceConfigurationProto, FunctionProto, TrainingInfoProto},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub graph: Graph,
    pub ir_version: i64,
    /// `(domain, version)` pairs.
    pub opset_import: Vec<(String, i64)>,
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub model_version: i64,
    pub doc_string: String,
    pub metadata: Vec<(String, String)>,
    // Carried through untouched.
    pub functions: Vec<FunctionProto>,
    pub training_info: Vec<TrainingInfoProto>,
    pub configuration: Vec<DeviceConfigurationProto>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            graph: Graph::default(),
            ir_version: 8,
            opset_import: vec![(String::new(), 17)],
            producer_name: String::new(),
            producer_version: String::new(),
            domain: String::new(),
            model_version: 0,
            doc_string: String::new(),
            metadata: Vec::new(),
            functions: Vec::new(),
            training_info: Vec::new(),
            configuration: Vec::new(),
        }
    }
}

impl Model {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            ..Default::default()
        }
    }

    /// Returns the opset version imported for the default (`ai.onnx`) domain.
    pub fn opset_version(&self) -> Option<i64> {
        self.opset_import
            .iter()
            .find(|(domain, _)| domain.is_empty() || domain == "ai.onnx")
            .map(|&(_, version)| version)
    }
}

#[test]
fn default_opset_version() {
    let model = Model::default();
    assert_eq!(model.opset_version(), Some(17));
}
