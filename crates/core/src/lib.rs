pub mod attribute;
pub mod graph;
pub mod model;
pub mod node;
pub mod onnx;
pub mod optimize;
pub mod tensor;
