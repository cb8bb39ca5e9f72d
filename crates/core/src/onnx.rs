pub mod load;
pub mod proto;
pub mod save;

pub use load::{load_onnx, load_onnx_from_buffer, load_onnx_from_model_proto, ModelLoadError};
pub use save::{encode_model, save_onnx, save_onnx_to_buffer, ModelSaveError};
