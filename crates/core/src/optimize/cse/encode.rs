use prost::Message;

use super::CseError;
use crate::{
    attribute::{Attribute, AttributeValue},
    tensor::{Tensor, TensorData},
};

/// Serializes a static attribute (name included) into bytes for hashing.
///
/// Two attributes encode to the same bytes iff they have the same name, kind and value.
/// Subgraph attributes are not encodable: they are hashed through their rewritten outputs.
pub fn encode_attribute(attr: &Attribute) -> Result<Vec<u8>, CseError> {
    let mut e = Encoder::default();
    e.put_bytes(attr.name.as_bytes());
    match &attr.value {
        AttributeValue::Float(x) => {
            e.put_u8(1);
            e.put_f32(*x);
        }
        AttributeValue::Int(x) => {
            e.put_u8(2);
            e.put_i64(*x);
        }
        AttributeValue::String(s) => {
            e.put_u8(3);
            e.put_bytes(s);
        }
        AttributeValue::Tensor(t) => {
            e.put_u8(4);
            e.put_tensor(t);
        }
        AttributeValue::Floats(xs) => {
            e.put_u8(6);
            e.put_len(xs.len());
            xs.iter().for_each(|&x| e.put_f32(x));
        }
        AttributeValue::Ints(xs) => {
            e.put_u8(7);
            e.put_len(xs.len());
            xs.iter().for_each(|&x| e.put_i64(x));
        }
        AttributeValue::Strings(ss) => {
            e.put_u8(8);
            e.put_len(ss.len());
            ss.iter().for_each(|s| e.put_bytes(s));
        }
        AttributeValue::Tensors(ts) => {
            e.put_u8(9);
            e.put_len(ts.len());
            ts.iter().for_each(|t| e.put_tensor(t));
        }
        AttributeValue::Type(tp) => {
            e.put_u8(13);
            e.put_bytes(&tp.encode_to_vec());
        }
        AttributeValue::Types(tps) => {
            e.put_u8(14);
            e.put_len(tps.len());
            tps.iter().for_each(|tp| e.put_bytes(&tp.encode_to_vec()));
        }
        AttributeValue::Graphs(_) => {
            return Err(CseError::UnsupportedOutputCardinality(attr.name.clone()))
        }
        value @ (AttributeValue::Graph(_)
        | AttributeValue::SparseTensor(_)
        | AttributeValue::SparseTensors(_)) => {
            return Err(CseError::UnsupportedAttribute {
                name: attr.name.clone(),
                kind: value.kind(),
            })
        }
    }
    Ok(e.0)
}

#[derive(Default)]
struct Encoder(Vec<u8>);

impl Encoder {
    fn put_u8(&mut self, x: u8) {
        self.0.push(x);
    }

    fn put_len(&mut self, len: usize) {
        self.0.extend_from_slice(&(len as u64).to_le_bytes());
    }

    fn put_i64(&mut self, x: i64) {
        self.0.extend_from_slice(&x.to_le_bytes());
    }

    fn put_f32(&mut self, x: f32) {
        self.0.extend_from_slice(&x.to_bits().to_le_bytes());
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_len(bytes.len());
        self.0.extend_from_slice(bytes);
    }

    // The tensor's name and doc string are not part of its value.
    fn put_tensor(&mut self, t: &Tensor) {
        self.put_u8(t.elem_ty as u8);
        self.put_len(t.dims.len());
        t.dims.iter().for_each(|&d| self.put_i64(d));
        match &t.data {
            TensorData::Raw(raw) => {
                self.put_u8(0);
                self.put_bytes(raw);
            }
            TensorData::Strings(ss) => {
                self.put_u8(1);
                self.put_len(ss.len());
                ss.iter().for_each(|s| self.put_bytes(s));
            }
            TensorData::External(entries) => {
                self.put_u8(2);
                self.put_len(entries.len());
                for (key, value) in entries {
                    self.put_bytes(key.as_bytes());
                    self.put_bytes(value.as_bytes());
                }
            }
        }
        self.put_len(t.metadata.len());
        for (key, value) in &t.metadata {
            self.put_bytes(key.as_bytes());
            self.put_bytes(value.as_bytes());
        }
    }
}
