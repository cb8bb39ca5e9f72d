use crate::{
    attribute::{Attribute, AttributeValue},
    onnx::proto::NodeDeviceConfigurationProto,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub name: String,
    pub op_type: String,
    pub domain: String,
    pub overload: String,
    /// Names of consumed values. An empty name marks an omitted optional input.
    pub inputs: Vec<String>,
    /// Names of produced values, by output slot. An empty name marks an unused output.
    pub outputs: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub metadata: Vec<(String, String)>,
    /// Placement of the node on devices, carried as-is.
    pub device_configurations: Vec<NodeDeviceConfigurationProto>,
    pub doc_string: String,
}

impl Node {
    pub fn new(op_type: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_in(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn with_ins<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.inputs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_out(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn with_outs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.outputs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Returns the subgraphs held by this node's attributes, in attribute order.
    pub fn subgraphs(&self) -> impl Iterator<Item = &crate::graph::Graph> {
        self.attributes
            .iter()
            .flat_map(|attr| match &attr.value {
                AttributeValue::Graph(g) => std::slice::from_ref(g),
                AttributeValue::Graphs(gs) => gs.as_slice(),
                _ => &[],
            })
    }
}
