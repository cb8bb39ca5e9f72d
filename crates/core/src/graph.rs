use std::fmt;

use crate::{
    attribute::AttributeValue,
    node::Node,
    onnx::proto::{SparseTensorProto, TensorAnnotation, TypeProto},
    tensor::Tensor,
};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Graph {
    pub name: String,
    /// Nodes in their original (topological) order.
    pub nodes: Vec<Node>,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    pub inits: Vec<Tensor>,
    pub sparse_inits: Vec<SparseTensorProto>,
    pub value_infos: Vec<ValueInfo>,
    pub quantization_annotations: Vec<TensorAnnotation>,
    pub metadata: Vec<(String, String)>,
    pub doc_string: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueInfo {
    pub name: String,
    pub ty: Option<TypeProto>,
    pub metadata: Vec<(String, String)>,
    pub doc_string: String,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_inputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.inputs.extend(names.into_iter().map(ValueInfo::new));
        self
    }

    pub fn with_outputs<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.outputs.extend(names.into_iter().map(ValueInfo::new));
        self
    }

    pub fn with_init(mut self, tensor: Tensor) -> Self {
        self.inits.push(tensor);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|v| v.name.as_str())
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|v| v.name.as_str())
    }

    /// Counts nodes of this graph and of every nested subgraph.
    pub fn count_nodes(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| 1 + node.subgraphs().map(Graph::count_nodes).sum::<usize>())
            .sum()
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        fn names<'a>(names: impl Iterator<Item = &'a str>) -> String {
            names
                .map(|n| if n.is_empty() { "_" } else { n })
                .collect::<Vec<_>>()
                .join(", ")
        }

        let pad = "  ".repeat(depth);
        writeln!(
            f,
            "graph {}({}) -> ({}) {{",
            self.name,
            names(self.input_names()),
            names(self.output_names())
        )?;
        for node in &self.nodes {
            let op = if node.domain.is_empty() {
                node.op_type.clone()
            } else {
                format!("{}::{}", node.domain, node.op_type)
            };
            write!(
                f,
                "{pad}  {} = {op}({})",
                names(node.outputs.iter().map(String::as_str)),
                names(node.inputs.iter().map(String::as_str))
            )?;
            let attrs = node
                .attributes
                .iter()
                .filter(|a| !matches!(a.value, AttributeValue::Graph(_) | AttributeValue::Graphs(_)))
                .map(|a| format!("{}={}", a.name, a.value))
                .collect::<Vec<_>>();
            if !attrs.is_empty() {
                write!(f, " [{}]", attrs.join(", "))?;
            }
            writeln!(f)?;
            for attr in &node.attributes {
                let subgraphs = match &attr.value {
                    AttributeValue::Graph(g) => std::slice::from_ref(g),
                    AttributeValue::Graphs(gs) => gs.as_slice(),
                    _ => continue,
                };
                for g in subgraphs {
                    write!(f, "{pad}    {}: ", attr.name)?;
                    g.fmt_nested(f, depth + 2)?;
                    writeln!(f)?;
                }
            }
        }
        write!(f, "{pad}}}")
    }
}

impl ValueInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            metadata: Vec::new(),
            doc_string: String::new(),
        }
    }
}

/// Renders a compact textual dump of the graph, one node per line.
impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_nested(f, 0)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Int(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
            Self::Floats(xs) => write!(f, "{xs:?}"),
            Self::Ints(xs) => write!(f, "{xs:?}"),
            Self::Strings(ss) => write!(
                f,
                "{:?}",
                ss.iter()
                    .map(|s| String::from_utf8_lossy(s))
                    .collect::<Vec<_>>()
            ),
            Self::Tensor(t) => write!(f, "tensor<{}>{:?}", t.elem_ty, t.dims),
            kind => write!(f, "<{}>", kind.kind()),
        }
    }
}

#[test]
fn count_nodes_includes_subgraphs() {
    let branch = Graph::new("branch")
        .with_outputs(["y"])
        .with_node(Node::new("Identity").with_in("x").with_out("y"));
    let mut g = Graph::new("main").with_inputs(["c", "x"]).with_outputs(["z"]);
    g.add_node(
        Node::new("If")
            .with_in("c")
            .with_out("z")
            .with_attr("then_branch", branch.clone())
            .with_attr("else_branch", branch),
    );
    assert_eq!(g.count_nodes(), 3);
}

#[test]
fn display_nested_graph() {
    let branch = Graph::new("branch")
        .with_outputs(["y"])
        .with_node(Node::new("Identity").with_in("x").with_out("y"));
    let g = Graph::new("main")
        .with_inputs(["c", "x"])
        .with_outputs(["z"])
        .with_node(
            Node::new("If")
                .with_in("c")
                .with_out("z")
                .with_attr("then_branch", branch),
        )
        .with_node(
            Node::new("Cast")
                .with_in("z")
                .with_out("w")
                .with_attr("to", 7i64),
        );
    insta::assert_snapshot!(g.to_string(), @r###"
    graph main(c, x) -> (z) {
      z = If(c)
        then_branch: graph branch() -> (y) {
          y = Identity(x)
        }
      w = Cast(z) [to=7]
    }
    "###);
}
