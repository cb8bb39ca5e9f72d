//! Common subexpression elimination.
//!
//! Every node is given a content digest computed from its operator, metadata, attributes
//! and the digests of its inputs. A node none of whose outputs has a new digest is
//! redundant: it is dropped, and its consumers are rewired to the values that first
//! produced the same digests. Subgraphs (e.g. `If` branches, `Loop` bodies) are rewritten
//! first, in a scope forked from their parent's, and the owning node's digest depends on
//! their outputs' digests instead of their text.
//!
//! Declared graph outputs keep their names: when the producer of one is eliminated, an
//! `Identity` node copying the canonical value into it is emitted instead. Such nodes are
//! hashed like any other `Identity`, so several outputs sharing one value are chained
//! (`o2 = Identity(o1)`, `o3 = Identity(o2)`) and a second run finds nothing to merge.

pub mod digest;
pub mod encode;
pub mod scope;

use std::time::Instant;

use prost::Message;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{
    attribute::{Attribute, AttributeValue},
    graph::Graph,
    model::Model,
    node::Node,
};

use self::{
    digest::{Digest, DigestBuilder},
    encode::encode_attribute,
    scope::Scope,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CseError {
    #[error("Malformed graph: {0}")]
    MalformedGraph(#[from] MalformedGraphError),

    #[error("Attribute '{name}' of type {kind} cannot be encoded")]
    UnsupportedAttribute { name: String, kind: &'static str },

    #[error("Attribute '{0}' holds a list of graphs, which is not supported")]
    UnsupportedOutputCardinality(String),

    /// Internal invariant violation: every bound digest has a canonical name.
    #[error("Digest {0} has no canonical name")]
    MissingCanonicalName(Digest),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedGraphError {
    #[error("value '{0}' is used before it is defined")]
    UndefinedValue(String),

    #[error("value '{0}' is defined more than once")]
    RedefinedValue(String),
}

/// Counts over all nesting levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CseStats {
    /// Nodes dropped as duplicates.
    pub eliminated: usize,
    /// `Identity` nodes inserted to keep declared outputs bound.
    pub passthroughs: usize,
}

/// Eliminates common subexpressions of `model.graph`. On error, `model` is left untouched.
pub fn eliminate_common_subexpressions(model: &mut Model) -> Result<CseStats, CseError> {
    let start = Instant::now();

    let (graph, stats) = eliminate_with_stats(&model.graph)?;
    model.graph = graph;

    log::info!(
        "eliminate_common_subexpressions({}): {:?}",
        stats.eliminated,
        start.elapsed()
    );

    Ok(stats)
}

/// Returns `graph` with redundant nodes removed. Declared inputs and outputs are unchanged.
pub fn eliminate(graph: &Graph) -> Result<Graph, CseError> {
    eliminate_with_stats(graph).map(|(graph, _)| graph)
}

pub fn eliminate_with_stats(graph: &Graph) -> Result<(Graph, CseStats), CseError> {
    let mut scope = Scope::new(graph.output_names());
    let mut rewriter = Rewriter::default();
    let graph = rewriter.rewrite_graph(graph, &mut scope)?;
    Ok((graph, rewriter.stats))
}

/// Rewrites `graph` in `scope`, which must already be seeded with the graph's declared
/// outputs and every outer value the graph refers to. `scope` is left holding the digests
/// of every value of the graph.
pub fn rewrite_graph(graph: &Graph, scope: &mut Scope) -> Result<Graph, CseError> {
    Rewriter::default().rewrite_graph(graph, scope)
}

enum Outcome {
    Kept(Node),
    Eliminated(Vec<Node>),
}

#[derive(Default)]
struct Rewriter {
    stats: CseStats,
}

impl Rewriter {
    fn rewrite_graph(&mut self, graph: &Graph, scope: &mut Scope) -> Result<Graph, CseError> {
        // Inputs and initializers have unknown contents: they only get a digest of their name.
        let inputs = graph.input_names().collect::<FxHashSet<_>>();
        let inits = graph
            .inits
            .iter()
            .map(|t| t.name.as_str())
            .chain(graph.sparse_inits.iter().filter_map(|t| {
                t.values.as_ref().map(|v| v.name.as_str())
            }))
            .filter(|name| !inputs.contains(name));
        for name in graph.input_names().chain(inits) {
            if !name.is_empty() {
                scope.introduce(name, Digest::of_name(name))?;
            }
        }

        let mut nodes = Vec::with_capacity(graph.nodes.len());
        let mut removed_values = FxHashSet::default();
        for node in &graph.nodes {
            match self.process_node(node, scope)? {
                Outcome::Kept(node) => nodes.push(node),
                Outcome::Eliminated(passthroughs) => {
                    removed_values.extend(
                        node.outputs
                            .iter()
                            .filter(|name| !scope.is_declared_output(name))
                            .map(String::as_str),
                    );
                    self.stats.eliminated += 1;
                    self.stats.passthroughs += passthroughs.len();
                    nodes.extend(passthroughs);
                }
            }
        }

        Ok(Graph {
            name: graph.name.clone(),
            nodes,
            inputs: graph.inputs.clone(),
            outputs: graph.outputs.clone(),
            inits: graph.inits.clone(),
            sparse_inits: graph.sparse_inits.clone(),
            value_infos: graph
                .value_infos
                .iter()
                .filter(|info| !removed_values.contains(info.name.as_str()))
                .cloned()
                .collect(),
            quantization_annotations: graph.quantization_annotations.clone(),
            metadata: graph.metadata.clone(),
            doc_string: graph.doc_string.clone(),
        })
    }

    fn process_node(&mut self, node: &Node, scope: &mut Scope) -> Result<Outcome, CseError> {
        let (digest, attributes) = self.canonicalize(node, scope)?;

        let mut has_new_output = false;
        for (slot, name) in node.outputs.iter().enumerate() {
            // Unused outputs are invisible to CSE.
            if name.is_empty() {
                continue;
            }
            has_new_output |= scope.introduce(name, digest.finish_slot(slot))?;
        }

        if !has_new_output {
            let mut passthroughs = vec![];
            for name in &node.outputs {
                if name.is_empty() || !scope.is_declared_output(name) {
                    continue;
                }
                let mut source = scope.canonical_name(name)?.to_owned();
                let mut copied = identity_digest(scope.lookup(name)?);
                while let Some(prev) = scope.find_canonical_name(&copied) {
                    source = prev.to_owned();
                    copied = identity_digest(copied);
                }
                scope.witness(copied, name);
                log::debug!("keep declared output '{name}' as Identity({source})");
                passthroughs.push(Node::new("Identity").with_in(source).with_out(name));
            }
            log::debug!(
                "eliminate {} '{}' ({})",
                node.op_type,
                node.name,
                node.outputs.join(", ")
            );
            return Ok(Outcome::Eliminated(passthroughs));
        }

        let inputs = node
            .inputs
            .iter()
            .map(|name| {
                if name.is_empty() {
                    Ok(String::new())
                } else {
                    scope.canonical_name(name).map(str::to_owned)
                }
            })
            .collect::<Result<Vec<_>, CseError>>()?;

        Ok(Outcome::Kept(Node {
            name: node.name.clone(),
            op_type: node.op_type.clone(),
            domain: node.domain.clone(),
            overload: node.overload.clone(),
            inputs,
            outputs: node.outputs.clone(),
            attributes,
            metadata: node.metadata.clone(),
            device_configurations: node.device_configurations.clone(),
            doc_string: node.doc_string.clone(),
        }))
    }

    /// Hashes the node's inputs, operator, metadata and attributes.
    ///
    /// Subgraph attributes are rewritten on the way. Returns the unfinished digest, to be
    /// completed per output slot, and the node's attributes with rewritten subgraphs.
    fn canonicalize(
        &mut self,
        node: &Node,
        scope: &Scope,
    ) -> Result<(DigestBuilder, Vec<Attribute>), CseError> {
        let inputs = node
            .inputs
            .iter()
            .map(|name| {
                if name.is_empty() {
                    Ok(None)
                } else {
                    scope.lookup(name).map(Some)
                }
            })
            .collect::<Result<Vec<_>, CseError>>()?;
        let mut h = signature(node, &inputs);

        let mut attributes = Vec::with_capacity(node.attributes.len());
        for attr in &node.attributes {
            let value = match &attr.value {
                AttributeValue::Graph(g) => {
                    log::trace!("enter subgraph '{}' of {}", attr.name, node.op_type);
                    let mut sub_scope = scope.fork_for_subgraph(g.output_names());
                    let g = self.rewrite_graph(g, &mut sub_scope)?;
                    h.update_u8(SUBGRAPH_ATTRIBUTE)
                        .update_str(&attr.name)
                        .update_len(g.outputs.len());
                    for name in g.output_names() {
                        h.update_digest(&sub_scope.lookup(name)?);
                    }
                    AttributeValue::Graph(g)
                }
                value => {
                    h.update_u8(ENCODED_ATTRIBUTE)
                        .update_bytes(&encode_attribute(attr)?);
                    value.clone()
                }
            };
            attributes.push(Attribute {
                name: attr.name.clone(),
                value,
                doc_string: attr.doc_string.clone(),
            });
        }

        Ok((h, attributes))
    }
}

const ENCODED_ATTRIBUTE: u8 = 0;
const SUBGRAPH_ATTRIBUTE: u8 = 1;

/// Hashes everything of `node` but its attribute values. `inputs` holds the digests of
/// its inputs, `None` for an omitted one.
fn signature(node: &Node, inputs: &[Option<Digest>]) -> DigestBuilder {
    let mut h = DigestBuilder::new();

    // Omitted optional inputs still occupy their position.
    h.update_len(inputs.len());
    for input in inputs {
        match input {
            Some(digest) => h.update_u8(1).update_digest(digest),
            None => h.update_u8(0),
        };
    }

    h.update_str(&node.op_type)
        .update_str(&node.domain)
        .update_str(&node.overload);

    h.update_len(node.metadata.len());
    for (key, value) in &node.metadata {
        h.update_str(key).update_str(value);
    }
    h.update_len(node.device_configurations.len());
    for config in &node.device_configurations {
        h.update_bytes(&config.encode_to_vec());
    }

    h.update_len(node.attributes.len());
    h
}

/// Digest of the output of `Identity(x)` where `x` has digest `input`.
fn identity_digest(input: Digest) -> Digest {
    signature(&Node::new("Identity"), &[Some(input)]).finish_slot(0)
}
