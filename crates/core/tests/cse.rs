use onnx_cse_core::{
    attribute::{Attribute, AttributeValue},
    graph::{Graph, ValueInfo},
    model::Model,
    node::Node,
    optimize::cse::{
        digest::Digest, eliminate, eliminate_common_subexpressions, eliminate_with_stats,
        encode::encode_attribute, rewrite_graph, scope::Scope, CseError, CseStats,
        MalformedGraphError,
    },
    tensor::Tensor,
};

fn binary(op: &str, lhs: &str, rhs: &str, out: &str) -> Node {
    Node::new(op).with_in(lhs).with_in(rhs).with_out(out)
}

fn unary(op: &str, x: &str, out: &str) -> Node {
    Node::new(op).with_in(x).with_out(out)
}

fn constant(value: i64, out: &str) -> Node {
    Node::new("Constant")
        .with_out(out)
        .with_attr("value", Tensor::scalar(value))
}

fn assert_idempotent(graph: &Graph) {
    let once = eliminate(graph).unwrap();
    let twice = eliminate(&once).unwrap();
    assert_eq!(once, twice);
}

fn redundant_add() -> Graph {
    Graph::new("main")
        .with_inputs(["a", "b"])
        .with_outputs(["out1", "out2"])
        .with_node(binary("Add", "a", "b", "out1"))
        .with_node(binary("Add", "a", "b", "out2"))
}

fn redundant_add_in_subgraphs() -> Graph {
    let branch = Graph::new("sub")
        .with_outputs(["inner_add"])
        .with_node(binary("Add", "a", "b", "inner_add"));
    Graph::new("main")
        .with_inputs(["a", "b", "cond"])
        .with_outputs(["outer_add", "if_out"])
        .with_node(binary("Add", "a", "b", "outer_add"))
        .with_node(
            Node::new("If")
                .with_in("cond")
                .with_out("if_out")
                .with_attr("then_branch", branch.clone())
                .with_attr("else_branch", branch),
        )
}

fn redundant_constants() -> Graph {
    Graph::new("main")
        .with_outputs(["out"])
        .with_node(constant(1, "c1"))
        .with_node(constant(1, "c2"))
        .with_node(binary("Add", "c1", "c2", "out"))
}

fn if_with_branches(cond: &str, out: &str, tag: &str) -> Node {
    let branch = |side: &str| {
        Graph::new(format!("{side}_{tag}"))
            .with_outputs([format!("{side}_out_{tag}")])
            .with_node(unary("Neg", "x", &format!("{side}_tmp_{tag}")))
            .with_node(unary(
                "Abs",
                &format!("{side}_tmp_{tag}"),
                &format!("{side}_out_{tag}"),
            ))
    };
    Node::new("If")
        .with_in(cond)
        .with_out(out)
        .with_attr("then_branch", branch("then"))
        .with_attr("else_branch", branch("else"))
}

#[test]
fn duplicate_declared_output_becomes_identity() {
    let graph = redundant_add();
    let (result, stats) = eliminate_with_stats(&graph).unwrap();
    assert_eq!(
        stats,
        CseStats {
            eliminated: 1,
            passthroughs: 1
        }
    );
    assert_eq!(result.count_nodes(), 2);
    insta::assert_snapshot!(result.to_string(), @r###"
    graph main(a, b) -> (out1, out2) {
      out1 = Add(a, b)
      out2 = Identity(out1)
    }
    "###);
    assert_idempotent(&graph);
}

#[test]
fn shared_declared_outputs_are_chained() {
    let graph = Graph::new("main")
        .with_inputs(["a", "b"])
        .with_outputs(["o1", "o2", "o3"])
        .with_node(binary("Add", "a", "b", "o1"))
        .with_node(binary("Add", "a", "b", "o2"))
        .with_node(binary("Add", "a", "b", "o3"));
    let (result, stats) = eliminate_with_stats(&graph).unwrap();
    assert_eq!(
        stats,
        CseStats {
            eliminated: 2,
            passthroughs: 2
        }
    );
    insta::assert_snapshot!(result.to_string(), @r###"
    graph main(a, b) -> (o1, o2, o3) {
      o1 = Add(a, b)
      o2 = Identity(o1)
      o3 = Identity(o2)
    }
    "###);
    let (_, stats) = eliminate_with_stats(&result).unwrap();
    assert_eq!(stats, CseStats::default());
    assert_idempotent(&graph);
}

#[test]
fn passthrough_follows_existing_identity() {
    let graph = Graph::new("main")
        .with_inputs(["a", "b"])
        .with_outputs(["o1", "o2", "o3"])
        .with_node(binary("Add", "a", "b", "o1"))
        .with_node(unary("Identity", "o1", "o2"))
        .with_node(binary("Add", "a", "b", "o3"));
    let result = eliminate(&graph).unwrap();
    insta::assert_snapshot!(result.to_string(), @r###"
    graph main(a, b) -> (o1, o2, o3) {
      o1 = Add(a, b)
      o2 = Identity(o1)
      o3 = Identity(o2)
    }
    "###);
    assert_idempotent(&graph);
}

#[test]
fn subgraph_and_encoded_attributes_do_not_alias() {
    // A subgraph attribute named after the bytes of another attribute's encoding.
    let encoded = encode_attribute(&Attribute::new("k", 1i64)).unwrap();
    let name = String::from_utf8(encoded).unwrap();
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["y0", "y1"])
        .with_node(unary("Custom", "x", "y0").with_attr(name, Graph::new("g")))
        .with_node(unary("Custom", "x", "y1").with_attr("k", 1i64));
    assert_eq!(eliminate(&graph).unwrap(), graph);
}

#[test]
fn subgraph_duplicates_of_outer_values() {
    let graph = redundant_add_in_subgraphs();
    let result = eliminate(&graph).unwrap();
    assert_eq!(result.count_nodes(), 4);
    insta::assert_snapshot!(result.to_string(), @r###"
    graph main(a, b, cond) -> (outer_add, if_out) {
      outer_add = Add(a, b)
      if_out = If(cond)
        then_branch: graph sub() -> (inner_add) {
          inner_add = Identity(outer_add)
        }
        else_branch: graph sub() -> (inner_add) {
          inner_add = Identity(outer_add)
        }
    }
    "###);
    assert_idempotent(&graph);
}

#[test]
fn identical_constants_are_merged() {
    let graph = redundant_constants();
    let result = eliminate(&graph).unwrap();
    assert_eq!(result.count_nodes(), graph.count_nodes() - 1);
    insta::assert_snapshot!(result.to_string(), @r###"
    graph main() -> (out) {
      c1 = Constant() [value=tensor<i64>[]]
      out = Add(c1, c1)
    }
    "###);
    assert_idempotent(&graph);
}

#[test]
fn branches_hash_independently_of_names() {
    let mut scope = Scope::new(["y"]);
    scope.introduce("x", Digest::of_name("x")).unwrap();

    let node = if_with_branches("c", "y", "0");
    let then_branch = &node.attributes[0].value;
    let else_branch = &node.attributes[1].value;
    let (AttributeValue::Graph(then_branch), AttributeValue::Graph(else_branch)) =
        (then_branch, else_branch)
    else {
        panic!("expected subgraphs");
    };

    let mut then_scope = scope.fork_for_subgraph(then_branch.output_names());
    let mut else_scope = scope.fork_for_subgraph(else_branch.output_names());
    let then_result = rewrite_graph(then_branch, &mut then_scope).unwrap();
    let else_result = rewrite_graph(else_branch, &mut else_scope).unwrap();

    // Neither branch sees the other's values, so nothing is eliminated in either.
    assert_eq!(then_result, *then_branch);
    assert_eq!(else_result, *else_branch);
    assert_eq!(
        then_scope.lookup("then_out_0").unwrap(),
        else_scope.lookup("else_out_0").unwrap()
    );
    assert!(scope.lookup("then_out_0").is_err());
}

#[test]
fn identical_control_flow_nodes_are_merged() {
    let graph = Graph::new("main")
        .with_inputs(["c", "x"])
        .with_outputs(["y0", "y1"])
        .with_node(if_with_branches("c", "y0", "0"))
        .with_node(if_with_branches("c", "y1", "1"));
    let (result, stats) = eliminate_with_stats(&graph).unwrap();
    assert_eq!(stats.eliminated, 1);
    assert_eq!(result.nodes.len(), 2);
    assert_eq!(result.nodes[0], graph.nodes[0]);
    assert_eq!(result.nodes[1], Node::new("Identity").with_in("y0").with_out("y1"));
    assert_idempotent(&graph);
}

#[test]
fn branch_order_matters() {
    let branch = |op: &str, out: &str| {
        Graph::new("b")
            .with_outputs([out])
            .with_node(unary(op, "x", out))
    };
    let graph = Graph::new("main")
        .with_inputs(["c", "x"])
        .with_outputs(["y0", "y1"])
        .with_node(
            Node::new("If")
                .with_in("c")
                .with_out("y0")
                .with_attr("then_branch", branch("Neg", "n0"))
                .with_attr("else_branch", branch("Abs", "a0")),
        )
        .with_node(
            Node::new("If")
                .with_in("c")
                .with_out("y1")
                .with_attr("then_branch", branch("Abs", "a1"))
                .with_attr("else_branch", branch("Neg", "n1")),
        );
    assert_eq!(eliminate(&graph).unwrap(), graph);
}

#[test]
fn identical_loops_are_merged() {
    let body = |tag: &str| {
        Graph::new("body")
            .with_inputs(["i", "cond_in", "v_in"])
            .with_outputs([format!("cond_out_{tag}"), format!("v_out_{tag}")])
            .with_node(unary("Identity", "cond_in", &format!("cond_out_{tag}")))
            .with_node(binary("Add", "v_in", "step", &format!("v_out_{tag}")))
    };
    let graph = Graph::new("main")
        .with_inputs(["n", "v0", "step"])
        .with_outputs(["r0"])
        .with_node(
            Node::new("Loop")
                .with_ins(["n", "", "v0"])
                .with_out("r0")
                .with_attr("body", body("0")),
        )
        .with_node(
            Node::new("Loop")
                .with_ins(["n", "", "v0"])
                .with_out("r1")
                .with_attr("body", body("1")),
        )
        .with_node(binary("Mul", "r1", "r0", "p"));
    let result = eliminate(&graph).unwrap();
    assert_eq!(result.nodes.len(), 2);
    assert_eq!(result.nodes[0].inputs, ["n", "", "v0"]);
    assert_eq!(result.nodes[1], binary("Mul", "r0", "r0", "p"));
    assert_idempotent(&graph);
}

#[test]
fn output_slots_are_distinguished() {
    let split = |outs: [&str; 2]| Node::new("Split").with_in("x").with_outs(outs);
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["n0", "n1"])
        .with_node(split(["s0", "s1"]))
        .with_node(split(["t0", "t1"]))
        .with_node(unary("Neg", "s0", "n0"))
        .with_node(unary("Neg", "t1", "n1"));
    let result = eliminate(&graph).unwrap();
    insta::assert_snapshot!(result.to_string(), @r###"
    graph main(x) -> (n0, n1) {
      s0, s1 = Split(x)
      n0 = Neg(s0)
      n1 = Neg(s1)
    }
    "###);
    assert_idempotent(&graph);
}

#[test]
fn partially_new_node_is_kept() {
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["n0", "n1"])
        .with_node(Node::new("Split").with_in("x").with_outs(["s0", ""]))
        .with_node(Node::new("Split").with_in("x").with_outs(["t0", "t1"]))
        .with_node(unary("Neg", "t0", "n0"))
        .with_node(unary("Neg", "t1", "n1"));
    let result = eliminate(&graph).unwrap();
    assert_eq!(result.nodes.len(), 4);
    assert_eq!(result.nodes[2], unary("Neg", "s0", "n0"));
    assert_eq!(result.nodes[3], unary("Neg", "t1", "n1"));
}

#[test]
fn differing_nodes_are_kept() {
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["y0", "y1", "y2", "y3", "y4", "y5"])
        .with_node(unary("Transpose", "x", "y0").with_attr("perm", vec![1i64, 0]))
        .with_node(unary("Transpose", "x", "y1").with_attr("perm", vec![0i64, 1]))
        .with_node(unary("Relu", "x", "y2"))
        .with_node(unary("Relu", "x", "y3").with_domain("com.example"))
        .with_node(unary("Relu", "x", "y4").with_metadata("k", "v"))
        .with_node(unary("Relu", "x", "y5").with_metadata("k", "w"));
    assert_eq!(eliminate(&graph).unwrap(), graph);
}

#[test]
fn node_names_do_not_matter() {
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["y"])
        .with_node(unary("Relu", "x", "r0").with_name("relu_0"))
        .with_node(unary("Relu", "x", "r1").with_name("relu_1"))
        .with_node(binary("Sub", "r0", "r1", "y"));
    let result = eliminate(&graph).unwrap();
    assert_eq!(result.nodes.len(), 2);
    assert_eq!(result.nodes[1], binary("Sub", "r0", "r0", "y"));
}

#[test]
fn omitted_inputs_keep_their_position() {
    let graph = Graph::new("main")
        .with_inputs(["x", "bound"])
        .with_outputs(["lo", "hi"])
        .with_node(Node::new("Clip").with_ins(["x", "", "bound"]).with_out("lo"))
        .with_node(Node::new("Clip").with_ins(["x", "bound", ""]).with_out("hi"));
    assert_eq!(eliminate(&graph).unwrap(), graph);
}

#[test]
fn consumers_are_rewired_and_value_infos_pruned() {
    let mut graph = Graph::new("main")
        .with_inputs(["a", "b"])
        .with_outputs(["out1", "out2"])
        .with_node(binary("Add", "a", "b", "out1"))
        .with_node(binary("Add", "a", "b", "tmp"))
        .with_node(binary("Mul", "tmp", "a", "out2"));
    graph.value_infos = vec![ValueInfo::new("tmp"), ValueInfo::new("out2")];
    let result = eliminate(&graph).unwrap();
    insta::assert_snapshot!(result.to_string(), @r###"
    graph main(a, b) -> (out1, out2) {
      out1 = Add(a, b)
      out2 = Mul(out1, a)
    }
    "###);
    assert_eq!(result.value_infos, vec![ValueInfo::new("out2")]);
}

#[test]
fn initializers_are_bound() {
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["y1", "z"])
        .with_init(Tensor::new(vec![1], vec![2.0f32]).with_name("w"))
        .with_node(binary("Mul", "x", "w", "y1"))
        .with_node(binary("Mul", "x", "w", "y2"))
        .with_node(unary("Relu", "y2", "z"));
    let result = eliminate(&graph).unwrap();
    assert_eq!(result.inits, graph.inits);
    assert_eq!(result.nodes.len(), 2);
    assert_eq!(result.nodes[1], unary("Relu", "y1", "z"));
}

#[test]
fn initializers_listed_as_inputs_are_bound_once() {
    let graph = Graph::new("main")
        .with_inputs(["x", "w"])
        .with_outputs(["y"])
        .with_init(Tensor::new(vec![1], vec![2.0f32]).with_name("w"))
        .with_node(binary("Mul", "x", "w", "y"));
    assert_eq!(eliminate(&graph).unwrap(), graph);
}

#[test]
fn nodes_without_outputs_disappear() {
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["y"])
        .with_node(Node::new("Print").with_in("x"))
        .with_node(unary("Relu", "x", "y"));
    let (result, stats) = eliminate_with_stats(&graph).unwrap();
    assert_eq!(result.nodes, vec![unary("Relu", "x", "y")]);
    assert_eq!(stats.passthroughs, 0);
}

#[test]
fn declared_inputs_and_outputs_are_preserved() {
    for graph in [
        redundant_add(),
        redundant_add_in_subgraphs(),
        redundant_constants(),
    ] {
        let result = eliminate(&graph).unwrap();
        assert_eq!(result.inputs, graph.inputs);
        assert_eq!(result.outputs, graph.outputs);
    }
}

#[test]
fn undefined_input_is_rejected() {
    let graph = Graph::new("main")
        .with_inputs(["a"])
        .with_outputs(["y"])
        .with_node(binary("Add", "a", "ghost", "y"));
    assert_eq!(
        eliminate(&graph),
        Err(CseError::MalformedGraph(MalformedGraphError::UndefinedValue(
            "ghost".to_string()
        )))
    );
}

#[test]
fn undefined_input_in_subgraph_is_rejected() {
    let branch = Graph::new("b")
        .with_outputs(["t"])
        .with_node(unary("Neg", "ghost", "t"));
    let graph = Graph::new("main")
        .with_inputs(["c"])
        .with_outputs(["y"])
        .with_node(
            Node::new("If")
                .with_in("c")
                .with_out("y")
                .with_attr("then_branch", branch.clone())
                .with_attr("else_branch", branch),
        );
    assert!(matches!(
        eliminate(&graph),
        Err(CseError::MalformedGraph(MalformedGraphError::UndefinedValue(name))) if name == "ghost"
    ));
}

#[test]
fn redefinition_is_rejected() {
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["y"])
        .with_node(unary("Neg", "x", "y"))
        .with_node(unary("Abs", "x", "y"));
    assert!(matches!(
        eliminate(&graph),
        Err(CseError::MalformedGraph(MalformedGraphError::RedefinedValue(name))) if name == "y"
    ));
}

#[test]
fn shadowing_outer_value_is_rejected() {
    let body = Graph::new("body")
        .with_inputs(["x"])
        .with_outputs(["t"])
        .with_node(unary("Neg", "x", "t"));
    let graph = Graph::new("main")
        .with_inputs(["x", "n"])
        .with_outputs(["y"])
        .with_node(Node::new("Loop").with_in("n").with_out("y").with_attr("body", body));
    assert!(matches!(
        eliminate(&graph),
        Err(CseError::MalformedGraph(MalformedGraphError::RedefinedValue(name))) if name == "x"
    ));
}

#[test]
fn graph_lists_are_rejected() {
    let graph = Graph::new("main")
        .with_inputs(["x"])
        .with_outputs(["y"])
        .with_node(
            unary("Custom", "x", "y").with_attr("branches", AttributeValue::Graphs(vec![])),
        );
    assert_eq!(
        eliminate(&graph),
        Err(CseError::UnsupportedOutputCardinality("branches".to_string()))
    );
}

#[test]
fn failed_pass_leaves_model_untouched() {
    let mut model = Model::new(
        Graph::new("main")
            .with_inputs(["a", "b"])
            .with_outputs(["out1", "out2"])
            .with_node(binary("Add", "a", "b", "out1"))
            .with_node(binary("Add", "a", "b", "out2"))
            .with_node(binary("Add", "a", "ghost", "out3")),
    );
    let before = model.clone();
    assert!(eliminate_common_subexpressions(&mut model).is_err());
    assert_eq!(model, before);
}

#[test]
fn model_pass_reports_stats() {
    let mut model = Model::new(redundant_add_in_subgraphs());
    let stats = eliminate_common_subexpressions(&mut model).unwrap();
    assert_eq!(
        stats,
        CseStats {
            eliminated: 2,
            passthroughs: 2
        }
    );
    assert_eq!(model.graph.count_nodes(), 4);
}
