use onnx_cse_core::{
    model::Model,
    onnx::{load_onnx, save_onnx, ModelLoadError, ModelSaveError},
    optimize::cse::{eliminate, eliminate_common_subexpressions, CseError},
};
use std::path::PathBuf;
use std::process::exit;
use std::time::Instant;
use structopt::StructOpt;
use thiserror::Error;

#[derive(Debug, StructOpt)]
#[structopt(name = "onnx-cse")]
pub struct Opt {
    #[structopt(parse(from_os_str))]
    pub onnx_path: PathBuf,

    #[structopt(
        short = "o",
        long = "output",
        parse(from_os_str),
        help = "Where to write the rewritten model"
    )]
    pub output: Option<PathBuf>,

    #[structopt(
        long = "check-idempotent",
        help = "Fail if a second pass would still change the model"
    )]
    pub check_idempotent: bool,
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load model: {0}")]
    Load(#[from] ModelLoadError),

    #[error("Failed to eliminate common subexpressions: {0}")]
    Cse(#[from] CseError),

    #[error("Failed to save model: {0}")]
    Save(#[from] ModelSaveError),

    #[error("A second pass changed the model")]
    NotIdempotent,
}

fn main() {
    env_logger::init();

    let opt = Opt::from_args();

    if let Err(e) = run(&opt) {
        log::error!("{e}");
        exit(1);
    }
}

fn run(opt: &Opt) -> Result<(), CliError> {
    log::info!("load onnx: start ({:?})", opt.onnx_path);
    let start = Instant::now();
    let mut model = load_onnx(&opt.onnx_path)?;
    log::info!("load onnx: finished in {:?}", start.elapsed());

    optimize(&mut model, opt.check_idempotent)?;

    if let Some(output) = &opt.output {
        log::info!("save onnx: start ({output:?})");
        let start = Instant::now();
        save_onnx(&model, output)?;
        log::info!("save onnx: finished in {:?}", start.elapsed());
    }

    Ok(())
}

fn optimize(model: &mut Model, check_idempotent: bool) -> Result<(), CliError> {
    let before = model.graph.count_nodes();
    let stats = eliminate_common_subexpressions(model)?;
    log::info!(
        "nodes: {before} -> {} (eliminated={}, passthroughs={})",
        model.graph.count_nodes(),
        stats.eliminated,
        stats.passthroughs
    );

    if check_idempotent && eliminate(&model.graph)? != model.graph {
        return Err(CliError::NotIdempotent);
    }

    Ok(())
}

#[test]
fn optimize_and_save() {
    use onnx_cse_core::{graph::Graph, node::Node};

    let graph = Graph::new("main")
        .with_inputs(["a", "b"])
        .with_outputs(["c"])
        .with_node(Node::new("Add").with_ins(["a", "b"]).with_out("x"))
        .with_node(Node::new("Add").with_ins(["a", "b"]).with_out("y"))
        .with_node(Node::new("Mul").with_ins(["x", "y"]).with_out("c"));
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.onnx");
    let output = dir.path().join("out.onnx");
    save_onnx(&Model::new(graph), &input).unwrap();

    let opt = Opt {
        onnx_path: input,
        output: Some(output.clone()),
        check_idempotent: true,
    };
    run(&opt).unwrap();

    let model = load_onnx(&output).unwrap();
    assert_eq!(model.graph.count_nodes(), 2);
    assert_eq!(model.graph.nodes[1].inputs, ["x", "x"]);
}
