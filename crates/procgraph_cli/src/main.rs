// SPDX-License-Identifier: MIT OR Apache-2.0
//! `procgraph` - command line host for procedural node graphs.
//!
//! Loads graphs saved as RON and drives them the way an interactive host
//! would: a schedule pass drained over budgeted ticks, shader emission for
//! one output, or the evaluation order a pass would use.

use clap::{Parser, Subcommand};
use procgraph_engine::config::CONFIG_FILE_NAME;
use procgraph_engine::{
    ConfigError, EmitError, EngineConfig, Graph, GraphDescriptor, NodeId, PersistError,
    PortType, Value,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "procgraph", version, about = "Evaluate and compile procedural node graphs")]
struct Cli {
    /// Engine configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule a full pass, drain it and print each end node's result
    Run {
        /// Graph file (RON)
        graph: PathBuf,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the fragment shader for an output node
    Emit {
        /// Graph file (RON)
        graph: PathBuf,
        /// Output node name; defaults to the graph's designated output
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Print the order a schedule pass would evaluate nodes in
    Order {
        /// Graph file (RON)
        graph: PathBuf,
        /// Order a targeted pass for this node instead of a full one
        #[arg(short, long)]
        target: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("shader emission failed: {0}")]
    Emit(#[from] EmitError),

    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no node named '{0}'")]
    NodeNotFound(String),

    #[error("graph has no output node")]
    NoOutput,
}

#[derive(Debug, Serialize)]
struct NodeResult {
    node: String,
    ty: Option<PortType>,
    value: Option<Value>,
}

fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let config = match EngineConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("procgraph v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = execute(cli.command, &config) {
        tracing::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn execute(command: Command, config: &EngineConfig) -> Result<(), CliError> {
    match command {
        Command::Run { graph, json } => run(&graph, json, config),
        Command::Emit { graph, output } => emit(&graph, output.as_deref(), config),
        Command::Order { graph, target } => order(&graph, target.as_deref(), config),
    }
}

fn load(path: &Path, config: &EngineConfig) -> Result<Graph, CliError> {
    let descriptor = GraphDescriptor::load(path)?;
    let mut graph = Graph::from_descriptor(&descriptor)?;
    graph.apply_config(config);
    tracing::info!(
        graph = %descriptor.name,
        nodes = graph.node_count(),
        connections = graph.connection_count(),
        "loaded {}",
        path.display()
    );
    Ok(graph)
}

fn find(graph: &Graph, name: &str) -> Result<NodeId, CliError> {
    graph
        .find_by_name(name)
        .ok_or_else(|| CliError::NodeNotFound(name.to_string()))
}

fn node_name(graph: &Graph, id: NodeId) -> String {
    graph
        .node(id)
        .map_or_else(|| id.to_string(), |n| n.name.clone())
}

fn run(path: &Path, json: bool, config: &EngineConfig) -> Result<(), CliError> {
    let mut graph = load(path, config)?;
    let queued = graph.schedule();

    let mut ticks = 0;
    while graph.tick(config.polls_per_tick) > 0 {
        ticks += 1;
    }
    tracing::info!(queued, ticks, "pass drained");

    let results: Vec<NodeResult> = graph
        .end_nodes()
        .into_iter()
        .filter_map(|id| graph.node(id))
        .map(|node| NodeResult {
            node: node.name.clone(),
            ty: node
                .primary_output()
                .and_then(|i| node.output(i))
                .and_then(|o| o.concrete()),
            value: node.result(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            match result.value {
                Some(value) => println!("{}: {value}", result.node),
                None => println!("{}: <none>", result.node),
            }
        }
    }
    Ok(())
}

fn emit(path: &Path, output: Option<&str>, config: &EngineConfig) -> Result<(), CliError> {
    let graph = load(path, config)?;
    let id = match output {
        Some(name) => find(&graph, name)?,
        None => graph.output_node().ok_or(CliError::NoOutput)?,
    };
    let code = graph.emit_shader(id, &config.target)?;
    print!("{code}");
    Ok(())
}

fn order(path: &Path, target: Option<&str>, config: &EngineConfig) -> Result<(), CliError> {
    let graph = load(path, config)?;
    let order = match target {
        Some(name) => graph.evaluation_order_for(find(&graph, name)?),
        None => graph.evaluation_order(),
    };
    for (position, id) in order.into_iter().enumerate() {
        println!("{position:>3}  {}", node_name(&graph, id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_emit_with_output() {
        let cli = Cli::parse_from(["procgraph", "emit", "scene.ron", "--output", "Color"]);
        match cli.command {
            Command::Emit { graph, output } => {
                assert_eq!(graph, PathBuf::from("scene.ron"));
                assert_eq!(output.as_deref(), Some("Color"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_run_json_with_config() {
        let cli = Cli::parse_from(["procgraph", "run", "g.ron", "--json", "-c", "engine.ron"]);
        assert_eq!(cli.config, Some(PathBuf::from("engine.ron")));
        assert!(matches!(cli.command, Command::Run { json: true, .. }));
    }
}
