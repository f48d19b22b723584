//! Cogmap CLI: collaborative concept maps over a local SQLite file.
//!
//! Usage:
//!   cogmap graph <subcommand> [--db path] [--config path]
//!   cogmap generate <instruction> [--graph id] [--title t]
//!   cogmap history <subcommand> <graph>

use clap::{Parser, Subcommand};
use cogmap::{
    Actor, ActorId, CommandGenerator, EngineConfig, EngineError, GenerateRequest, GraphEngine,
    GraphId, MergeResult, NodeId, OpenStore, ProposedDelta, SqliteStore, VersionId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "cogmap",
    version,
    about = "Collaborative knowledge-graph engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML engine config
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Acting user id
    #[arg(long, global = true, default_value = "local")]
    actor: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage graphs
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },
    /// Ask the generator for content and merge it
    Generate {
        /// What to map
        instruction: String,
        /// Existing graph to extend
        #[arg(long)]
        graph: Option<String>,
        /// Title for a new graph
        #[arg(long)]
        title: Option<String>,
    },
    /// Expand the map around a concept
    Expand {
        graph: String,
        /// Concept to expand
        focus: String,
        /// Document whose text grounds the expansion
        #[arg(long)]
        context_file: Option<PathBuf>,
    },
    /// Rework a graph according to feedback
    Refine { graph: String, feedback: String },
    /// Merge a delta read from a JSON file
    Merge {
        graph: String,
        /// File holding {"nodes": [...], "edges": [...]}
        file: PathBuf,
    },
    /// Node operations
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Version history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Print a graph as JSON
    Export {
        graph: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Extract plain text from a document
    Extract {
        file: PathBuf,
        /// Content type hint (defaults to the file name)
        #[arg(long)]
        mime: Option<String>,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Create a new empty graph
    Create {
        #[arg(long)]
        title: Option<String>,
    },
    /// List all graphs
    List,
    /// Print a graph's current state
    Show { graph: String },
    /// Rename a graph
    Rename { graph: String, title: String },
    /// Delete a graph and its history
    Delete { graph: String },
}

#[derive(Subcommand)]
enum NodeAction {
    /// Delete a node you own
    Delete { graph: String, node: String },
    /// Comment on a node
    Comment {
        graph: String,
        node: String,
        text: String,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List versions
    List { graph: String },
    /// Step back one version
    Undo { graph: String },
    /// Step forward one version
    Redo { graph: String },
    /// Jump to a version
    Restore { graph: String, version: String },
}

/// Get the default database path (~/.local/share/cogmap/cogmap.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let cogmap_dir = data_dir.join("cogmap");
    std::fs::create_dir_all(&cogmap_dir).ok();
    cogmap_dir.join("cogmap.db")
}

fn open_engine(db: Option<PathBuf>, config: Option<PathBuf>) -> Result<GraphEngine, String> {
    let config = match config {
        Some(path) => EngineConfig::load(&path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    let db_path = db.unwrap_or_else(default_db_path);
    let store =
        SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;

    let mut engine = GraphEngine::new(Arc::new(store));
    if let Some(spec) = &config.generator {
        engine = engine.with_generator(Arc::new(
            CommandGenerator::new(spec.program.clone()).with_args(spec.args.clone()),
        ));
    }
    Ok(engine.with_config(config))
}

fn report(result: CliResult) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_merge(result: &MergeResult) {
    println!(
        "Graph {} at version {}: {} nodes, {} edges",
        result.graph_id,
        result.sequence,
        result.graph.nodes.len(),
        result.graph.edges.len()
    );
    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }
}

fn cmd_graph_list(engine: &GraphEngine) -> Result<(), EngineError> {
    let graphs = engine.list_graphs()?;
    if graphs.is_empty() {
        println!("No graphs.");
        return Ok(());
    }
    println!("{:<36}  {:<32}  {:<16}", "ID", "TITLE", "OWNER");
    println!("{}", "-".repeat(88));
    for g in graphs {
        println!(
            "{:<36}  {:<32}  {:<16}",
            g.id,
            g.title.unwrap_or_default(),
            g.owner_id
        );
    }
    Ok(())
}

fn cmd_history_list(engine: &GraphEngine, graph: &GraphId) -> Result<(), EngineError> {
    println!("{:>4}  {:<36}  {:<20}  {:>5}  {:>5}", "SEQ", "ID", "CREATED", "NODES", "EDGES");
    println!("{}", "-".repeat(80));
    for v in engine.list_versions(graph)? {
        println!(
            "{:>4}  {:<36}  {:<20}  {:>5}  {:>5}{}",
            v.sequence,
            v.id,
            v.created_at.format("%Y-%m-%d %H:%M:%S"),
            v.node_count,
            v.edge_count,
            if v.is_current { "  *" } else { "" }
        );
    }
    Ok(())
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

async fn run(engine: &GraphEngine, command: Commands, actor: &Actor) -> CliResult {
    match command {
        Commands::Graph { action } => match action {
            GraphAction::Create { title } => {
                let id = engine.create_or_load_graph(None, title, &actor.id).await?;
                println!("Created graph {}", id);
            }
            GraphAction::List => cmd_graph_list(engine)?,
            GraphAction::Show { graph } => {
                println!("{}", engine.export(&GraphId::from(graph))?);
            }
            GraphAction::Rename { graph, title } => {
                let summary = engine.rename_graph(&GraphId::from(graph), &title, actor).await?;
                println!("Renamed graph {} to '{}'", summary.id, title);
            }
            GraphAction::Delete { graph } => {
                let id = GraphId::from(graph);
                engine.delete_graph(&id).await?;
                println!("Deleted graph {}", id);
            }
        },
        Commands::Generate {
            instruction,
            graph,
            title,
        } => {
            let mut request = GenerateRequest::new(instruction);
            request.graph_id = graph.map(GraphId::from);
            request.title = title;
            print_merge(&engine.generate(request, actor).await?);
        }
        Commands::Expand {
            graph,
            focus,
            context_file,
        } => {
            let context = match context_file {
                Some(path) => {
                    let bytes = read_file(&path)?;
                    let hint = path.to_string_lossy().to_string();
                    Some(engine.extract_text(&bytes, &hint).await?)
                }
                None => None,
            };
            let result = engine
                .expand_node(&GraphId::from(graph), &focus, context.as_deref(), actor)
                .await?;
            print_merge(&result);
        }
        Commands::Refine { graph, feedback } => {
            print_merge(&engine.refine(&GraphId::from(graph), &feedback, actor).await?);
        }
        Commands::Merge { graph, file } => {
            let text = String::from_utf8(read_file(&file)?)
                .map_err(|e| format!("{} is not UTF-8: {}", file.display(), e))?;
            let delta = ProposedDelta::from_text(&text)?;
            let result = engine
                .merge_generated_content(&GraphId::from(graph), &delta, actor)
                .await?;
            print_merge(&result);
        }
        Commands::Node { action } => match action {
            NodeAction::Delete { graph, node } => {
                let state = engine
                    .delete_node(&GraphId::from(graph), &NodeId::from(node.as_str()), actor)
                    .await?;
                println!("Deleted node {} ({} nodes left)", node, state.nodes.len());
            }
            NodeAction::Comment { graph, node, text } => {
                engine
                    .add_comment(&GraphId::from(graph), &NodeId::from(node.as_str()), actor, &text)
                    .await?;
                println!("Commented on node {}", node);
            }
        },
        Commands::History { action } => match action {
            HistoryAction::List { graph } => cmd_history_list(engine, &GraphId::from(graph))?,
            HistoryAction::Undo { graph } => {
                let state = engine.undo(&GraphId::from(graph), actor).await?;
                println!("Undone ({} nodes, {} edges)", state.nodes.len(), state.edges.len());
            }
            HistoryAction::Redo { graph } => {
                let state = engine.redo(&GraphId::from(graph), actor).await?;
                println!("Redone ({} nodes, {} edges)", state.nodes.len(), state.edges.len());
            }
            HistoryAction::Restore { graph, version } => {
                let state = engine
                    .restore_version(
                        &GraphId::from(graph),
                        &VersionId::from_string(version),
                        actor,
                    )
                    .await?;
                println!("Restored ({} nodes, {} edges)", state.nodes.len(), state.edges.len());
            }
        },
        Commands::Export { graph, out } => {
            let json = engine.export(&GraphId::from(graph))?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
                    println!("Exported to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Extract { file, mime } => {
            let bytes = read_file(&file)?;
            let hint = mime.unwrap_or_else(|| file.to_string_lossy().to_string());
            println!("{}", engine.extract_text(&bytes, &hint).await?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "cogmap=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let engine = match open_engine(cli.db, cli.config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let actor = Actor {
        id: ActorId::new(cli.actor),
        listener: None,
    };
    let code = report(run(&engine, cli.command, &actor).await);
    std::process::exit(code);
}
