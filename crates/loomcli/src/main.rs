use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loomruntime::Flow;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Run and inspect loom flow files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to the flow YAML file
        file: PathBuf,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Load a flow file and report problems without running it
    Validate {
        /// Path to the flow YAML file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a starter flow file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, verbose } => {
            let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
            tracing_subscriber::fmt().with_max_level(level).init();
            run_flow(file).await?;
        }

        Commands::Validate { file } => {
            validate_flow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_starter_flow(output)?;
        }
    }

    Ok(())
}

async fn run_flow(file: PathBuf) -> Result<()> {
    let registry = Arc::new(loomnodes::builtin_registry());
    let mut flow = Flow::from_file(&file, registry)
        .with_context(|| format!("failed to load flow {}", file.display()))?;

    tracing::info!(
        flow = %file.display(),
        instances = flow.node().instance_ids().len(),
        connections = flow.node().connections().len(),
        "starting flow"
    );

    flow.run_sync().await.context("flow execution failed")?;

    tracing::info!("flow finished");
    Ok(())
}

fn validate_flow(file: PathBuf) -> Result<()> {
    let registry = Arc::new(loomnodes::builtin_registry());
    let flow = Flow::from_file(&file, registry)
        .with_context(|| format!("invalid flow {}", file.display()))?;

    println!("Flow is valid:");
    println!("  instances:   {}", flow.node().instance_ids().len());
    println!("  connections: {}", flow.node().connections().len());
    Ok(())
}

fn list_nodes() {
    let registry = loomnodes::builtin_registry();

    println!("Available node types:");
    for node_type in registry.list_node_types() {
        match registry.get_metadata(&node_type) {
            Some(metadata) => {
                println!("  {} ({})", node_type, metadata.category);
                if !metadata.description.is_empty() {
                    println!("      {}", metadata.description);
                }
            }
            None => println!("  {}", node_type),
        }
    }
}

fn create_starter_flow(output: PathBuf) -> Result<()> {
    let starter = r#"imports:
  "@loom/nodes":
    - Print
node:
  id: Starter
  instances:
    - id: greeting
      nodeId: InlineValue__greeting
      macroData:
        value:
          type: string
          value: Hello from loom!
    - id: printer
      nodeId: Print
  connections:
    - from: {insId: greeting, pinId: value}
      to: {insId: printer, pinId: msg}
"#;
    std::fs::write(&output, starter)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("Created starter flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  loom run {}", output.display());
    Ok(())
}
