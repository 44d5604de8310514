use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;

use taskgraph_rs::runtime::StateData;
use taskgraph_rs::taskgraph::config::Settings;
use taskgraph_rs::taskgraph::server;
use taskgraph_rs::taskgraph::tools::code_review;
use taskgraph_rs::taskgraph::workflow::graph::WorkflowEngine;
use taskgraph_rs::taskgraph::workflow::loader::GraphLoader;
use taskgraph_rs::taskgraph::workflow::registry::ToolRegistry;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind (overrides TASKGRAPH_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides TASKGRAPH_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a graph from a YAML or JSON file and print the outcome
    Run {
        /// Path to the graph file
        #[arg(short, long)]
        file: String,

        /// Initial state as a JSON object
        #[arg(short, long, default_value = "{}")]
        input: String,
    },
    /// List the built-in tools
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut settings = Settings::from_env()?;

    let registry = ToolRegistry::new();
    code_review::register_code_review_tools(&registry).await;

    match args.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            server::serve(settings, registry).await?;
        }
        Commands::Run { file, input } => {
            let definition = GraphLoader::new()
                .load_graph(&file)
                .with_context(|| format!("failed to load graph from {}", file))?;
            let initial_state: StateData =
                serde_json::from_str(&input).context("--input must be a JSON object")?;

            let engine =
                WorkflowEngine::new(&definition, registry)?.with_max_steps(settings.max_steps);
            log::info!("Running workflow: {}", engine.name());
            let outcome = engine.execute(initial_state).await;

            let report = json!({
                "termination": outcome.termination,
                "state": outcome.state.data(),
                "log": outcome.log,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Tools => {
            for name in registry.list().await {
                let tool = registry.get(&name).await?;
                println!("{:<24} {}", name, tool.description());
            }
        }
    }

    Ok(())
}
