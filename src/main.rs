use clap::{Parser, Subcommand};
use tracing::Level;

use rag_engine::naming::collection_name;
use rag_engine::{build_store, AppConfig, VectorStore};

#[derive(Parser)]
#[command(name = "rag-engine", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List collections in the configured store
    Collections,
    /// Show a project's collection info
    Info {
        #[arg(long)]
        project: String,
    },
    /// Delete a project's collection
    Reset {
        #[arg(long)]
        project: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::from_env();
    let store = build_store(&config)?;
    store.connect().await?;

    match Cli::parse().cmd {
        Cmd::Collections => {
            for name in store.list_collections().await? {
                println!("{name}");
            }
        }
        Cmd::Info { project } => {
            let info = store.collection_info(&collection_name(&project)).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Cmd::Reset { project } => {
            store.delete_collection(&collection_name(&project)).await?;
        }
    }

    store.disconnect().await?;
    Ok(())
}
