use chatdoc::Result;
use chatdoc::commands::{ask, ingest_file, resolve_base_dir, serve, show_status};
use chatdoc::config::{run_interactive_config, show_config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chatdoc")]
#[command(about = "Chat with your PDF documents through a retrieval-augmented LLM")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml, the vector index and uploads
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Address to bind, overrides the configured host
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Index a PDF file from disk
    Ingest {
        /// Path to the PDF
        path: PathBuf,
    },
    /// Ask a question about the indexed documents
    Ask {
        /// The question
        question: String,
    },
    /// Show connectivity and index statistics
    Status {
        /// Recreate the vector index if its integrity check fails
        #[arg(long)]
        repair: bool,
    },
    /// Configure Ollama and the completion API
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = resolve_base_dir(cli.base_dir)?;

    match cli.command {
        Commands::Serve { host, port } => {
            serve(&base_dir, host, port).await?;
        }
        Commands::Ingest { path } => {
            ingest_file(&base_dir, &path).await?;
        }
        Commands::Ask { question } => {
            ask(&base_dir, &question).await?;
        }
        Commands::Status { repair } => {
            show_status(&base_dir, repair).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
    }

    Ok(())
}
