use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::settings::API_KEY_ENV_VARS;
use crate::config::{Config, OllamaConfig, get_config_dir};
use crate::database::VectorStore;
use crate::embeddings::OllamaClient;
use crate::pipeline::RagService;
use crate::server;

/// `--base-dir` if given, else `$CHATDOC_HOME` or `~/.chatdoc`
#[inline]
pub fn resolve_base_dir(base_dir: Option<PathBuf>) -> Result<PathBuf> {
    match base_dir {
        Some(dir) => Ok(dir),
        None => get_config_dir().context("Failed to determine base directory"),
    }
}

/// Start the HTTP service
#[inline]
pub async fn serve(base_dir: &Path, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load(base_dir).context("Failed to load configuration")?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config
        .server
        .validate()
        .context("Invalid server settings")?;

    // An unreachable Ollama only fails uploads and queries, not startup
    match check_ollama(config.ollama.clone()).await {
        Ok(()) => info!(
            "Ollama connected at {}:{} with model {}",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Err(e) => {
            warn!("Ollama is not ready: {:#}", e);
            println!(
                "Warning: Ollama at {}:{} is not ready. Uploads and queries will fail until it is.",
                config.ollama.host, config.ollama.port
            );
        }
    }

    if config.llm.api_key.is_none() {
        println!(
            "Warning: no completion API key found in {}.",
            API_KEY_ENV_VARS.join(" or ")
        );
    }

    let address = config.server.bind_address();
    let service = RagService::open(config)
        .await
        .context("Failed to initialize service")?;

    println!("🚀 Serving on http://{}", address);
    server::serve(Arc::new(service), &address).await?;
    Ok(())
}

/// Index a PDF from the local filesystem
#[inline]
pub async fn ingest_file(base_dir: &Path, path: &Path) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?
        .to_string();

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = Config::load(base_dir).context("Failed to load configuration")?;
    let service = RagService::open(config)
        .await
        .context("Failed to initialize service")?;

    let report = service.ingest(&filename, bytes).await?;

    println!("✅ {}", report.message);
    println!("   File: {}", report.filename);
    println!("   Chunks indexed: {}", report.chunks);
    Ok(())
}

/// Answer a single question against the local index
#[inline]
pub async fn ask(base_dir: &Path, question: &str) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;
    let service = RagService::open(config)
        .await
        .context("Failed to initialize service")?;

    let answer = service.query(question).await?;

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources: {}", answer.sources.join(", "));
    }
    Ok(())
}

/// Print connectivity and index statistics, recreating a failing index when `repair` is set
#[inline]
pub async fn show_status(base_dir: &Path, repair: bool) -> Result<()> {
    let config = Config::load(base_dir).unwrap_or_else(|e| {
        warn!("Falling back to default configuration: {:#}", e);
        Config::with_base_dir(base_dir)
    });

    println!("📊 ChatDoc Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match check_ollama(config.ollama.clone()).await {
        Ok(()) => {
            println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
            println!("   📋 Model: {}", config.ollama.model);
        }
        Err(e) => println!("   ❌ Ollama: {:#}", e),
    }

    println!();
    println!("💬 Completion API:");
    println!("   Endpoint: {}", config.llm.base_url);
    println!("   Model: {}", config.llm.model);
    println!(
        "   API key: {}",
        if config.llm.api_key.is_some() {
            "set"
        } else {
            "missing"
        }
    );

    println!();
    println!("🔍 Vector Index:");
    match VectorStore::open(&config).await {
        Ok(mut store) => {
            let mut healthy = store.validate_integrity().await.unwrap_or(false);
            if !healthy && repair {
                println!("   🔧 Integrity check failed, recreating the index");
                store
                    .repair_database()
                    .await
                    .context("Failed to repair vector index")?;
                healthy = store.validate_integrity().await.unwrap_or(false);
            }
            println!(
                "   {} LanceDB: {}",
                if healthy { "✅" } else { "⚠️ " },
                store.path().display()
            );
            println!("   🔢 Dimension: {}", store.dimension());
            match store.count_embeddings().await {
                Ok(0) => println!("   📭 Empty. Upload a document to get started."),
                Ok(count) => println!("   📦 Entries: {}", count),
                Err(e) => println!("   ❌ Failed to count entries: {}", e),
            }
            match store.list_sources().await {
                Ok(sources) if !sources.is_empty() => {
                    println!("   📚 Documents:");
                    for source in sources {
                        println!("      - {}", source);
                    }
                }
                Ok(_) => {}
                Err(e) => println!("   ❌ Failed to list documents: {}", e),
            }
        }
        Err(e) => println!("   ❌ LanceDB: Failed to open - {}", e),
    }

    Ok(())
}

async fn check_ollama(ollama: OllamaConfig) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        OllamaClient::new(&ollama)?
            .with_retry_attempts(1)
            .health_check()
    })
    .await
    .context("Health check task failed")?
}
