use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::VectorStore;
use crate::documents::Source;
use crate::namespace::{PartitionKey, namespace_for};
use crate::rag::{IndexHandle, RagManager};

/// Print the effective configuration with secrets masked
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    println!("{}", style("📋 Current Configuration").bold().cyan());
    println!();

    println!("{}", style("OpenAI Settings:").bold().yellow());
    println!("  Base URL: {}", style(&config.openai.base_url).cyan());
    println!("  API Key: {}", masked(config.openai.api_key.as_deref()));
    println!("  Chat Model: {}", style(&config.openai.chat_model).cyan());
    println!(
        "  Embedding Model: {} ({} dimensions)",
        style(&config.openai.embedding_model).cyan(),
        style(config.openai.embedding_dimension).cyan()
    );
    println!("  Batch Size: {}", style(config.openai.batch_size).cyan());

    println!();
    println!("{}", style("Retrieval Settings:").bold().yellow());
    println!(
        "  Chunking: {} units, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    println!("  Top K: {}", style(config.rag.top_k).cyan());
    match config.rag.similarity_cutoff {
        Some(cutoff) => println!("  Similarity Cutoff: {}", style(cutoff).cyan()),
        None => println!("  Similarity Cutoff: {}", style("none").dim()),
    }
    println!(
        "  Minimum Ingest Duration: {:?}",
        style(config.rag.min_ingest_duration()).cyan()
    );

    println!();
    println!("{}", style("Notion Settings:").bold().yellow());
    println!("  Base URL: {}", style(&config.notion.base_url).cyan());
    println!("  API Key: {}", masked(config.notion.api_key.as_deref()));
    match &config.notion.database_id {
        Some(id) => println!("  Database: {}", style(id).cyan()),
        None => println!("  Database: {}", style("not set").dim()),
    }

    println!();
    println!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    println!(
        "Vector store: {}",
        style(config.vector_database_path().display()).dim()
    );

    Ok(())
}

/// Write the current settings (defaults when no file exists yet) to `config.toml`
#[inline]
pub fn write_default_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let path = config.config_file_path();

    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        println!("Use 'rag-chat config --show' to view it.");
        return Ok(());
    }

    config.save()?;
    println!(
        "{} {}",
        style("✓ Wrote configuration to").green(),
        path.display()
    );
    println!("API keys are read from OPENAI_API_KEY and NOTION_API_KEY.");

    Ok(())
}

/// Ingest a local file into a chat's namespace
#[inline]
pub async fn ingest_file(path: &Path, chat_id: i64) -> Result<()> {
    let config = Config::load_default()?;
    let manager = RagManager::from_config(&config).await?;
    let partition_key = PartitionKey::Chat(chat_id);

    let bar = spinner(format!("Ingesting {}", path.display()));
    let outcome = manager
        .ingest(&Source::file(path), &partition_key)
        .await;
    bar.finish_and_clear();

    let handle = outcome?;
    print_handle("Ingested", &handle);

    Ok(())
}

/// Answer a question from a chat's documents
#[inline]
pub async fn ask(question: &str, chat_id: i64) -> Result<()> {
    let config = Config::load_default()?;
    let manager = RagManager::from_config(&config).await?;

    let bar = spinner("Thinking".to_string());
    let answer = manager.answer(question, &PartitionKey::Chat(chat_id)).await;
    bar.finish_and_clear();

    println!("{}", answer);

    Ok(())
}

/// Re-sync one Notion page into its own namespace
#[inline]
pub async fn sync_page(page_id: &str) -> Result<()> {
    let config = Config::load_default()?;
    let manager = RagManager::from_config(&config).await?;

    let bar = spinner(format!("Syncing Notion page {}", page_id));
    let outcome = manager.sync_page(page_id).await;
    bar.finish_and_clear();

    print_handle("Synced", &outcome?);

    Ok(())
}

/// Re-sync every page of the configured Notion database
#[inline]
pub async fn sync_all() -> Result<()> {
    let config = Config::load_default()?;
    let manager = RagManager::from_config(&config).await?;

    let bar = spinner("Syncing Notion database".to_string());
    let outcome = manager.sync_all().await;
    bar.finish_and_clear();

    print_handle("Synced", &outcome?);

    Ok(())
}

/// List namespaces and how many chunks each holds
#[inline]
pub async fn list_namespaces() -> Result<()> {
    let config = Config::load_default()?;
    let store = VectorStore::new(&config).await?;
    let namespaces = store.list_namespaces().await?;

    if namespaces.is_empty() {
        println!("No namespaces have been created yet.");
        println!("Use 'rag-chat ingest <path> --chat <id>' to add a document.");
        return Ok(());
    }

    println!("Namespaces ({} total):", namespaces.len());
    println!();

    for namespace in &namespaces {
        let count = match store.count_records(namespace).await {
            Ok(count) => style(count.to_string()).cyan(),
            Err(e) => {
                warn!("Failed to count records in {}: {}", namespace, e);
                style("?".to_string()).red()
            }
        };
        match namespace.partition_key() {
            Some(key) => println!("  {} ({}): {} chunks", namespace, key, count),
            None => println!("  {}: {} chunks", namespace, count),
        }
    }

    Ok(())
}

/// Drop everything stored for a chat
#[inline]
pub async fn forget_chat(chat_id: i64) -> Result<()> {
    let config = Config::load_default()?;
    let store = VectorStore::new(&config).await?;
    let namespace = namespace_for(&PartitionKey::Chat(chat_id));

    if store.drop_namespace(&namespace).await? {
        info!("Dropped namespace {}", namespace);
        println!("{} {}", style("✓ Removed").green(), namespace);
    } else {
        println!("Nothing stored for chat {}", chat_id);
    }

    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_handle(verb: &str, handle: &IndexHandle) {
    println!(
        "{} {} chunks into {} ({})",
        style(format!("✓ {}", verb)).green(),
        handle.records(),
        style(handle.namespace()).cyan(),
        handle.partition_key()
    );
}

fn masked(secret: Option<&str>) -> String {
    match secret {
        Some(value) if value.len() > 8 => {
            let tail: String = value
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            style(format!("****{}", tail)).cyan().to_string()
        }
        Some(_) => style("****").cyan().to_string(),
        None => style("not set").dim().to_string(),
    }
}
