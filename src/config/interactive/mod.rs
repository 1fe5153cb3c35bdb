
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::{Path, PathBuf};

use super::{Config, ConfigError, ModelsConfig, StorageConfig};
use crate::models::ollama::OllamaClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Docs RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Model Service").bold().yellow());
    eprintln!("Configure the Ollama-compatible service used for embeddings and answers.");
    eprintln!();

    configure_models(&mut config.models)?;

    eprintln!();
    eprintln!("{}", style("Document Storage").bold().yellow());
    eprintln!("Raw archives are read from, and the index is written to, this bucket.");
    eprintln!();

    configure_storage(&mut config.storage)?;

    eprintln!();
    config.ui.mock = Confirm::new()
        .with_prompt("Use mocked responses in the question form?")
        .default(config.ui.mock)
        .interact()?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_model_connection(&config) {
        eprintln!("{}", style("✓ Model service connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to the model service").yellow()
        );
        eprintln!("You can continue, but make sure it is running before ingesting documents.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Storage:").bold().yellow());
    eprintln!(
        "  Root: {}",
        style(config.storage.root.display()).cyan()
    );
    eprintln!("  Bucket: {}", style(&config.storage.bucket).cyan());
    eprintln!(
        "  Raw documents prefix: {}",
        style(&config.storage.raw_docs_prefix).cyan()
    );
    eprintln!(
        "  Index prefix: {}",
        style(&config.storage.index_prefix).cyan()
    );
    eprintln!(
        "  Scratch directory: {}",
        style(config.storage.scratch_dir.display()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Models:").bold().yellow());
    match config.model_url() {
        Ok(url) => eprintln!("  Service URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Service URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!(
        "  Embedding model: {}",
        style(&config.models.embedding_model).cyan()
    );
    eprintln!("  Chat model: {}", style(&config.models.chat_model).cyan());
    eprintln!(
        "  API key: {}",
        style(if config.models.api_key.is_some() {
            "set"
        } else {
            "not set"
        })
        .cyan()
    );

    eprintln!();
    eprintln!("{}", style("Pipeline:").bold().yellow());
    eprintln!(
        "  Chunk size / overlap: {} / {}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );
    eprintln!(
        "  Retrieval: k={} fetch_k={} lambda={}",
        style(config.retrieval.k).cyan(),
        style(config.retrieval.fetch_k).cyan(),
        style(config.retrieval.lambda).cyan()
    );
    eprintln!(
        "  Generation: temperature={} max_tokens={}",
        style(config.generation.temperature).cyan(),
        style(config.generation.max_tokens).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Question form:").bold().yellow());
    eprintln!("  Mocked: {}", style(config.ui.mock).cyan());
    eprintln!("  Function: {}", style(&config.ui.function_name).cyan());
    match &config.ui.endpoint {
        Some(endpoint) => eprintln!("  Endpoint: {}", style(endpoint).cyan()),
        None => eprintln!("  Endpoint: {}", style("in-process").cyan()),
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_models(models: &mut ModelsConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == models.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Model service protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Model service host")
        .default(models.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ModelsConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..ModelsConfig::default()
            };
            temp_config.base_url()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Model service port")
        .default(models.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(models.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(models.chat_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    models.set_protocol(protocol)?;
    models.set_host(host)?;
    models.set_port(port)?;
    models.set_embedding_model(embedding_model)?;
    models.set_chat_model(chat_model)?;

    Ok(())
}

fn configure_storage(storage: &mut StorageConfig) -> Result<()> {
    let root: String = Input::new()
        .with_prompt("Storage root directory")
        .default(storage.root.display().to_string())
        .validate_with(non_empty)
        .interact_text()?;

    let bucket: String = Input::new()
        .with_prompt("Bucket")
        .default(storage.bucket.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() || input.contains('/') {
                Err("Bucket must be non-empty and cannot contain '/'")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let raw_docs_prefix: String = Input::new()
        .with_prompt("Raw documents prefix")
        .default(storage.raw_docs_prefix.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let index_prefix: String = Input::new()
        .with_prompt("Index prefix")
        .default(storage.index_prefix.clone())
        .validate_with(non_empty)
        .interact_text()?;

    storage.root = PathBuf::from(root);
    storage.bucket = bucket;
    storage.raw_docs_prefix = raw_docs_prefix;
    storage.index_prefix = index_prefix;

    Ok(())
}

#[allow(clippy::ptr_arg, reason = "dialoguer validators receive &String")]
fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Value cannot be empty")
    } else {
        Ok(())
    }
}

fn test_model_connection(config: &Config) -> bool {
    OllamaClient::new(&config.models, config.models.embedding_model.clone())
        .map(|client| client.with_timeout(std::time::Duration::from_secs(5)))
        .and_then(|client| client.ping())
        .is_ok()
}
