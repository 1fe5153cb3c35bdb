use clap::{Parser, Subcommand};
use docs_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use docs_rag::context::Context;
use docs_rag::ingest::Ingestor;
use docs_rag::query::QueryHandler;
use docs_rag::ui::{UiClient, run_form};
use docs_rag::{RagError, Result};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Question answering over zipped markdown documentation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to ~/.docs-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model service, storage and question form
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build the vector index from the archives under the raw documents prefix
    Ingest,
    /// Run the chat handler on one event and print the response envelope
    Handle {
        /// Event JSON, e.g. '{"input": "How do I install it?"}'; read from stdin when omitted
        #[arg(long)]
        event: Option<String>,
    },
    /// Ask a single question through the question form client
    Ask {
        question: String,
    },
    /// Open the interactive question form
    Ui,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest => {
            let context = Context::from_config(Config::load(&config_dir)?);
            let envelope = Ingestor::new()
                .with_progress(true)
                .run(&context)?
                .into_envelope();
            println!("{}", envelope.to_json()?);
        }
        Commands::Handle { event } => {
            let event = match event {
                Some(event) => event,
                None => {
                    let mut input = String::new();
                    std::io::stdin().read_to_string(&mut input)?;
                    input
                }
            };
            let event: Value = serde_json::from_str(&event)
                .map_err(|e| RagError::Invocation(format!("Invalid event JSON: {e}")))?;

            let context = Arc::new(Context::from_config(Config::load(&config_dir)?));
            let envelope = QueryHandler::new(context).handle_event(&event)?;
            println!("{}", envelope.to_json()?);
        }
        Commands::Ask { question } => {
            let output = UiClient::from_config(&Config::load(&config_dir)?).ask(&question);
            println!("{}", output.answer);
            println!();
            println!("### Sources");
            println!("{}", output.sources);
        }
        Commands::Ui => {
            run_form(&UiClient::from_config(&Config::load(&config_dir)?))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["docs-rag", "ingest"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Ingest));
            assert_eq!(parsed.config_dir, None);
        }
    }

    #[test]
    fn handle_command_with_event() {
        let cli = Cli::try_parse_from(["docs-rag", "handle", "--event", r#"{"input":"hi"}"#]);
        assert!(cli.is_ok());

        if let Ok(Cli {
            command: Commands::Handle { event },
            ..
        }) = cli
        {
            assert_eq!(event.as_deref(), Some(r#"{"input":"hi"}"#));
        }
    }

    #[test]
    fn ask_command_with_question() {
        let cli = Cli::try_parse_from(["docs-rag", "ask", "What is it?"]);
        assert!(cli.is_ok());

        if let Ok(Cli {
            command: Commands::Ask { question },
            ..
        }) = cli
        {
            assert_eq!(question, "What is it?");
        }
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["docs-rag", "ui", "--config-dir", "/tmp/rag"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Ui));
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/rag")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["docs-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Config { show: true }));
        }
    }

    #[test]
    fn ask_requires_question() {
        let cli = Cli::try_parse_from(["docs-rag", "ask"]);
        assert!(cli.is_err());

        if let Err(error) = cli {
            assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docs-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(error) = cli {
            assert_eq!(error.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}
