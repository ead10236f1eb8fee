use clap::{Parser, Subcommand};
use rag_chat::commands::{
    ask, forget_chat, ingest_file, list_namespaces, show_config, sync_all, sync_page,
    write_default_config,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rag-chat")]
#[command(about = "Per-chat document indexing and retrieval-augmented answers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file, or show the current one
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a PDF, DOCX or text file into a chat's knowledge base
    Ingest {
        /// Path to the document
        path: PathBuf,
        /// Chat the document belongs to
        #[arg(long, allow_negative_numbers = true)]
        chat: i64,
    },
    /// Ask a question against a chat's knowledge base
    Ask {
        /// The question to answer
        question: String,
        /// Chat whose documents should be searched
        #[arg(long, allow_negative_numbers = true)]
        chat: i64,
    },
    /// Re-sync a single Notion page into its own namespace
    SyncPage {
        /// Notion page id
        page_id: String,
    },
    /// Re-sync every page of the configured Notion database
    SyncAll,
    /// List namespaces and their chunk counts
    Namespaces,
    /// Remove everything stored for a chat
    Forget {
        /// Chat to forget
        #[arg(long, allow_negative_numbers = true)]
        chat: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                write_default_config()?;
            }
        }
        Commands::Ingest { path, chat } => {
            ingest_file(&path, chat).await?;
        }
        Commands::Ask { question, chat } => {
            ask(&question, chat).await?;
        }
        Commands::SyncPage { page_id } => {
            sync_page(&page_id).await?;
        }
        Commands::SyncAll => {
            sync_all().await?;
        }
        Commands::Namespaces => {
            list_namespaces().await?;
        }
        Commands::Forget { chat } => {
            forget_chat(chat).await?;
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
        let cli = Cli::try_parse_from(["rag-chat", "namespaces"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Namespaces));
        }
    }

    #[test]
    fn ingest_command_with_chat() {
        let cli = Cli::try_parse_from(["rag-chat", "ingest", "notes.pdf", "--chat", "42"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { path, chat } = parsed.command {
                assert_eq!(path, PathBuf::from("notes.pdf"));
                assert_eq!(chat, 42);
            } else {
                panic!("expected ingest command");
            }
        }
    }

    #[test]
    fn ingest_requires_chat() {
        let cli = Cli::try_parse_from(["rag-chat", "ingest", "notes.pdf"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn ask_accepts_negative_chat_ids() {
        let cli = Cli::try_parse_from([
            "rag-chat",
            "ask",
            "Who kept the lighthouse?",
            "--chat",
            "-1001234",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { question, chat } = parsed.command {
                assert_eq!(question, "Who kept the lighthouse?");
                assert_eq!(chat, -1_001_234);
            } else {
                panic!("expected ask command");
            }
        }
    }

    #[test]
    fn chat_must_be_numeric() {
        let cli = Cli::try_parse_from(["rag-chat", "ask", "hi", "--chat", "general"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn sync_page_command() {
        let cli = Cli::try_parse_from(["rag-chat", "sync-page", "abc123"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::SyncPage { page_id } = parsed.command {
                assert_eq!(page_id, "abc123");
            } else {
                panic!("expected sync-page command");
            }
        }
    }

    #[test]
    fn sync_all_command() {
        let cli = Cli::try_parse_from(["rag-chat", "sync-all"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::SyncAll));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["rag-chat", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["rag-chat", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["rag-chat", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
