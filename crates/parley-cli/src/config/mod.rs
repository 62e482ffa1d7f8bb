//! CLI configuration management.
//!
//! This module defines the complete CLI configuration hierarchy:
//!
//! ```text
//! Cli
//! ├── postgres: PgConfig   # Connection pool
//! ├── rig: RigConfig       # Models, embeddings, web search, chunking, storage
//! ├── client_id            # Tenant every command acts for
//! └── command: Command     # Operation to run
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! parley --postgres-url "postgresql://..." --llm-api-key "..." models
//!
//! # Or via environment variables
//! POSTGRES_URL="postgresql://..." LLM_API_KEY="..." parley models
//! ```

use std::process;

use anyhow::Context;
use clap::Parser;
use parley_postgres::PgConfig;
use parley_rig::RigConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::command::{Command, ServiceCommand};
use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "parley")]
#[command(about = "Retrieval-augmented chat over web, knowledge base and session documents")]
#[command(version)]
pub struct Cli {
    /// PostgreSQL connection pool configuration.
    #[clap(flatten)]
    pub postgres: PgConfig,

    /// Chat pipeline configuration.
    #[clap(flatten)]
    pub rig: RigConfig,

    /// Client identifier every command acts for
    #[arg(long, env = "CLIENT_ID", default_value = "default", global = true)]
    pub client_id: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded before clap parses arguments so its values act
    /// as defaults for every `env` backed flag.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    ///
    /// Logs are written to stderr; stdout carries command output.
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_id.trim().is_empty() {
            anyhow::bail!("client id must not be empty");
        }
        self.postgres
            .validate()
            .context("invalid database configuration")?;
        self.rig.validate().context("invalid chat configuration")?;
        Ok(())
    }

    /// Logs configuration (no sensitive information).
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            postgres_url = %self.postgres.database_url_masked(),
            postgres_max_connections = self.postgres.postgres_max_connections,
            "Database configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            llm_base_url = %self.rig.llm.llm_base_url,
            embedding_model = %self.rig.embedding.embedding_model,
            embedding_dimensions = self.rig.embedding.embedding_dimensions,
            data_dir = %self.rig.storage.data_dir.display(),
            client_id = %self.client_id,
            "Chat configuration"
        );
    }

    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;
    use crate::command::ReaderCommand;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn migrate_is_a_top_level_command() {
        let cli = Cli::try_parse_from([
            "parley",
            "--postgres-url",
            "postgresql://localhost/parley",
            "--llm-api-key",
            "key",
            "migrate",
            "--status",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Migrate { status: true }));
    }

    #[test]
    fn parses_chat_flags() {
        let cli = Cli::try_parse_from([
            "parley",
            "--postgres-url",
            "postgresql://localhost/parley",
            "--llm-api-key",
            "key",
            "--client-id",
            "acme",
            "chat",
            "--web-search",
            "--session",
            "s1",
            "hello",
        ])
        .unwrap();

        assert_eq!(cli.client_id, "acme");
        let Command::Service(ServiceCommand::Chat(args)) = cli.command else {
            panic!("expected chat command");
        };
        assert!(args.web_search);
        assert!(!args.vector_search);
        assert_eq!(args.session.as_deref(), Some("s1"));
        assert_eq!(args.message, "hello");
    }

    #[test]
    fn parses_reader_commands() {
        let cli = Cli::try_parse_from([
            "parley",
            "--postgres-url",
            "postgresql://localhost/parley",
            "--llm-api-key",
            "key",
            "reader",
            "deep-reading",
            "paper.pdf",
            "--model",
            "fast",
        ])
        .unwrap();

        let Command::Service(ServiceCommand::Reader(ReaderCommand::DeepReading { filename, model })) =
            cli.command
        else {
            panic!("expected reader deep-reading command");
        };
        assert_eq!(filename, "paper.pdf");
        assert_eq!(model.as_deref(), Some("fast"));
    }
}
