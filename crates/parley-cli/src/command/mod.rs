//! Subcommands and their dispatch.
//!
//! `migrate` only needs the database client; every other command runs on a
//! [`RigService`]. Results go to stdout, as SSE frames for `chat` and as
//! pretty-printed JSON otherwise.

mod chat;
mod knowledge;
mod migrate;
mod reader;
mod session;

use std::path::Path;

use anyhow::Context;
use clap::Subcommand;
use parley_postgres::PgClient;
use parley_rig::rag::UploadedFile;
use parley_rig::{RigConfig, RigService};
use serde::Serialize;

pub use self::chat::ChatArgs;
pub use self::knowledge::KnowledgeCommand;
pub use self::reader::ReaderCommand;
pub use self::session::{MessagesArgs, UpdateSessionArgs};

/// Operation to run.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Apply pending database migrations
    Migrate {
        /// Only report applied and pending migrations
        #[arg(long)]
        status: bool,
    },

    #[command(flatten)]
    Service(ServiceCommand),
}

impl Command {
    /// Runs the command for the client.
    pub async fn run(
        self,
        db: PgClient,
        config: &RigConfig,
        client_id: &str,
    ) -> anyhow::Result<()> {
        match self {
            Self::Migrate { status } => migrate::run(&db, status).await,
            Self::Service(command) => {
                let rig = RigService::from_config(config, db)
                    .context("failed to create chat service")?;
                command.run(&rig, client_id).await
            }
        }
    }
}

/// Operation on the chat service.
#[derive(Debug, Clone, Subcommand)]
pub enum ServiceCommand {
    /// Run one chat turn and print its event stream
    Chat(ChatArgs),

    /// Upload a temporary document to a session, replacing the previous one
    Upload {
        /// Target session
        #[arg(long)]
        session: String,
        /// File to upload
        path: std::path::PathBuf,
    },

    /// Create a session
    CreateSession {
        /// Assistant role name
        #[arg(long)]
        role_name: Option<String>,
        /// System prompt override
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// List sessions, most recently updated first
    Sessions,

    /// Show one page of a session's messages
    Messages(MessagesArgs),

    /// Change the role name or system prompt of a session
    UpdateSession(UpdateSessionArgs),

    /// Delete a session with its messages and temporary documents
    DeleteSession {
        session: String,
    },

    /// Delete one of the client's messages
    DeleteMessage {
        message_id: uuid::Uuid,
    },

    /// List available chat models
    Models,

    /// Generate a system prompt for a role
    GeneratePrompt {
        role_name: String,
        /// Model used instead of the default prompt model
        #[arg(long)]
        model: Option<String>,
    },

    /// Manage the client's knowledge base
    #[command(subcommand)]
    Kb(KnowledgeCommand),

    /// Read documents with streamed summaries, deep readings and mind maps
    #[command(subcommand)]
    Reader(ReaderCommand),
}

impl ServiceCommand {
    /// Runs the command for the client.
    pub async fn run(self, rig: &RigService, client_id: &str) -> anyhow::Result<()> {
        match self {
            Self::Chat(args) => chat::run(rig, client_id, args).await,
            Self::Upload { session, path } => {
                session::upload(rig, client_id, &session, &path).await
            }
            Self::CreateSession {
                role_name,
                system_prompt,
            } => session::create(rig, client_id, role_name, system_prompt).await,
            Self::Sessions => print_json(&rig.sessions().list(client_id).await?),
            Self::Messages(args) => session::messages(rig, client_id, args).await,
            Self::UpdateSession(args) => session::update(rig, client_id, args).await,
            Self::DeleteSession { session } => {
                rig.sessions().delete(&session, client_id).await?;
                print_json(&serde_json::json!({ "deleted": session }))
            }
            Self::DeleteMessage { message_id } => {
                rig.chat().delete_message(message_id, client_id).await?;
                print_json(&serde_json::json!({ "deleted": message_id }))
            }
            Self::Models => print_json(&rig.models().list()),
            Self::GeneratePrompt { role_name, model } => {
                let prompt = rig
                    .chat()
                    .generate_system_prompt(&role_name, model.as_deref())
                    .await?;
                print_json(&serde_json::json!({ "roleName": role_name, "systemPrompt": prompt }))
            }
            Self::Kb(command) => command.run(rig, client_id).await,
            Self::Reader(command) => command.run(rig, client_id).await,
        }
    }
}

/// Writes a value to stdout as pretty JSON.
fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Reads a local file into an upload, guessing its MIME type from the extension.
async fn read_upload(path: &Path) -> anyhow::Result<UploadedFile> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("not a file path: {}", path.display()))?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();

    Ok(UploadedFile::new(filename, mime_type.essence_str(), data))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn upload_carries_name_and_guessed_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, "# Notes").await.unwrap();

        let upload = read_upload(&path).await.unwrap();
        assert_eq!(upload.original_filename, "notes.txt");
        assert_eq!(upload.mime_type, "text/plain");
        assert_eq!(upload.data, b"# Notes");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let error = read_upload(&dir.path().join("absent.txt")).await.unwrap_err();
        assert!(error.to_string().contains("failed to read"));
    }
}
