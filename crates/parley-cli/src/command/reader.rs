//! Document reader commands.

use std::path::PathBuf;

use clap::Subcommand;
use parley_rig::RigService;
use parley_rig::reader::ReaderAnalysis;

use super::chat::print_events;
use super::{print_json, read_upload};
use crate::TRACING_TARGET_COMMAND;

/// Operation on the client's reader documents.
#[derive(Debug, Clone, Subcommand)]
pub enum ReaderCommand {
    /// Upload a document for reading
    Upload { path: PathBuf },

    /// List uploaded documents, newest first
    Files,

    /// Delete a document with its cached analyses
    Delete { filename: String },

    /// Stream the summary of a document
    Summary {
        filename: String,
        /// Model identifier (see `parley models`)
        #[arg(long)]
        model: Option<String>,
    },

    /// Stream a page-by-page deep reading of a document
    DeepReading {
        filename: String,
        /// Model identifier (see `parley models`)
        #[arg(long)]
        model: Option<String>,
    },

    /// Stream a mind map of a document as markdown headings
    MindMap {
        filename: String,
        /// Model identifier (see `parley models`)
        #[arg(long)]
        model: Option<String>,
    },
}

impl ReaderCommand {
    /// Runs the command for the client.
    pub async fn run(self, rig: &RigService, client_id: &str) -> anyhow::Result<()> {
        let reader = rig.reader();
        let (filename, kind, model) = match self {
            Self::Upload { path } => {
                let upload = read_upload(&path).await?;
                return print_json(&reader.upload(client_id, upload).await?);
            }
            Self::Files => return print_json(&reader.list(client_id).await?),
            Self::Delete { filename } => {
                reader.delete(&filename, client_id).await?;
                return print_json(&serde_json::json!({ "deleted": filename }));
            }
            Self::Summary { filename, model } => (filename, ReaderAnalysis::Summary, model),
            Self::DeepReading { filename, model } => {
                (filename, ReaderAnalysis::DeepReading, model)
            }
            Self::MindMap { filename, model } => (filename, ReaderAnalysis::MindMap, model),
        };

        let mut stream = reader
            .stream(&filename, client_id, kind, model.as_deref())
            .await?;
        tracing::info!(target: TRACING_TARGET_COMMAND, %filename, ?kind, "Reader analysis started");

        let cancel = stream.cancellation_token();
        let failure = print_events(&mut stream, &cancel).await?;
        stream.drain().await;
        match failure {
            Some(message) => anyhow::bail!("reader analysis failed: {message}"),
            None => Ok(()),
        }
    }
}
