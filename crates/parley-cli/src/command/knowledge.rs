//! Knowledge base commands.

use std::path::PathBuf;

use clap::Subcommand;
use parley_rig::RigService;
use parley_rig::rag::{DEFAULT_SEARCH_LIMIT, Document};
use uuid::Uuid;

use super::{print_json, read_upload};

/// Operation on the client's knowledge base.
#[derive(Debug, Clone, Subcommand)]
pub enum KnowledgeCommand {
    /// Add raw text documents
    Add {
        /// Document texts, one document each
        #[arg(required = true)]
        texts: Vec<String>,
        /// Value of the `source` metadata key
        #[arg(long)]
        source: Option<String>,
    },

    /// Search the knowledge base
    Search {
        query: String,
        /// Number of results
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Remove every document
    Clear,

    /// Upload, extract and index a file
    Upload {
        path: PathBuf,
        /// Chunk size overriding the configured one
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// List uploaded files
    Files,

    /// Delete an uploaded file and its chunks
    DeleteFile {
        filename: String,
    },

    /// Delete one document by identifier
    DeleteDocument {
        id: Uuid,
    },

    /// Rebuild the index from the uploaded files
    Reindex,

    /// Show how many chunks are indexed
    Stats,
}

impl KnowledgeCommand {
    /// Runs the command for the client.
    pub async fn run(self, rig: &RigService, client_id: &str) -> anyhow::Result<()> {
        let knowledge = rig.knowledge();
        match self {
            Self::Add { texts, source } => {
                let documents = texts
                    .into_iter()
                    .map(|text| match &source {
                        Some(source) => Document::new(text).with_metadata("source", source.as_str()),
                        None => Document::new(text),
                    })
                    .collect();
                let ids = knowledge.add_documents(client_id, documents).await?;
                print_json(&serde_json::json!({ "ids": ids }))
            }
            Self::Search { query, limit } => {
                print_json(&knowledge.search(client_id, &query, limit).await?)
            }
            Self::Clear => {
                let removed = knowledge.clear(client_id).await?;
                print_json(&serde_json::json!({ "removed": removed }))
            }
            Self::Upload { path, chunk_size } => {
                let file = read_upload(&path).await?;
                let upload = knowledge.upload_file(client_id, file, chunk_size).await?;
                print_json(&serde_json::json!({
                    "filename": upload.filename,
                    "path": upload.path,
                    "chunks": upload.chunks,
                }))
            }
            Self::Files => print_json(&knowledge.list_files(client_id).await?),
            Self::DeleteFile { filename } => {
                let removed = knowledge.delete_file(client_id, &filename).await?;
                print_json(&serde_json::json!({ "filename": filename, "removedChunks": removed }))
            }
            Self::DeleteDocument { id } => {
                knowledge.delete_document(client_id, id).await?;
                print_json(&serde_json::json!({ "deleted": id }))
            }
            Self::Reindex => {
                let chunks = knowledge.reindex(client_id).await?;
                print_json(&serde_json::json!({ "chunks": chunks }))
            }
            Self::Stats => {
                let chunks = knowledge.indexed_chunks(client_id).await?;
                print_json(&serde_json::json!({ "indexedChunks": chunks }))
            }
        }
    }
}
