//! Database models for all tables.
//!
//! Each table has a queryable model plus `New*` (insertable) and, where rows
//! are mutable, `Update*` (changeset) companions.

mod knowledge_chunk;
mod message;
mod reader_file;
mod session;
mod session_temp_file;

pub use knowledge_chunk::{KnowledgeChunk, NewKnowledgeChunk, ScoredKnowledgeChunk};
pub use message::{Message, NewMessage};
pub use reader_file::{NewReaderFile, ReaderFile};
pub use session::{NewSession, Session, SessionOverview, UpdateSession};
pub use session_temp_file::{NewSessionTempFile, SessionTempFile};
