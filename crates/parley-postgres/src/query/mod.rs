//! Repository traits over [`PgConnection`](crate::PgConnection).
//!
//! Every repository is implemented directly for the async connection, so a
//! pooled [`PgConn`](crate::PgConn) can call them through deref.

mod knowledge_chunk;
mod message;
mod reader_file;
mod session;
mod session_temp_file;

pub use knowledge_chunk::KnowledgeChunkRepository;
pub use message::MessageRepository;
pub use reader_file::{ReaderAnalysisColumn, ReaderFileRepository};
pub use session::SessionRepository;
pub use session_temp_file::SessionTempFileRepository;
