//! Shared database types: enumerations and pagination.

mod message_role;
mod pagination;

pub use message_role::MessageRole;
pub use pagination::{OffsetPage, OffsetPagination};
