//! Message role enumeration.

use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Author of a persisted message.
///
/// Corresponds to the `MESSAGE_ROLE` PostgreSQL enum.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[derive(Serialize, Deserialize, DbEnum, Display, EnumString)]
#[ExistingTypePath = "crate::schema::sql_types::MessageRole"]
#[strum(serialize_all = "snake_case")]
pub enum MessageRole {
    /// Message written by the end user.
    #[db_rename = "user"]
    #[serde(rename = "user")]
    User,

    /// Reply produced by the language model.
    #[db_rename = "assistant"]
    #[serde(rename = "assistant")]
    Assistant,
}

impl MessageRole {
    /// Returns whether the message was written by the user.
    #[inline]
    pub fn is_user(self) -> bool {
        matches!(self, MessageRole::User)
    }

    /// Returns whether the message was produced by the assistant.
    #[inline]
    pub fn is_assistant(self) -> bool {
        matches!(self, MessageRole::Assistant)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::from_str("assistant").ok(), Some(MessageRole::Assistant));
        assert!(MessageRole::from_str("system").is_err());
    }
}
