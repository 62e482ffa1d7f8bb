//! Session and temporary document commands.

use std::path::Path;

use clap::Args;
use parley_rig::RigService;
use parley_rig::session::{CreateSession, DEFAULT_PAGE_SIZE};
use parley_rig::store::SessionChanges;

use super::{print_json, read_upload};
use crate::TRACING_TARGET_COMMAND;

/// Arguments of the `messages` command.
#[derive(Debug, Clone, Args)]
pub struct MessagesArgs {
    pub session: String,

    /// Page number, starting at 1 with the most recent messages
    #[arg(long, default_value_t = 1)]
    pub page: i64,

    /// Messages per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: i64,
}

/// Arguments of the `update-session` command.
#[derive(Debug, Clone, Args)]
pub struct UpdateSessionArgs {
    pub session: String,

    /// New role name
    #[arg(long, conflicts_with = "clear_role_name")]
    pub role_name: Option<String>,

    /// Remove the role name
    #[arg(long)]
    pub clear_role_name: bool,

    /// New system prompt
    #[arg(long, conflicts_with = "clear_system_prompt")]
    pub system_prompt: Option<String>,

    /// Remove the system prompt override
    #[arg(long)]
    pub clear_system_prompt: bool,
}

impl UpdateSessionArgs {
    fn changes(&self) -> SessionChanges {
        let field = |value: &Option<String>, clear: bool| match (value, clear) {
            (Some(value), _) => Some(Some(value.clone())),
            (None, true) => Some(None),
            (None, false) => None,
        };

        SessionChanges {
            role_name: field(&self.role_name, self.clear_role_name),
            system_prompt: field(&self.system_prompt, self.clear_system_prompt),
        }
    }
}

pub async fn create(
    rig: &RigService,
    client_id: &str,
    role_name: Option<String>,
    system_prompt: Option<String>,
) -> anyhow::Result<()> {
    let request = CreateSession {
        role_name,
        system_prompt,
    };
    let session = rig.sessions().create(client_id, request).await?;
    print_json(&session)
}

pub async fn messages(rig: &RigService, client_id: &str, args: MessagesArgs) -> anyhow::Result<()> {
    let page = rig
        .sessions()
        .session_messages(&args.session, client_id, args.page, args.page_size)
        .await?;
    print_json(&page)
}

pub async fn update(
    rig: &RigService,
    client_id: &str,
    args: UpdateSessionArgs,
) -> anyhow::Result<()> {
    let changes = args.changes();
    if changes.is_empty() {
        tracing::warn!(target: TRACING_TARGET_COMMAND, "Nothing to update");
    }
    let session = rig
        .sessions()
        .update(&args.session, client_id, changes)
        .await?;
    print_json(&session)
}

/// Replaces the session's temporary document.
pub async fn upload(
    rig: &RigService,
    client_id: &str,
    session_id: &str,
    path: &Path,
) -> anyhow::Result<()> {
    let file = read_upload(path).await?;
    let upload = rig
        .temp_documents()
        .upload(session_id, client_id, file)
        .await?;

    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        path = %upload.path.display(),
        short = upload.is_short_document,
        "Temporary document stored"
    );
    print_json(&serde_json::json!({
        "isShortDocument": upload.is_short_document,
        "files": upload.documents,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> UpdateSessionArgs {
        UpdateSessionArgs {
            session: "s".into(),
            role_name: None,
            clear_role_name: false,
            system_prompt: None,
            clear_system_prompt: false,
        }
    }

    #[test]
    fn untouched_fields_stay_unset() {
        assert!(args().changes().is_empty());
    }

    #[test]
    fn set_and_clear_map_to_changes() {
        let args = UpdateSessionArgs {
            role_name: Some("Tutor".into()),
            clear_system_prompt: true,
            ..args()
        };

        let changes = args.changes();
        assert_eq!(changes.role_name, Some(Some("Tutor".into())));
        assert_eq!(changes.system_prompt, Some(None));
    }
}
