//! Typed events emitted by CRUD collaborators after a mutation commits

use serde_json::json;

use crate::websocket::Message;

/// Channel that project change notifications are published on
pub const PROJECTS_CHANNEL: &str = "projects";

/// A committed change to a project record
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectEvent {
    Created { id: i64, name: String },
    Updated { id: i64 },
    Deleted { id: i64 },
}

impl ProjectEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "project_created",
            Self::Updated { .. } => "project_updated",
            Self::Deleted { .. } => "project_deleted",
        }
    }

    pub fn into_message(self) -> Message {
        let kind = self.kind();
        let data = match self {
            Self::Created { id, name } => json!({ "id": id, "name": name }),
            Self::Updated { id } | Self::Deleted { id } => json!({ "id": id }),
        };

        Message::new(kind)
            .with_channel(PROJECTS_CHANNEL)
            .with_data(data)
    }
}
