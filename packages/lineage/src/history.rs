use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ProjectCreated,
    ProjectDeleted,
    Upload,
    Edit,
    Merge,
    Undo,
    Delete,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::ProjectDeleted => "project_deleted",
            Self::Upload => "upload",
            Self::Edit => "edit",
            Self::Merge => "merge",
            Self::Undo => "undo",
            Self::Delete => "delete",
        }
    }
}

/// One line of a user's activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub user_id: i32,
    pub project_id: i32,
    pub kind: ActivityKind,
    pub description: String,
}

impl HistoryEntry {
    pub fn new(
        user_id: i32,
        project_id: i32,
        kind: ActivityKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            project_id,
            kind,
            description: description.into(),
        }
    }
}

/// Sink for activity records.
///
/// The engine never fails an operation because recording failed.
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record(&self, entry: HistoryEntry) -> anyhow::Result<()>;
}

/// Writes each entry as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHistory;

#[async_trait]
impl HistoryRecorder for TracingHistory {
    async fn record(&self, entry: HistoryEntry) -> anyhow::Result<()> {
        info!(
            target: "lineage::history",
            user_id = entry.user_id,
            project_id = entry.project_id,
            kind = entry.kind.as_str(),
            "{}",
            entry.description
        );
        Ok(())
    }
}
