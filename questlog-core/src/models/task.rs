use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default category for tasks created without one.
pub const DEFAULT_CATEGORY: &str = "General";

/// A task owned by exactly one user. `completed_at` is stamped on the
/// false→true completion transition and deliberately left in place if the
/// task is later reopened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub due_date: Option<String>,
    pub category: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskInput {
    /// Defaulted so a missing title surfaces as a validation error rather
    /// than a deserialization rejection.
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub category: Option<String>,
}

/// Patch applied by `update_task`: absent fields are left unchanged.
/// Identity fields (id, owner) are not patchable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<String>,
    pub category: Option<String>,
}
