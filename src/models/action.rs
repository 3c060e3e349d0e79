// src/models/action.rs

use serde::Serialize;
use sqlx::FromRow;

/// Represents the 'user_actions' table: an audit trail of administrative and account events.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserAction {
    pub id: i32,
    /// Null once the acting user has been deleted.
    pub user_id: Option<i32>,
    pub action_description: String,
    pub action_time: chrono::DateTime<chrono::Utc>,
}
