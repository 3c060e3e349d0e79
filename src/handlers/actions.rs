// src/handlers/actions.rs

use axum::{Json, extract::State, response::IntoResponse};
use sqlx::PgPool;

use crate::{error::AppError, models::action::UserAction};

/// The action log, newest first.
/// Requires: VIEW_ACTIONS.
pub async fn list_actions(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let actions = sqlx::query_as::<_, UserAction>(
        r#"
        SELECT id, user_id, action_description, action_time
        FROM user_actions
        ORDER BY action_time DESC, id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list actions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(actions))
}
