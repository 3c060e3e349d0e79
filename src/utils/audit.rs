// src/utils/audit.rs

use sqlx::PgPool;

/// Appends an entry to `user_actions` in the background.
///
/// The request never waits on it; a failed insert is only logged.
pub fn record_action(pool: &PgPool, user_id: Option<i32>, description: impl Into<String>) {
    let pool = pool.clone();
    let description = description.into();

    tokio::spawn(async move {
        let result =
            sqlx::query("INSERT INTO user_actions (user_id, action_description) VALUES ($1, $2)")
                .bind(user_id)
                .bind(&description)
                .execute(&pool)
                .await;

        if let Err(e) = result {
            tracing::warn!("Failed to record action '{}': {:?}", description, e);
        }
    });
}
