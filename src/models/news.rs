// src/models/news.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'news' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct News {
    pub id: i32,
    pub author_id: i32,
    pub title: String,
    /// Sanitised HTML body.
    pub news_text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating or editing a news entry.
#[derive(Debug, Deserialize, Validate)]
pub struct NewsRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 20000))]
    pub news_text: String,
}
