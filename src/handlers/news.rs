// src/handlers/news.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::news::{News, NewsRequest},
    utils::{audit::record_action, html::clean_html, jwt::Session},
};

/// List news, newest first. Public.
pub async fn list_news(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    let news = sqlx::query_as::<_, News>(
        r#"
        SELECT id, author_id, title, news_text, created_at, updated_at
        FROM news
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list news: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(news))
}

/// Get a single news entry by ID. Public.
pub async fn get_news(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let news = sqlx::query_as::<_, News>(
        r#"
        SELECT id, author_id, title, news_text, created_at, updated_at
        FROM news
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("News not found".to_string()))?;

    Ok(Json(news))
}

/// Create a news entry. The body is sanitised before storage.
/// Requires: MANAGE_NEWS.
pub async fn create_news(
    State(pool): State<PgPool>,
    Extension(session): Extension<Session>,
    Json(payload): Json<NewsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let (id,): (i32,) = sqlx::query_as(
        r#"
        INSERT INTO news (author_id, title, news_text)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(session.user_id)
    .bind(&payload.title)
    .bind(clean_html(&payload.news_text))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create news: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    record_action(
        &pool,
        Some(session.user_id),
        format!("Created news {} '{}'", id, payload.title),
    );

    Ok((StatusCode::CREATED, Json(json!({"id": id}))))
}

/// Edit a news entry.
/// Requires: MANAGE_NEWS.
pub async fn update_news(
    State(pool): State<PgPool>,
    Extension(session): Extension<Session>,
    Path(id): Path<i32>,
    Json(payload): Json<NewsRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let news = sqlx::query_as::<_, News>(
        r#"
        UPDATE news
        SET title = $1, news_text = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING id, author_id, title, news_text, created_at, updated_at
        "#,
    )
    .bind(&payload.title)
    .bind(clean_html(&payload.news_text))
    .bind(id)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to update news: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or(AppError::NotFound("News not found".to_string()))?;

    record_action(&pool, Some(session.user_id), format!("Edited news {}", id));

    Ok(Json(news))
}

/// Delete a news entry.
/// Requires: MANAGE_NEWS.
pub async fn delete_news(
    State(pool): State<PgPool>,
    Extension(session): Extension<Session>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM news WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete news: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("News not found".to_string()));
    }

    record_action(&pool, Some(session.user_id), format!("Deleted news {}", id));

    Ok(StatusCode::NO_CONTENT)
}
