// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        participation::{ListQuizzesParams, SubmitAttemptRequest, Submission},
        quiz::CreateQuizRequest,
    },
    services::quiz::QuizService,
    utils::{audit::record_action, jwt::Session},
};

/// Where callers without a result are sent.
const QUIZ_LISTING_PATH: &str = "/api/quiz";

/// Lists quizzes with categories and statistics, optionally filtered by category.
/// `category_id=0` means no filter.
pub async fn list_quizzes(
    State(quizzes): State<QuizService>,
    Query(params): Query<ListQuizzesParams>,
) -> Result<impl IntoResponse, AppError> {
    let category_id = params.category_id.filter(|id| *id != 0);
    let listing = quizzes.list_quizzes(category_id).await?;
    Ok(Json(listing))
}

pub async fn list_categories(
    State(quizzes): State<QuizService>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(quizzes.list_categories().await?))
}

/// Authors a new quiz.
/// Requires: MANAGE_QUIZZES.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    State(quizzes): State<QuizService>,
    Extension(session): Extension<Session>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = payload.title.clone();
    let id = quizzes.create_quiz(&session, payload).await?;

    record_action(
        &pool,
        Some(session.user_id),
        format!("Created quiz {} '{}'", id, title),
    );

    Ok((StatusCode::CREATED, Json(json!({"id": id}))))
}

/// Deletes a quiz with everything attached to it.
/// Requires: MANAGE_QUIZZES.
pub async fn delete_quiz(
    State(pool): State<PgPool>,
    State(quizzes): State<QuizService>,
    Extension(session): Extension<Session>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    quizzes.delete_quiz(id).await?;

    record_action(&pool, Some(session.user_id), format!("Deleted quiz {}", id));

    Ok(StatusCode::NO_CONTENT)
}

/// Starts or resumes the caller's attempt at a quiz.
pub async fn participate(
    State(quizzes): State<QuizService>,
    Extension(session): Extension<Session>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = quizzes.start_or_resume_attempt(&session, id).await?;
    Ok(Json(attempt))
}

/// Submits the answers of the caller's current attempt.
pub async fn submit(
    State(quizzes): State<QuizService>,
    Extension(session): Extension<Session>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let submission = Submission::try_from(payload)?;
    let outcome = quizzes.submit_attempt(&session, submission).await?;
    Ok(Json(outcome))
}

/// The caller's latest result for a quiz; 303 to the listing when there is none.
pub async fn result(
    State(quizzes): State<QuizService>,
    Extension(session): Extension<Session>,
    Path(id): Path<i32>,
) -> Result<Response, AppError> {
    match quizzes.get_result(&session, id).await? {
        Some(result) => Ok(Json(result).into_response()),
        None => Ok(Redirect::to(QUIZ_LISTING_PATH).into_response()),
    }
}
