use std::sync::Arc;

use crate::config::Config;
use crate::repository::SessionDirectory;
use crate::services::quiz::QuizService;
use axum::extract::FromRef;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub quizzes: QuizService,
    /// Consulted by `auth_middleware` on every authenticated request.
    pub sessions: Arc<dyn SessionDirectory>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for QuizService {
    fn from_ref(state: &AppState) -> Self {
        state.quizzes.clone()
    }
}
