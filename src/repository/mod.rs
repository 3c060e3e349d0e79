// src/repository/mod.rs

//! Data-access boundary for quizzes and participation.
//!
//! Every call goes through a [`Transaction`] obtained from a [`TransactionManager`],
//! so a workflow step observes one atomic, isolated scope. Dropping a transaction
//! without calling [`Transaction::commit`] rolls it back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        participation::{ChoiceAnswer, ParticipationTime, TextAnswer, UserQuizScore},
        quiz::{
            Category, Choice, Question, QuestionType, Quiz, QuizCategory, QuizStatistics,
            TextQuestionAnswer,
        },
    },
    utils::jwt::Session,
};

pub use memory::MemoryStore;
pub use postgres::{PgSessionDirectory, PgTransactionManager};

/// Typed quiz and participation operations.
///
/// Lookups of rows whose absence is a valid state return `Ok(None)`;
/// lookups of rows that must exist return `AppError::NotFound`.
#[async_trait]
pub trait QuizRepository: Send {
    async fn get_all_categories(&mut self) -> Result<Vec<Category>, AppError>;

    async fn get_categories_pairs(&mut self, quiz_ids: &[i32])
    -> Result<Vec<QuizCategory>, AppError>;

    /// All quizzes, or only those in `category_id`.
    async fn get_all_quizzes(&mut self, category_id: Option<i32>) -> Result<Vec<Quiz>, AppError>;

    async fn add_quiz(
        &mut self,
        title: &str,
        description: &str,
        author_id: i32,
    ) -> Result<i32, AppError>;

    /// `NotFound` when a category does not exist.
    async fn add_quiz_categories(
        &mut self,
        quiz_id: i32,
        category_ids: &[i32],
    ) -> Result<(), AppError>;

    async fn add_question(
        &mut self,
        quiz_id: i32,
        text: &str,
        question_type: QuestionType,
    ) -> Result<i32, AppError>;

    async fn add_text_question_answer(
        &mut self,
        question_id: i32,
        answer: &str,
    ) -> Result<(), AppError>;

    async fn add_choice(
        &mut self,
        question_id: i32,
        text: &str,
        is_correct: bool,
    ) -> Result<i32, AppError>;

    async fn get_quiz(&mut self, id: i32) -> Result<Quiz, AppError>;

    /// Questions of a quiz, ordered by id.
    async fn get_quiz_questions(&mut self, quiz_id: i32) -> Result<Vec<Question>, AppError>;

    async fn get_text_question_answer(
        &mut self,
        question_id: i32,
    ) -> Result<TextQuestionAnswer, AppError>;

    /// Choices of a question, ordered by id.
    async fn get_choices(&mut self, question_id: i32) -> Result<Vec<Choice>, AppError>;

    async fn get_correct_choice(&mut self, question_id: i32) -> Result<Choice, AppError>;

    async fn get_choice(&mut self, id: i32) -> Result<Choice, AppError>;

    async fn delete_quiz(&mut self, id: i32) -> Result<(), AppError>;

    /// Serialises attempt mutations of one user until the transaction ends.
    async fn lock_user_participation(&mut self, user_id: i32) -> Result<(), AppError>;

    /// The user's row with the highest participation number.
    async fn get_last_participation_time(
        &mut self,
        user_id: i32,
    ) -> Result<Option<ParticipationTime>, AppError>;

    async fn delete_participation_time(&mut self, id: i32) -> Result<(), AppError>;

    async fn finish_participation_time(
        &mut self,
        id: i32,
        finished_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn add_participation_time(
        &mut self,
        user_id: i32,
        quiz_id: i32,
        participation_number: i32,
        started_at: DateTime<Utc>,
    ) -> Result<ParticipationTime, AppError>;

    /// The user's most recent finished attempt at a quiz.
    async fn get_finished_participation_time(
        &mut self,
        user_id: i32,
        quiz_id: i32,
    ) -> Result<Option<ParticipationTime>, AppError>;

    async fn remove_user_choice_answers(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<(), AppError>;

    async fn add_user_choice_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
        choice_id: i32,
    ) -> Result<(), AppError>;

    async fn remove_user_text_answers(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<(), AppError>;

    async fn add_user_text_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
        text: &str,
    ) -> Result<(), AppError>;

    async fn get_user_choice_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<Option<ChoiceAnswer>, AppError>;

    async fn get_user_text_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<Option<TextAnswer>, AppError>;

    /// Insert or overwrite the (user, quiz) score.
    async fn upsert_user_score(
        &mut self,
        user_id: i32,
        quiz_id: i32,
        score: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn get_user_score(
        &mut self,
        user_id: i32,
        quiz_id: i32,
    ) -> Result<Option<UserQuizScore>, AppError>;

    async fn get_quiz_statistics(
        &mut self,
        quiz_ids: &[i32],
    ) -> Result<Vec<QuizStatistics>, AppError>;
}

/// A unit of work. Rolled back when dropped without commit.
#[async_trait]
pub trait Transaction: QuizRepository {
    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

/// Opens transactions against a store.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError>;
}

/// Resolves the holder of a valid token against current account data.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// `None` once the user has been deleted.
    async fn find_session(&self, user_id: i32) -> Result<Option<Session>, AppError>;
}
