// src/repository/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{QuizRepository, SessionDirectory, Transaction, TransactionManager};
use crate::{
    error::AppError,
    models::{
        participation::{ChoiceAnswer, ParticipationTime, TextAnswer, UserQuizScore},
        quiz::{
            Category, Choice, Question, QuestionType, Quiz, QuizCategory, QuizStatistics,
            TextQuestionAnswer,
        },
        role::Permissions,
    },
    utils::{format::format_clock, jwt::Session},
};

/// Opens Postgres transactions from the shared pool.
#[derive(Debug, Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        let tx = self.pool.begin().await.map_err(|e| {
            tracing::error!("Failed to begin transaction: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(Box::new(PgTransaction { tx }))
    }
}

/// Reads sessions from `users` and the roles linked to them.
#[derive(Debug, Clone)]
pub struct PgSessionDirectory {
    pool: PgPool,
}

impl PgSessionDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionDirectory for PgSessionDirectory {
    async fn find_session(&self, user_id: i32) -> Result<Option<Session>, AppError> {
        let user: Option<(String,)> = sqlx::query_as("SELECT username FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some((username,)) = user else {
            return Ok(None);
        };

        let permissions = load_permissions(&self.pool, user_id).await?;
        Ok(Some(Session {
            user_id,
            username,
            permissions,
        }))
    }
}

/// Bitwise OR of the permissions of every role the user holds.
pub async fn load_permissions(pool: &PgPool, user_id: i32) -> Result<Permissions, AppError> {
    let (bits,): (i64,) = sqlx::query_as(
        r#"
        SELECT COALESCE(BIT_OR(r.permissions), 0)::BIGINT
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(Permissions::from_bits(bits))
}

/// A live Postgres transaction. sqlx rolls it back on drop.
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

/// `questions` row as stored; the type column is plain text.
#[derive(FromRow)]
struct QuestionRow {
    id: i32,
    quiz_id: i32,
    question_text: String,
    question_type: String,
}

/// `quiz_statistics` row; the average time is whole seconds.
#[derive(FromRow)]
struct StatisticsRow {
    quiz_id: i32,
    total_attempts: i64,
    average_score: f64,
    average_completion_seconds: i64,
}

impl From<StatisticsRow> for QuizStatistics {
    fn from(row: StatisticsRow) -> Self {
        QuizStatistics {
            quiz_id: row.quiz_id,
            total_attempts: row.total_attempts,
            average_score: row.average_score,
            average_completion_time: format_clock(row.average_completion_seconds),
        }
    }
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            quiz_id: row.quiz_id,
            question_text: row.question_text,
            question_type: row.question_type.parse()?,
        })
    }
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{} not found", what))
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit transaction: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })
    }
}

#[async_trait]
impl QuizRepository for PgTransaction {
    async fn get_all_categories(&mut self) -> Result<Vec<Category>, AppError> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY id")
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(categories)
    }

    async fn get_categories_pairs(
        &mut self,
        quiz_ids: &[i32],
    ) -> Result<Vec<QuizCategory>, AppError> {
        let pairs = sqlx::query_as::<_, QuizCategory>(
            r#"
            SELECT quiz_id, category_id
            FROM quiz_categories
            WHERE quiz_id = ANY($1)
            ORDER BY quiz_id, category_id
            "#,
        )
        .bind(quiz_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(pairs)
    }

    async fn get_all_quizzes(&mut self, category_id: Option<i32>) -> Result<Vec<Quiz>, AppError> {
        let quizzes = match category_id {
            None => {
                sqlx::query_as::<_, Quiz>(
                    r#"
                    SELECT id, author_id, title, description, created_at, updated_at
                    FROM quizzes
                    ORDER BY id
                    "#,
                )
                .fetch_all(&mut *self.tx)
                .await?
            }
            Some(category_id) => {
                sqlx::query_as::<_, Quiz>(
                    r#"
                    SELECT q.id, q.author_id, q.title, q.description, q.created_at, q.updated_at
                    FROM quizzes q
                    JOIN quiz_categories qc ON q.id = qc.quiz_id
                    WHERE qc.category_id = $1
                    ORDER BY q.id
                    "#,
                )
                .bind(category_id)
                .fetch_all(&mut *self.tx)
                .await?
            }
        };
        Ok(quizzes)
    }

    async fn add_quiz(
        &mut self,
        title: &str,
        description: &str,
        author_id: i32,
    ) -> Result<i32, AppError> {
        let (id,): (i32,) = sqlx::query_as(
            "INSERT INTO quizzes (author_id, title, description) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(author_id)
        .bind(title)
        .bind(description)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn add_quiz_categories(
        &mut self,
        quiz_id: i32,
        category_ids: &[i32],
    ) -> Result<(), AppError> {
        if category_ids.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO quiz_categories (quiz_id, category_id) ");
        builder.push_values(category_ids, |mut row, category_id| {
            row.push_bind(quiz_id).push_bind(*category_id);
        });
        builder.push(" ON CONFLICT DO NOTHING");

        builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if e.as_database_error()
                    .is_some_and(|db| db.is_foreign_key_violation())
                {
                    not_found("category")
                } else {
                    AppError::from(e)
                }
            })?;
        Ok(())
    }

    async fn add_question(
        &mut self,
        quiz_id: i32,
        text: &str,
        question_type: QuestionType,
    ) -> Result<i32, AppError> {
        let (id,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO questions (quiz_id, question_text, question_type)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(quiz_id)
        .bind(text)
        .bind(question_type.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn add_text_question_answer(
        &mut self,
        question_id: i32,
        answer: &str,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO text_question_answers (question_id, right_answer) VALUES ($1, $2)")
            .bind(question_id)
            .bind(answer)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn add_choice(
        &mut self,
        question_id: i32,
        text: &str,
        is_correct: bool,
    ) -> Result<i32, AppError> {
        let (id,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO choices (question_id, choice_text, is_correct)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(question_id)
        .bind(text)
        .bind(is_correct)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    async fn get_quiz(&mut self, id: i32) -> Result<Quiz, AppError> {
        sqlx::query_as::<_, Quiz>(
            r#"
            SELECT id, author_id, title, description, created_at, updated_at
            FROM quizzes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| not_found("quiz"))
    }

    async fn get_quiz_questions(&mut self, quiz_id: i32) -> Result<Vec<Question>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, quiz_id, question_text, question_type
            FROM questions
            WHERE quiz_id = $1
            ORDER BY id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(Question::try_from).collect()
    }

    async fn get_text_question_answer(
        &mut self,
        question_id: i32,
    ) -> Result<TextQuestionAnswer, AppError> {
        sqlx::query_as::<_, TextQuestionAnswer>(
            "SELECT question_id, right_answer FROM text_question_answers WHERE question_id = $1",
        )
        .bind(question_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| not_found("right answer"))
    }

    async fn get_choices(&mut self, question_id: i32) -> Result<Vec<Choice>, AppError> {
        let choices = sqlx::query_as::<_, Choice>(
            r#"
            SELECT id, question_id, choice_text, is_correct
            FROM choices
            WHERE question_id = $1
            ORDER BY id
            "#,
        )
        .bind(question_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(choices)
    }

    async fn get_correct_choice(&mut self, question_id: i32) -> Result<Choice, AppError> {
        sqlx::query_as::<_, Choice>(
            r#"
            SELECT id, question_id, choice_text, is_correct
            FROM choices
            WHERE question_id = $1 AND is_correct = TRUE
            "#,
        )
        .bind(question_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| not_found("correct choice"))
    }

    async fn get_choice(&mut self, id: i32) -> Result<Choice, AppError> {
        sqlx::query_as::<_, Choice>(
            "SELECT id, question_id, choice_text, is_correct FROM choices WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| not_found("choice"))
    }

    async fn delete_quiz(&mut self, id: i32) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("quiz"));
        }
        Ok(())
    }

    async fn lock_user_participation(&mut self, user_id: i32) -> Result<(), AppError> {
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_last_participation_time(
        &mut self,
        user_id: i32,
    ) -> Result<Option<ParticipationTime>, AppError> {
        let row = sqlx::query_as::<_, ParticipationTime>(
            r#"
            SELECT id, participation_number, user_id, quiz_id, started_at, finished_at
            FROM quiz_participation_times
            WHERE user_id = $1
            ORDER BY participation_number DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn delete_participation_time(&mut self, id: i32) -> Result<(), AppError> {
        sqlx::query("DELETE FROM quiz_participation_times WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn finish_participation_time(
        &mut self,
        id: i32,
        finished_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE quiz_participation_times SET finished_at = $1 WHERE id = $2")
            .bind(finished_at)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("participation"));
        }
        Ok(())
    }

    async fn add_participation_time(
        &mut self,
        user_id: i32,
        quiz_id: i32,
        participation_number: i32,
        started_at: DateTime<Utc>,
    ) -> Result<ParticipationTime, AppError> {
        let row = sqlx::query_as::<_, ParticipationTime>(
            r#"
            INSERT INTO quiz_participation_times (user_id, quiz_id, participation_number, started_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, participation_number, user_id, quiz_id, started_at, finished_at
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .bind(participation_number)
        .bind(started_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn get_finished_participation_time(
        &mut self,
        user_id: i32,
        quiz_id: i32,
    ) -> Result<Option<ParticipationTime>, AppError> {
        let row = sqlx::query_as::<_, ParticipationTime>(
            r#"
            SELECT id, participation_number, user_id, quiz_id, started_at, finished_at
            FROM quiz_participation_times
            WHERE user_id = $1 AND quiz_id = $2 AND finished_at IS NOT NULL
            ORDER BY participation_number DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn remove_user_choice_answers(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM choice_answers WHERE question_id = $1 AND user_id = $2")
            .bind(question_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn add_user_choice_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
        choice_id: i32,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO choice_answers (user_id, question_id, choice_id) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(question_id)
            .bind(choice_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn remove_user_text_answers(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM text_answers WHERE question_id = $1 AND user_id = $2")
            .bind(question_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn add_user_text_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
        text: &str,
    ) -> Result<(), AppError> {
        sqlx::query("INSERT INTO text_answers (user_id, question_id, text_answer) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(question_id)
            .bind(text)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn get_user_choice_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<Option<ChoiceAnswer>, AppError> {
        let row = sqlx::query_as::<_, ChoiceAnswer>(
            r#"
            SELECT user_id, question_id, choice_id, answered_at
            FROM choice_answers
            WHERE user_id = $1 AND question_id = $2
            "#,
        )
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn get_user_text_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<Option<TextAnswer>, AppError> {
        let row = sqlx::query_as::<_, TextAnswer>(
            r#"
            SELECT user_id, question_id, text_answer, answered_at
            FROM text_answers
            WHERE user_id = $1 AND question_id = $2
            "#,
        )
        .bind(user_id)
        .bind(question_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn upsert_user_score(
        &mut self,
        user_id: i32,
        quiz_id: i32,
        score: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_quiz_scores (user_id, quiz_id, score, last_update_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, quiz_id) DO UPDATE SET
                score = EXCLUDED.score,
                last_update_time = EXCLUDED.last_update_time
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .bind(score)
        .bind(updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert user score: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;
        Ok(())
    }

    async fn get_user_score(
        &mut self,
        user_id: i32,
        quiz_id: i32,
    ) -> Result<Option<UserQuizScore>, AppError> {
        let row = sqlx::query_as::<_, UserQuizScore>(
            r#"
            SELECT user_id, quiz_id, score, last_update_time
            FROM user_quiz_scores
            WHERE user_id = $1 AND quiz_id = $2
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn get_quiz_statistics(
        &mut self,
        quiz_ids: &[i32],
    ) -> Result<Vec<QuizStatistics>, AppError> {
        let rows = sqlx::query_as::<_, StatisticsRow>(
            r#"
            SELECT quiz_id, total_attempts, average_score, average_completion_seconds
            FROM quiz_statistics
            WHERE quiz_id = ANY($1)
            "#,
        )
        .bind(quiz_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(QuizStatistics::from).collect())
    }
}
