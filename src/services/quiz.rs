// src/services/quiz.rs

//! Quiz participation and scoring.
//!
//! Each public operation runs in exactly one transaction: it either commits
//! every write it made or none of them.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        participation::{
            AnsweredQuestion, AttemptQuestion, AttemptView, PublicChoice, QuizListing, QuizResult,
            QuizSummary, Submission, SubmissionOutcome,
        },
        quiz::{Category, Choice, CreateQuizRequest, QuestionType},
    },
    repository::{QuizRepository, TransactionManager},
    utils::{
        format::{format_elapsed, format_percentage},
        jwt::Session,
    },
};

/// Shown for quizzes nobody has taken yet.
const NO_SCORE: &str = "0%";
const NO_TIME: &str = "00:00:00";

/// A chosen choice is right when it is the question's correct choice.
pub fn choice_matches(correct: &Choice, chosen: i32) -> bool {
    correct.id == chosen
}

/// Text answers must match exactly: case-sensitive, whitespace included.
pub fn text_matches(right_answer: &str, given: &str) -> bool {
    right_answer == given
}

#[derive(Clone)]
pub struct QuizService {
    transactions: Arc<dyn TransactionManager>,
}

impl QuizService {
    pub fn new(transactions: Arc<dyn TransactionManager>) -> Self {
        Self { transactions }
    }

    /// Starts a new attempt at `quiz_id`, or resumes the one in progress.
    pub async fn start_or_resume_attempt(
        &self,
        session: &Session,
        quiz_id: i32,
    ) -> Result<AttemptView, AppError> {
        let mut tx = self.transactions.begin().await?;
        let view = start_or_resume(tx.as_mut(), session.user_id, quiz_id, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(
            "User {} is on attempt #{} of quiz {}",
            session.user_id,
            view.participation_number,
            quiz_id
        );
        Ok(view)
    }

    /// Finishes the caller's current attempt and scores it.
    pub async fn submit_attempt(
        &self,
        session: &Session,
        submission: Submission,
    ) -> Result<SubmissionOutcome, AppError> {
        let mut tx = self.transactions.begin().await?;
        let outcome = submit(tx.as_mut(), session.user_id, &submission, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(
            "User {} scored {}/{} on quiz {}",
            session.user_id,
            outcome.correct_count,
            outcome.total_questions,
            outcome.quiz_id
        );
        Ok(outcome)
    }

    /// `None` until the caller has a stored score for the quiz.
    pub async fn get_result(
        &self,
        session: &Session,
        quiz_id: i32,
    ) -> Result<Option<QuizResult>, AppError> {
        let mut tx = self.transactions.begin().await?;
        let result = reconstruct_result(tx.as_mut(), session.user_id, quiz_id).await?;
        tx.commit().await?;
        Ok(result)
    }

    pub async fn list_quizzes(&self, category_id: Option<i32>) -> Result<QuizListing, AppError> {
        let mut tx = self.transactions.begin().await?;
        let listing = list(tx.as_mut(), category_id).await?;
        tx.commit().await?;
        Ok(listing)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        let mut tx = self.transactions.begin().await?;
        let categories = tx.get_all_categories().await?;
        tx.commit().await?;
        Ok(categories)
    }

    /// Inserts a quiz with its categories, questions, choices and right answers.
    pub async fn create_quiz(
        &self,
        session: &Session,
        req: CreateQuizRequest,
    ) -> Result<i32, AppError> {
        req.validate()?;

        let category_ids = req
            .categories
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<i32>()
                    .map_err(|_| AppError::BadRequest(format!("invalid category '{}'", raw)))
            })
            .collect::<Result<Vec<i32>, AppError>>()?;

        let mut tx = self.transactions.begin().await?;

        let quiz_id = tx
            .add_quiz(&req.title, &req.description, session.user_id)
            .await?;
        tx.add_quiz_categories(quiz_id, &category_ids).await?;

        for draft in &req.questions {
            let question_id = tx
                .add_question(quiz_id, &draft.text, draft.question_type)
                .await?;

            match draft.question_type {
                QuestionType::Text => {
                    let right_answer = draft
                        .right_answer
                        .as_deref()
                        .ok_or_else(|| AppError::BadRequest("missing right answer".to_string()))?;
                    tx.add_text_question_answer(question_id, right_answer).await?;
                }
                QuestionType::Choice => {
                    for choice in &draft.choices {
                        tx.add_choice(question_id, &choice.text, choice.is_correct)
                            .await?;
                    }
                }
            }
        }

        tx.commit().await?;

        tracing::info!("User {} created quiz {}", session.user_id, quiz_id);
        Ok(quiz_id)
    }

    pub async fn delete_quiz(&self, quiz_id: i32) -> Result<(), AppError> {
        let mut tx = self.transactions.begin().await?;
        tx.delete_quiz(quiz_id).await?;
        tx.commit().await?;

        tracing::info!("Quiz {} deleted", quiz_id);
        Ok(())
    }
}

async fn start_or_resume<R>(
    repo: &mut R,
    user_id: i32,
    quiz_id: i32,
    now: DateTime<Utc>,
) -> Result<AttemptView, AppError>
where
    R: QuizRepository + ?Sized,
{
    repo.lock_user_participation(user_id).await?;
    let quiz = repo.get_quiz(quiz_id).await?;

    let attempt = match repo.get_last_participation_time(user_id).await? {
        None => repo.add_participation_time(user_id, quiz_id, 1, now).await?,
        Some(latest) if !latest.is_finished() && latest.quiz_id == quiz_id => latest,
        Some(latest) => {
            // Computed before the stale row goes away, so its number is never handed out again.
            let next_number = latest.participation_number + 1;
            if !latest.is_finished() {
                tracing::info!(
                    "User {} abandoned attempt #{} of quiz {}",
                    user_id,
                    latest.participation_number,
                    latest.quiz_id
                );
                repo.delete_participation_time(latest.id).await?;
            }
            repo.add_participation_time(user_id, quiz_id, next_number, now)
                .await?
        }
    };

    let mut questions = Vec::new();
    for question in repo.get_quiz_questions(quiz_id).await? {
        let choices = match question.question_type {
            QuestionType::Choice => repo
                .get_choices(question.id)
                .await?
                .into_iter()
                .map(|c| PublicChoice {
                    id: c.id,
                    text: c.choice_text,
                })
                .collect(),
            QuestionType::Text => Vec::new(),
        };

        questions.push(AttemptQuestion {
            id: question.id,
            text: question.question_text,
            question_type: question.question_type,
            choices,
        });
    }

    Ok(AttemptView {
        quiz_id: quiz.id,
        title: quiz.title,
        description: quiz.description.unwrap_or_default(),
        participation_number: attempt.participation_number,
        started_at: attempt.started_at,
        questions,
    })
}

async fn submit<R>(
    repo: &mut R,
    user_id: i32,
    submission: &Submission,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome, AppError>
where
    R: QuizRepository + ?Sized,
{
    repo.lock_user_participation(user_id).await?;

    let attempt = repo
        .get_last_participation_time(user_id)
        .await?
        .ok_or_else(|| AppError::InvalidState("no attempt to submit".to_string()))?;

    if attempt.quiz_id != submission.quiz_id {
        return Err(AppError::InvalidState(format!(
            "current attempt is for quiz {}, not {}",
            attempt.quiz_id, submission.quiz_id
        )));
    }

    let questions = repo.get_quiz_questions(submission.quiz_id).await?;
    if questions.is_empty() {
        return Err(AppError::InternalServerError(
            "division undefined: quiz has no questions".to_string(),
        ));
    }

    repo.finish_participation_time(attempt.id, now).await?;

    // The stored answers must describe this attempt only, unanswered questions included.
    for question in &questions {
        match question.question_type {
            QuestionType::Choice => repo.remove_user_choice_answers(user_id, question.id).await?,
            QuestionType::Text => repo.remove_user_text_answers(user_id, question.id).await?,
        }
    }

    let mut correct_count = 0;
    for question in &questions {
        // Unanswered questions simply count as wrong.
        let Some(answer) = submission.answers.get(&question.id) else {
            continue;
        };

        match question.question_type {
            QuestionType::Choice => {
                let chosen = answer.trim().parse::<i32>().map_err(|_| {
                    AppError::BadRequest(format!(
                        "answer to question {} is not a choice id",
                        question.id
                    ))
                })?;

                let choices = repo.get_choices(question.id).await?;
                if !choices.iter().any(|c| c.id == chosen) {
                    return Err(AppError::BadRequest(format!(
                        "choice {} does not belong to question {}",
                        chosen, question.id
                    )));
                }

                let correct = repo.get_correct_choice(question.id).await?;
                if choice_matches(&correct, chosen) {
                    correct_count += 1;
                }

                repo.add_user_choice_answer(user_id, question.id, chosen)
                    .await?;
            }
            QuestionType::Text => {
                let right = repo.get_text_question_answer(question.id).await?;
                if text_matches(&right.right_answer, answer) {
                    correct_count += 1;
                }

                repo.add_user_text_answer(user_id, question.id, answer)
                    .await?;
            }
        }
    }

    let total_questions = questions.len();
    let score = correct_count as f64 / total_questions as f64;
    repo.upsert_user_score(user_id, submission.quiz_id, score, now)
        .await?;

    Ok(SubmissionOutcome {
        quiz_id: submission.quiz_id,
        correct_count,
        total_questions,
        score,
        score_display: format_percentage(score),
    })
}

async fn reconstruct_result<R>(
    repo: &mut R,
    user_id: i32,
    quiz_id: i32,
) -> Result<Option<QuizResult>, AppError>
where
    R: QuizRepository + ?Sized,
{
    let Some(score) = repo.get_user_score(user_id, quiz_id).await? else {
        return Ok(None);
    };

    let quiz = repo.get_quiz(quiz_id).await?;

    let elapsed = repo
        .get_finished_participation_time(user_id, quiz_id)
        .await?
        .and_then(|attempt| attempt.elapsed())
        .ok_or_else(|| {
            AppError::InternalServerError(format!(
                "score without a finished attempt for user {} quiz {}",
                user_id, quiz_id
            ))
        })?;

    let mut questions = Vec::new();
    for question in repo.get_quiz_questions(quiz_id).await? {
        let answered = match question.question_type {
            QuestionType::Choice => {
                let correct = repo.get_correct_choice(question.id).await?;
                let chosen = repo
                    .get_user_choice_answer(user_id, question.id)
                    .await?
                    .and_then(|answer| answer.choice_id);

                let (user_answer, is_correct) = match chosen {
                    Some(choice_id) => {
                        let choice = repo.get_choice(choice_id).await?;
                        (Some(choice.choice_text), choice_matches(&correct, choice_id))
                    }
                    None => (None, false),
                };

                AnsweredQuestion {
                    text: question.question_text,
                    question_type: question.question_type,
                    right_answer: correct.choice_text,
                    user_answer,
                    is_correct,
                }
            }
            QuestionType::Text => {
                let right = repo.get_text_question_answer(question.id).await?;
                let user_answer = repo
                    .get_user_text_answer(user_id, question.id)
                    .await?
                    .and_then(|answer| answer.text_answer);
                let is_correct = user_answer
                    .as_deref()
                    .is_some_and(|given| text_matches(&right.right_answer, given));

                AnsweredQuestion {
                    text: question.question_text,
                    question_type: question.question_type,
                    right_answer: right.right_answer,
                    user_answer,
                    is_correct,
                }
            }
        };
        questions.push(answered);
    }

    Ok(Some(QuizResult {
        quiz_id: quiz.id,
        title: quiz.title,
        description: quiz.description.unwrap_or_default(),
        score: format_percentage(score.score),
        time: format_elapsed(elapsed),
        questions,
    }))
}

async fn list<R>(repo: &mut R, category_id: Option<i32>) -> Result<QuizListing, AppError>
where
    R: QuizRepository + ?Sized,
{
    let categories = repo.get_all_categories().await?;
    let quizzes = repo.get_all_quizzes(category_id).await?;

    let quiz_ids: Vec<i32> = quizzes.iter().map(|q| q.id).collect();
    let pairs = repo.get_categories_pairs(&quiz_ids).await?;
    let stats: HashMap<i32, _> = repo
        .get_quiz_statistics(&quiz_ids)
        .await?
        .into_iter()
        .map(|s| (s.quiz_id, s))
        .collect();

    let names: HashMap<i32, &str> = categories
        .iter()
        .map(|c| (c.id, c.name.as_str()))
        .collect();

    let summaries = quizzes
        .into_iter()
        .map(|quiz| {
            let quiz_categories = pairs
                .iter()
                .filter(|p| p.quiz_id == quiz.id)
                .filter_map(|p| names.get(&p.category_id).map(|name| name.to_string()))
                .collect();

            let (total_attempts, average_score, average_time) = match stats.get(&quiz.id) {
                Some(s) => (
                    s.total_attempts,
                    format_percentage(s.average_score),
                    s.average_completion_time.clone(),
                ),
                None => (0, NO_SCORE.to_string(), NO_TIME.to_string()),
            };

            QuizSummary {
                id: quiz.id,
                title: quiz.title,
                description: quiz.description.unwrap_or_default(),
                categories: quiz_categories,
                total_attempts,
                average_score,
                average_time,
            }
        })
        .collect();

    Ok(QuizListing {
        categories,
        current_category: category_id,
        quizzes: summaries,
    })
}
