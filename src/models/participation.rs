// src/models/participation.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    error::AppError,
    models::quiz::{Category, QuestionType},
};

/// Represents the 'quiz_participation_times' table: one attempt of a user at a quiz.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipationTime {
    pub id: i32,
    /// Per-user attempt counter. Strictly increasing, never reused.
    pub participation_number: i32,
    pub user_id: i32,
    pub quiz_id: i32,
    pub started_at: DateTime<Utc>,
    /// Null while the attempt is in progress.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ParticipationTime {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Time between start and finish, if the attempt was finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|finished| finished - self.started_at)
    }
}

/// Represents the 'choice_answers' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChoiceAnswer {
    pub user_id: i32,
    pub question_id: i32,
    pub choice_id: Option<i32>,
    pub answered_at: DateTime<Utc>,
}

/// Represents the 'text_answers' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextAnswer {
    pub user_id: i32,
    pub question_id: i32,
    pub text_answer: Option<String>,
    pub answered_at: DateTime<Utc>,
}

/// Represents the 'user_quiz_scores' table. One row per (user, quiz).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct UserQuizScore {
    pub user_id: i32,
    pub quiz_id: i32,
    /// Fraction of correctly answered questions, in [0, 1].
    pub score: f64,
    pub last_update_time: DateTime<Utc>,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub quiz_id: i32,

    /// User's answers map.
    /// Key: Question ID (as sent by the form)
    /// Value: choice ID as text, or free text
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

/// A submission with its question keys already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub quiz_id: i32,
    pub answers: HashMap<i32, String>,
}

impl TryFrom<SubmitAttemptRequest> for Submission {
    type Error = AppError;

    fn try_from(req: SubmitAttemptRequest) -> Result<Self, Self::Error> {
        let answers = req
            .answers
            .into_iter()
            .map(|(key, value)| {
                key.trim()
                    .parse::<i32>()
                    .map(|question_id| (question_id, value))
                    .map_err(|_| AppError::BadRequest(format!("invalid question id '{}'", key)))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Submission {
            quiz_id: req.quiz_id,
            answers,
        })
    }
}

/// A choice as shown to a participant. Correctness is never exposed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicChoice {
    pub id: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptQuestion {
    pub id: i32,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<PublicChoice>,
}

/// Everything needed to render an attempt in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptView {
    pub quiz_id: i32,
    pub title: String,
    pub description: String,
    pub participation_number: i32,
    pub started_at: DateTime<Utc>,
    pub questions: Vec<AttemptQuestion>,
}

/// Summary returned after a submission has been scored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionOutcome {
    pub quiz_id: i32,
    pub correct_count: usize,
    pub total_questions: usize,
    /// Fraction in [0, 1].
    pub score: f64,
    /// `%.2f%%` rendering of the score.
    pub score_display: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnsweredQuestion {
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub right_answer: String,
    /// None when the question was left unanswered.
    pub user_answer: Option<String>,
    pub is_correct: bool,
}

/// Reconstructed result of the user's latest finished attempt at a quiz.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizResult {
    pub quiz_id: i32,
    pub title: String,
    pub description: String,
    /// `%.2f%%`
    pub score: String,
    /// `HH:MM:SS:mmmm`
    pub time: String,
    pub questions: Vec<AnsweredQuestion>,
}

/// One entry of the quiz listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizSummary {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub total_attempts: i64,
    pub average_score: String,
    pub average_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizListing {
    pub categories: Vec<Category>,
    pub current_category: Option<i32>,
    pub quizzes: Vec<QuizSummary>,
}

/// Query parameters for the quiz listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuizzesParams {
    pub category_id: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_keys_are_parsed_on_entry() {
        let req = SubmitAttemptRequest {
            quiz_id: 3,
            answers: HashMap::from([
                ("10".to_string(), "41".to_string()),
                ("11".to_string(), "Paris".to_string()),
            ]),
        };

        let submission = Submission::try_from(req).unwrap();
        assert_eq!(submission.quiz_id, 3);
        assert_eq!(submission.answers.get(&10).map(String::as_str), Some("41"));
        assert_eq!(submission.answers.get(&11).map(String::as_str), Some("Paris"));
    }

    #[test]
    fn non_numeric_question_key_is_invalid_input() {
        let req = SubmitAttemptRequest {
            quiz_id: 3,
            answers: HashMap::from([("q1".to_string(), "41".to_string())]),
        };

        assert!(matches!(Submission::try_from(req), Err(AppError::BadRequest(_))));
    }
}
