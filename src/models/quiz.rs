// src/models/quiz.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Represents the 'categories' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i32,
    pub name: String,
}

/// One row of the quiz <-> category join.
#[derive(Debug, Clone, Copy, FromRow, PartialEq, Eq)]
pub struct QuizCategory {
    pub quiz_id: i32,
    pub category_id: i32,
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i32,
    /// Null once the author account has been deleted.
    pub author_id: Option<i32>,
    pub title: String,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Question kind. Stored as 'choice' or 'text'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Answered by picking exactly one of the question's choices.
    Choice,
    /// Answered with free text compared to a single right answer.
    Text,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Choice => "choice",
            QuestionType::Text => "text",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "choice" => Ok(QuestionType::Choice),
            "text" => Ok(QuestionType::Text),
            other => Err(AppError::InternalServerError(format!(
                "unknown question type '{}'",
                other
            ))),
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: i32,
    pub quiz_id: i32,
    pub question_text: String,
    pub question_type: QuestionType,
}

/// Represents the 'choices' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    pub id: i32,
    pub question_id: i32,
    pub choice_text: String,
    pub is_correct: bool,
}

/// The single right answer of a text question.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextQuestionAnswer {
    pub question_id: i32,
    pub right_answer: String,
}

/// Read model backing the quiz listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizStatistics {
    pub quiz_id: i32,
    pub total_attempts: i64,
    /// Mean of the stored scores, as a fraction in [0, 1].
    pub average_score: f64,
    /// `HH:MM:SS`; hours keep counting past a day.
    pub average_completion_time: String,
}

/// DTO for authoring a quiz.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    /// Category identifiers, as sent by the form.
    #[validate(length(min = 1, message = "invalid category"))]
    pub categories: Vec<String>,
    #[validate(
        length(min = 1, message = "invalid question count"),
        custom(function = validate_questions)
    )]
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub choices: Vec<ChoiceDraft>,
    #[serde(default)]
    pub right_answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceDraft {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// A choice question needs choices with exactly one marked correct;
/// a text question needs its right answer.
fn validate_questions(questions: &[QuestionDraft]) -> Result<(), validator::ValidationError> {
    for question in questions {
        if question.text.is_empty() || question.text.len() > 1000 {
            return Err(validator::ValidationError::new("invalid_question_text"));
        }
        match question.question_type {
            QuestionType::Choice => {
                if question.choices.is_empty() {
                    return Err(validator::ValidationError::new("invalid_choice_count"));
                }
                if question.choices.iter().any(|c| c.text.is_empty() || c.text.len() > 500) {
                    return Err(validator::ValidationError::new("invalid_choice_text"));
                }
                if question.choices.iter().filter(|c| c.is_correct).count() != 1 {
                    return Err(validator::ValidationError::new("exactly_one_correct_choice"));
                }
            }
            QuestionType::Text => {
                if question.right_answer.is_none() {
                    return Err(validator::ValidationError::new("missing_right_answer"));
                }
            }
        }
    }
    Ok(())
}
