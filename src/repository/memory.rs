// src/repository/memory.rs

//! In-process quiz store.
//!
//! A transaction holds the store lock for its whole lifetime and works on a
//! copy of the data, so transactions are fully serialised and a dropped
//! transaction leaves no trace. Used as a fake in tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

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

#[derive(Debug, Clone, Default)]
struct MemoryData {
    last_id: i32,
    categories: BTreeMap<i32, Category>,
    quizzes: BTreeMap<i32, Quiz>,
    quiz_categories: Vec<QuizCategory>,
    questions: BTreeMap<i32, Question>,
    text_question_answers: HashMap<i32, TextQuestionAnswer>,
    choices: BTreeMap<i32, Choice>,
    participation_times: BTreeMap<i32, ParticipationTime>,
    choice_answers: HashMap<(i32, i32), ChoiceAnswer>,
    text_answers: HashMap<(i32, i32), TextAnswer>,
    scores: HashMap<(i32, i32), UserQuizScore>,
    accounts: HashMap<i32, Session>,
}

impl MemoryData {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn statistics_for(&self, quiz_id: i32) -> Option<QuizStatistics> {
        let finished: Vec<i64> = self
            .participation_times
            .values()
            .filter(|p| p.quiz_id == quiz_id)
            .filter_map(|p| p.elapsed())
            .map(|elapsed| elapsed.num_milliseconds())
            .collect();
        let scores: Vec<f64> = self
            .scores
            .values()
            .filter(|s| s.quiz_id == quiz_id)
            .map(|s| s.score)
            .collect();

        if finished.is_empty() && scores.is_empty() {
            return None;
        }

        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let average_completion_time = if finished.is_empty() {
            format_clock(0)
        } else {
            let average_ms = finished.iter().sum::<i64>() / finished.len() as i64;
            format_clock(average_ms / 1_000)
        };

        Some(QuizStatistics {
            quiz_id,
            total_attempts: finished.len() as i64,
            average_score,
            average_completion_time,
        })
    }

    fn remove_quiz(&mut self, quiz_id: i32) -> bool {
        if self.quizzes.remove(&quiz_id).is_none() {
            return false;
        }

        let question_ids: Vec<i32> = self
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .map(|q| q.id)
            .collect();

        self.quiz_categories.retain(|qc| qc.quiz_id != quiz_id);
        self.questions.retain(|_, q| q.quiz_id != quiz_id);
        self.choices
            .retain(|_, c| !question_ids.contains(&c.question_id));
        self.text_question_answers
            .retain(|question_id, _| !question_ids.contains(question_id));
        self.choice_answers
            .retain(|(_, question_id), _| !question_ids.contains(question_id));
        self.text_answers
            .retain(|(_, question_id), _| !question_ids.contains(question_id));
        self.participation_times.retain(|_, p| p.quiz_id != quiz_id);
        self.scores.retain(|(_, q), _| *q != quiz_id);
        true
    }
}

/// Shared handle to the in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_category(&self, name: &str) -> Category {
        let mut data = self.data.lock().await;
        let category = Category {
            id: data.next_id(),
            name: name.to_string(),
        };
        data.categories.insert(category.id, category.clone());
        category
    }

    /// Registers (or replaces) an account that tokens can resolve to.
    pub async fn add_account(&self, user_id: i32, username: &str, permissions: Permissions) {
        self.data.lock().await.accounts.insert(
            user_id,
            Session {
                user_id,
                username: username.to_string(),
                permissions,
            },
        );
    }

    pub async fn set_permissions(&self, user_id: i32, permissions: Permissions) {
        if let Some(account) = self.data.lock().await.accounts.get_mut(&user_id) {
            account.permissions = permissions;
        }
    }

    pub async fn remove_account(&self, user_id: i32) {
        self.data.lock().await.accounts.remove(&user_id);
    }

    /// Every participation row of a user, ordered by participation number.
    pub async fn participation_times(&self, user_id: i32) -> Vec<ParticipationTime> {
        let data = self.data.lock().await;
        let mut rows: Vec<ParticipationTime> = data
            .participation_times
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.participation_number);
        rows
    }

    pub async fn score(&self, user_id: i32, quiz_id: i32) -> Option<UserQuizScore> {
        self.data.lock().await.scores.get(&(user_id, quiz_id)).cloned()
    }

    /// Number of stored answer rows (choice and text) of a user.
    pub async fn answer_count(&self, user_id: i32) -> usize {
        let data = self.data.lock().await;
        data.choice_answers.keys().filter(|(u, _)| *u == user_id).count()
            + data.text_answers.keys().filter(|(u, _)| *u == user_id).count()
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AppError> {
        let guard = self.data.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, work }))
    }
}

#[async_trait]
impl SessionDirectory for MemoryStore {
    async fn find_session(&self, user_id: i32) -> Result<Option<Session>, AppError> {
        Ok(self.data.lock().await.accounts.get(&user_id).cloned())
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryData>,
    work: MemoryData,
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{} not found", what))
}

fn constraint(name: &str) -> AppError {
    AppError::InternalServerError(format!("constraint violated: {}", name))
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTransaction { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl QuizRepository for MemoryTransaction {
    async fn get_all_categories(&mut self) -> Result<Vec<Category>, AppError> {
        Ok(self.work.categories.values().cloned().collect())
    }

    async fn get_categories_pairs(
        &mut self,
        quiz_ids: &[i32],
    ) -> Result<Vec<QuizCategory>, AppError> {
        let mut pairs: Vec<QuizCategory> = self
            .work
            .quiz_categories
            .iter()
            .filter(|qc| quiz_ids.contains(&qc.quiz_id))
            .copied()
            .collect();
        pairs.sort_by_key(|qc| (qc.quiz_id, qc.category_id));
        Ok(pairs)
    }

    async fn get_all_quizzes(&mut self, category_id: Option<i32>) -> Result<Vec<Quiz>, AppError> {
        let quizzes = self
            .work
            .quizzes
            .values()
            .filter(|quiz| match category_id {
                None => true,
                Some(category_id) => self
                    .work
                    .quiz_categories
                    .iter()
                    .any(|qc| qc.quiz_id == quiz.id && qc.category_id == category_id),
            })
            .cloned()
            .collect();
        Ok(quizzes)
    }

    async fn add_quiz(
        &mut self,
        title: &str,
        description: &str,
        author_id: i32,
    ) -> Result<i32, AppError> {
        let now = Utc::now();
        let id = self.work.next_id();
        self.work.quizzes.insert(
            id,
            Quiz {
                id,
                author_id: Some(author_id),
                title: title.to_string(),
                description: Some(description.to_string()),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn add_quiz_categories(
        &mut self,
        quiz_id: i32,
        category_ids: &[i32],
    ) -> Result<(), AppError> {
        if !self.work.quizzes.contains_key(&quiz_id) {
            return Err(constraint("quiz_categories_quiz_id_fkey"));
        }
        for &category_id in category_ids {
            if !self.work.categories.contains_key(&category_id) {
                return Err(not_found("category"));
            }
            let pair = QuizCategory {
                quiz_id,
                category_id,
            };
            if !self.work.quiz_categories.contains(&pair) {
                self.work.quiz_categories.push(pair);
            }
        }
        Ok(())
    }

    async fn add_question(
        &mut self,
        quiz_id: i32,
        text: &str,
        question_type: QuestionType,
    ) -> Result<i32, AppError> {
        if !self.work.quizzes.contains_key(&quiz_id) {
            return Err(constraint("questions_quiz_id_fkey"));
        }
        let id = self.work.next_id();
        self.work.questions.insert(
            id,
            Question {
                id,
                quiz_id,
                question_text: text.to_string(),
                question_type,
            },
        );
        Ok(id)
    }

    async fn add_text_question_answer(
        &mut self,
        question_id: i32,
        answer: &str,
    ) -> Result<(), AppError> {
        if !self.work.questions.contains_key(&question_id) {
            return Err(constraint("text_question_answers_question_id_fkey"));
        }
        if self.work.text_question_answers.contains_key(&question_id) {
            return Err(constraint("text_question_answers_pkey"));
        }
        self.work.text_question_answers.insert(
            question_id,
            TextQuestionAnswer {
                question_id,
                right_answer: answer.to_string(),
            },
        );
        Ok(())
    }

    async fn add_choice(
        &mut self,
        question_id: i32,
        text: &str,
        is_correct: bool,
    ) -> Result<i32, AppError> {
        if !self.work.questions.contains_key(&question_id) {
            return Err(constraint("choices_question_id_fkey"));
        }
        if is_correct
            && self
                .work
                .choices
                .values()
                .any(|c| c.question_id == question_id && c.is_correct)
        {
            return Err(constraint("choices_single_correct"));
        }
        let id = self.work.next_id();
        self.work.choices.insert(
            id,
            Choice {
                id,
                question_id,
                choice_text: text.to_string(),
                is_correct,
            },
        );
        Ok(id)
    }

    async fn get_quiz(&mut self, id: i32) -> Result<Quiz, AppError> {
        self.work
            .quizzes
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("quiz"))
    }

    async fn get_quiz_questions(&mut self, quiz_id: i32) -> Result<Vec<Question>, AppError> {
        Ok(self
            .work
            .questions
            .values()
            .filter(|q| q.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn get_text_question_answer(
        &mut self,
        question_id: i32,
    ) -> Result<TextQuestionAnswer, AppError> {
        self.work
            .text_question_answers
            .get(&question_id)
            .cloned()
            .ok_or_else(|| not_found("right answer"))
    }

    async fn get_choices(&mut self, question_id: i32) -> Result<Vec<Choice>, AppError> {
        Ok(self
            .work
            .choices
            .values()
            .filter(|c| c.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn get_correct_choice(&mut self, question_id: i32) -> Result<Choice, AppError> {
        self.work
            .choices
            .values()
            .find(|c| c.question_id == question_id && c.is_correct)
            .cloned()
            .ok_or_else(|| not_found("correct choice"))
    }

    async fn get_choice(&mut self, id: i32) -> Result<Choice, AppError> {
        self.work
            .choices
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("choice"))
    }

    async fn delete_quiz(&mut self, id: i32) -> Result<(), AppError> {
        if self.work.remove_quiz(id) {
            Ok(())
        } else {
            Err(not_found("quiz"))
        }
    }

    async fn lock_user_participation(&mut self, _user_id: i32) -> Result<(), AppError> {
        // The store lock is already held for the whole transaction.
        Ok(())
    }

    async fn get_last_participation_time(
        &mut self,
        user_id: i32,
    ) -> Result<Option<ParticipationTime>, AppError> {
        Ok(self
            .work
            .participation_times
            .values()
            .filter(|p| p.user_id == user_id)
            .max_by_key(|p| p.participation_number)
            .cloned())
    }

    async fn delete_participation_time(&mut self, id: i32) -> Result<(), AppError> {
        self.work.participation_times.remove(&id);
        Ok(())
    }

    async fn finish_participation_time(
        &mut self,
        id: i32,
        finished_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let row = self
            .work
            .participation_times
            .get_mut(&id)
            .ok_or_else(|| not_found("participation"))?;
        row.finished_at = Some(finished_at);
        Ok(())
    }

    async fn add_participation_time(
        &mut self,
        user_id: i32,
        quiz_id: i32,
        participation_number: i32,
        started_at: DateTime<Utc>,
    ) -> Result<ParticipationTime, AppError> {
        if !self.work.quizzes.contains_key(&quiz_id) {
            return Err(constraint("quiz_participation_times_quiz_id_fkey"));
        }
        for existing in self.work.participation_times.values() {
            if existing.user_id != user_id {
                continue;
            }
            if existing.participation_number == participation_number {
                return Err(constraint(
                    "quiz_participation_times_user_id_participation_number_key",
                ));
            }
            if !existing.is_finished() {
                return Err(constraint("quiz_participation_times_one_open"));
            }
        }

        let row = ParticipationTime {
            id: self.work.next_id(),
            participation_number,
            user_id,
            quiz_id,
            started_at,
            finished_at: None,
        };
        self.work.participation_times.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_finished_participation_time(
        &mut self,
        user_id: i32,
        quiz_id: i32,
    ) -> Result<Option<ParticipationTime>, AppError> {
        Ok(self
            .work
            .participation_times
            .values()
            .filter(|p| p.user_id == user_id && p.quiz_id == quiz_id && p.is_finished())
            .max_by_key(|p| p.participation_number)
            .cloned())
    }

    async fn remove_user_choice_answers(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<(), AppError> {
        self.work.choice_answers.remove(&(user_id, question_id));
        Ok(())
    }

    async fn add_user_choice_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
        choice_id: i32,
    ) -> Result<(), AppError> {
        if !self.work.choices.contains_key(&choice_id) {
            return Err(constraint("choice_answers_choice_id_fkey"));
        }
        if self.work.choice_answers.contains_key(&(user_id, question_id)) {
            return Err(constraint("choice_answers_pkey"));
        }
        self.work.choice_answers.insert(
            (user_id, question_id),
            ChoiceAnswer {
                user_id,
                question_id,
                choice_id: Some(choice_id),
                answered_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn remove_user_text_answers(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<(), AppError> {
        self.work.text_answers.remove(&(user_id, question_id));
        Ok(())
    }

    async fn add_user_text_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
        text: &str,
    ) -> Result<(), AppError> {
        if self.work.text_answers.contains_key(&(user_id, question_id)) {
            return Err(constraint("text_answers_pkey"));
        }
        self.work.text_answers.insert(
            (user_id, question_id),
            TextAnswer {
                user_id,
                question_id,
                text_answer: Some(text.to_string()),
                answered_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_user_choice_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<Option<ChoiceAnswer>, AppError> {
        Ok(self.work.choice_answers.get(&(user_id, question_id)).cloned())
    }

    async fn get_user_text_answer(
        &mut self,
        user_id: i32,
        question_id: i32,
    ) -> Result<Option<TextAnswer>, AppError> {
        Ok(self.work.text_answers.get(&(user_id, question_id)).cloned())
    }

    async fn upsert_user_score(
        &mut self,
        user_id: i32,
        quiz_id: i32,
        score: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !(0.0..=1.0).contains(&score) {
            return Err(constraint("user_quiz_scores_score_check"));
        }
        self.work.scores.insert(
            (user_id, quiz_id),
            UserQuizScore {
                user_id,
                quiz_id,
                score,
                last_update_time: updated_at,
            },
        );
        Ok(())
    }

    async fn get_user_score(
        &mut self,
        user_id: i32,
        quiz_id: i32,
    ) -> Result<Option<UserQuizScore>, AppError> {
        Ok(self.work.scores.get(&(user_id, quiz_id)).cloned())
    }

    async fn get_quiz_statistics(
        &mut self,
        quiz_ids: &[i32],
    ) -> Result<Vec<QuizStatistics>, AppError> {
        Ok(quiz_ids
            .iter()
            .filter_map(|&quiz_id| self.work.statistics_for(quiz_id))
            .collect())
    }
}
