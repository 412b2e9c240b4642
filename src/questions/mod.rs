//! The authoritative question store and the mutations that publish events.

pub mod memory;
pub mod service;

pub use memory::InMemoryQuestionRepository;
pub use service::QuestionService;

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub answer_count: i32,
    pub has_accepted_answer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: String,
    pub question_id: String,
    pub content: String,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// New title, content and tags for an existing question.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionEdit {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// Storage for questions and answers.
///
/// Every mutating method is one transaction: it either applies completely
/// and returns the committed state, or fails and changes nothing. Missing
/// rows surface as `Error::NotFound`, rule violations as `Error::Conflict`.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn insert_question(&self, question: Question) -> Result<()>;

    async fn get_question(&self, id: &str) -> Result<Question>;

    async fn update_question(&self, id: &str, edit: QuestionEdit) -> Result<Question>;

    /// Removes the question together with its answers.
    async fn delete_question(&self, id: &str) -> Result<()>;

    /// Stores the answer and returns the question's new answer count.
    async fn insert_answer(&self, answer: Answer) -> Result<i32>;

    /// Removes a non-accepted answer and returns the new answer count.
    async fn delete_answer(&self, question_id: &str, answer_id: &str) -> Result<i32>;

    /// Marks the answer and its question as accepted. A question accepts at
    /// most one answer.
    async fn accept_answer(&self, question_id: &str, answer_id: &str) -> Result<Answer>;
}
