use super::{Answer, Question, QuestionEdit, QuestionRepository};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    questions: HashMap<String, Question>,
    answers: HashMap<String, Answer>,
}

impl Tables {
    fn question_mut(&mut self, id: &str) -> Result<&mut Question> {
        self.questions.get_mut(id).ok_or_else(|| Error::NotFound {
            entity: "question",
            id: id.to_string(),
        })
    }

    /// The answer, provided it belongs to `question_id`.
    fn answer_of(&self, question_id: &str, answer_id: &str) -> Result<&Answer> {
        self.answers
            .get(answer_id)
            .filter(|answer| answer.question_id == question_id)
            .ok_or_else(|| Error::NotFound {
                entity: "answer",
                id: answer_id.to_string(),
            })
    }
}

/// Question store kept in process memory.
///
/// One lock guards both tables so each method behaves like a transaction.
#[derive(Debug, Default)]
pub struct InMemoryQuestionRepository {
    tables: Mutex<Tables>,
}

impl InMemoryQuestionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn answers_of(&self, question_id: &str) -> Vec<Answer> {
        let tables = self.tables.lock().await;
        let mut answers: Vec<Answer> = tables
            .answers
            .values()
            .filter(|answer| answer.question_id == question_id)
            .cloned()
            .collect();
        answers.sort_by_key(|answer| answer.created_at);
        answers
    }
}

#[async_trait]
impl QuestionRepository for InMemoryQuestionRepository {
    async fn insert_question(&self, question: Question) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.questions.contains_key(&question.id) {
            return Err(Error::Conflict(format!(
                "question '{}' already exists",
                question.id
            )));
        }
        tables.questions.insert(question.id.clone(), question);
        Ok(())
    }

    async fn get_question(&self, id: &str) -> Result<Question> {
        let mut tables = self.tables.lock().await;
        tables.question_mut(id).map(|question| question.clone())
    }

    async fn update_question(&self, id: &str, edit: QuestionEdit) -> Result<Question> {
        let mut tables = self.tables.lock().await;
        let question = tables.question_mut(id)?;
        question.title = edit.title;
        question.content = edit.content;
        question.tags = edit.tags;
        question.updated_at = Some(Utc::now());
        Ok(question.clone())
    }

    async fn delete_question(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.questions.remove(id).is_none() {
            return Err(Error::NotFound {
                entity: "question",
                id: id.to_string(),
            });
        }
        tables.answers.retain(|_, answer| answer.question_id != id);
        Ok(())
    }

    async fn insert_answer(&self, answer: Answer) -> Result<i32> {
        let mut tables = self.tables.lock().await;
        let question = tables.question_mut(&answer.question_id)?;
        question.answer_count += 1;
        let count = question.answer_count;
        tables.answers.insert(answer.id.clone(), answer);
        Ok(count)
    }

    async fn delete_answer(&self, question_id: &str, answer_id: &str) -> Result<i32> {
        let mut tables = self.tables.lock().await;
        tables.question_mut(question_id)?;
        if tables.answer_of(question_id, answer_id)?.accepted {
            return Err(Error::Conflict(
                "cannot delete an accepted answer".to_string(),
            ));
        }

        tables.answers.remove(answer_id);
        let question = tables.question_mut(question_id)?;
        question.answer_count -= 1;
        Ok(question.answer_count)
    }

    async fn accept_answer(&self, question_id: &str, answer_id: &str) -> Result<Answer> {
        let mut tables = self.tables.lock().await;
        if tables.question_mut(question_id)?.has_accepted_answer {
            return Err(Error::Conflict(
                "question already has an accepted answer".to_string(),
            ));
        }
        if tables.answer_of(question_id, answer_id)?.accepted {
            return Err(Error::Conflict("answer has already been accepted".to_string()));
        }

        let now = Utc::now();
        let question = tables.question_mut(question_id)?;
        question.has_accepted_answer = true;
        question.updated_at = Some(now);

        let answer = tables
            .answers
            .get_mut(answer_id)
            .ok_or_else(|| Error::NotFound {
                entity: "answer",
                id: answer_id.to_string(),
            })?;
        answer.accepted = true;
        answer.updated_at = Some(now);
        Ok(answer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            title: "How?".to_string(),
            content: "Like this".to_string(),
            tags: vec![],
            created_at: Utc::now(),
            updated_at: None,
            answer_count: 0,
            has_accepted_answer: false,
        }
    }

    fn answer(id: &str, question_id: &str) -> Answer {
        Answer {
            id: id.to_string(),
            question_id: question_id.to_string(),
            content: "Try this".to_string(),
            accepted: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_answer_counts_follow_inserts_and_deletes() {
        let repo = InMemoryQuestionRepository::new();
        repo.insert_question(question("q1")).await.unwrap();

        assert_eq!(repo.insert_answer(answer("a1", "q1")).await.unwrap(), 1);
        assert_eq!(repo.insert_answer(answer("a2", "q1")).await.unwrap(), 2);
        assert_eq!(repo.delete_answer("q1", "a1").await.unwrap(), 1);
        assert_eq!(repo.get_question("q1").await.unwrap().answer_count, 1);
    }

    #[tokio::test]
    async fn test_answer_must_belong_to_question() {
        let repo = InMemoryQuestionRepository::new();
        repo.insert_question(question("q1")).await.unwrap();
        repo.insert_question(question("q2")).await.unwrap();
        repo.insert_answer(answer("a1", "q1")).await.unwrap();

        let err = repo.accept_answer("q2", "a1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "answer", .. }));
        let err = repo.delete_answer("q2", "a1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "answer", .. }));
    }

    #[tokio::test]
    async fn test_accepted_answer_is_final() {
        let repo = InMemoryQuestionRepository::new();
        repo.insert_question(question("q1")).await.unwrap();
        repo.insert_answer(answer("a1", "q1")).await.unwrap();
        repo.insert_answer(answer("a2", "q1")).await.unwrap();

        assert!(repo.accept_answer("q1", "a1").await.unwrap().accepted);
        assert!(matches!(
            repo.accept_answer("q1", "a2").await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            repo.delete_answer("q1", "a1").await,
            Err(Error::Conflict(_))
        ));
        assert_eq!(repo.get_question("q1").await.unwrap().answer_count, 2);
    }

    #[tokio::test]
    async fn test_delete_question_removes_answers() {
        let repo = InMemoryQuestionRepository::new();
        repo.insert_question(question("q1")).await.unwrap();
        repo.insert_answer(answer("a1", "q1")).await.unwrap();

        repo.delete_question("q1").await.unwrap();

        assert!(repo.answers_of("q1").await.is_empty());
        assert!(matches!(
            repo.delete_question("q1").await,
            Err(Error::NotFound { .. })
        ));
    }
}
