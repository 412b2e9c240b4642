use super::{Answer, Question, QuestionEdit, QuestionRepository};
use crate::events::{
    AnswerAccepted, AnswerCountUpdated, DomainEvent, QuestionCreated, QuestionDeleted,
    QuestionUpdated,
};
use crate::publisher::EventPublisher;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Question mutations and the events announcing them.
///
/// Each operation commits to the repository first and publishes after. A
/// refused or failed mutation publishes nothing.
pub struct QuestionService {
    repository: Arc<dyn QuestionRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl QuestionService {
    pub fn new(repository: Arc<dyn QuestionRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    #[instrument(skip(self, content))]
    pub async fn create_question(
        &self,
        title: &str,
        content: &str,
        tags: Vec<String>,
    ) -> Result<Question> {
        let question = Question {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            tags,
            created_at: Utc::now(),
            updated_at: None,
            answer_count: 0,
            has_accepted_answer: false,
        };
        self.repository.insert_question(question.clone()).await?;
        info!(question_id = %question.id, "Question created");

        self.announce(DomainEvent::QuestionCreated(QuestionCreated {
            question_id: question.id.clone(),
            title: question.title.clone(),
            content: question.content.clone(),
            created_at: question.created_at,
            tags: question.tags.clone(),
        }))
        .await?;
        Ok(question)
    }

    #[instrument(skip(self, content))]
    pub async fn update_question(
        &self,
        id: &str,
        title: &str,
        content: &str,
        tags: Vec<String>,
    ) -> Result<Question> {
        let edit = QuestionEdit {
            title: title.to_string(),
            content: content.to_string(),
            tags,
        };
        let question = self.repository.update_question(id, edit).await?;

        self.announce(DomainEvent::QuestionUpdated(QuestionUpdated {
            question_id: question.id.clone(),
            title: question.title.clone(),
            content: question.content.clone(),
            tags: question.tags.clone(),
        }))
        .await?;
        Ok(question)
    }

    #[instrument(skip(self))]
    pub async fn delete_question(&self, id: &str) -> Result<()> {
        self.repository.delete_question(id).await?;
        info!(question_id = id, "Question deleted");

        self.announce(DomainEvent::QuestionDeleted(QuestionDeleted {
            question_id: id.to_string(),
        }))
        .await
    }

    #[instrument(skip(self, content))]
    pub async fn add_answer(&self, question_id: &str, content: &str) -> Result<Answer> {
        let answer = Answer {
            id: Uuid::new_v4().to_string(),
            question_id: question_id.to_string(),
            content: content.to_string(),
            accepted: false,
            created_at: Utc::now(),
            updated_at: None,
        };
        let answer_count = self.repository.insert_answer(answer.clone()).await?;

        self.announce(DomainEvent::AnswerCountUpdated(AnswerCountUpdated {
            question_id: question_id.to_string(),
            answer_count,
        }))
        .await?;
        Ok(answer)
    }

    #[instrument(skip(self))]
    pub async fn delete_answer(&self, question_id: &str, answer_id: &str) -> Result<()> {
        let answer_count = self
            .repository
            .delete_answer(question_id, answer_id)
            .await?;

        self.announce(DomainEvent::AnswerCountUpdated(AnswerCountUpdated {
            question_id: question_id.to_string(),
            answer_count,
        }))
        .await
    }

    #[instrument(skip(self))]
    pub async fn accept_answer(&self, question_id: &str, answer_id: &str) -> Result<Answer> {
        let answer = self
            .repository
            .accept_answer(question_id, answer_id)
            .await?;
        info!(question_id, answer_id, "Answer accepted");

        self.announce(DomainEvent::AnswerAccepted(AnswerAccepted {
            question_id: question_id.to_string(),
        }))
        .await?;
        Ok(answer)
    }

    async fn announce(&self, event: DomainEvent) -> Result<()> {
        self.publisher.publish(&event).await.map_err(|e| {
            error!(
                event_type = %event.kind(),
                question_id = %event.question_id(),
                error = %e,
                "Mutation committed but its event was not published"
            );
            e
        })
    }
}
