use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use tracing::{debug, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{message, project},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMessage {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

/// Per-project conversation between client and contractor.
#[derive(Clone)]
pub struct MessageService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl MessageService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(project_id = %project_id, sender_id = %sender_id))]
    pub async fn post_message(
        &self,
        project_id: Uuid,
        sender_id: Uuid,
        input: NewMessage,
    ) -> Result<message::Model, ServiceError> {
        input.validate()?;
        let content = input.content.trim();
        if content.is_empty() {
            return Err(ServiceError::ValidationError(
                "Message content must not be blank".into(),
            ));
        }

        let project = self.load_project(project_id).await?;
        if !project.is_party(sender_id) {
            return Err(ServiceError::Forbidden(
                "Only the project's client or contractor can post messages".into(),
            ));
        }

        let created = message::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            sender_id: Set(sender_id),
            content: Set(content.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        debug!(message_id = %created.id, "message posted");
        self.event_sender
            .send_or_log(Event::MessagePosted {
                message_id: created.id,
                project_id,
            })
            .await;
        Ok(created)
    }

    /// Messages of a project, oldest first. Parties only.
    pub async fn list_messages(
        &self,
        project_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Vec<message::Model>, ServiceError> {
        let project = self.load_project(project_id).await?;
        if !project.is_party(viewer_id) {
            return Err(ServiceError::Forbidden(
                "Only the project's client or contractor can read messages".into(),
            ));
        }
        Ok(message::Entity::find()
            .filter(message::Column::ProjectId.eq(project_id))
            .order_by_asc(message::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn load_project(&self, project_id: Uuid) -> Result<project::Model, ServiceError> {
        project::Entity::find_by_id(project_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Project", project_id))
    }
}
