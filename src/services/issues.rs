use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{issue, issue_comment, project, IssueStatus, ProjectStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::projects::load_for_update,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewIssue {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

/// True while any issue on the project is still open. Guards acceptance.
pub async fn has_open_issues<C>(conn: &C, project_id: Uuid) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let open = issue::Entity::find()
        .filter(issue::Column::ProjectId.eq(project_id))
        .filter(issue::Column::Status.eq(IssueStatus::Open))
        .count(conn)
        .await?;
    Ok(open > 0)
}

async fn load_project<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<project::Model, ServiceError> {
    project::Entity::find_by_id(project_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Project", project_id))
}

/// Issue tracker for submitted deliverables.
#[derive(Clone)]
pub struct IssueService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl IssueService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Opens an issue; only while the project awaits review.
    #[instrument(skip(self, input), fields(project_id = %project_id, creator_id = %creator_id))]
    pub async fn create_issue(
        &self,
        project_id: Uuid,
        creator_id: Uuid,
        input: NewIssue,
    ) -> Result<issue::Model, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let project = load_for_update(&txn, project_id).await?;

        if !project.is_party(creator_id) {
            return Err(ServiceError::Forbidden(
                "Only the project's client or contractor can raise issues".into(),
            ));
        }
        if project.status != ProjectStatus::Submitted {
            return Err(ServiceError::InvalidState(format!(
                "Issues can only be raised on submitted projects (status is {})",
                project.status
            )));
        }

        let created = issue::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            title: Set(input.title),
            description: Set(input.description),
            status: Set(IssueStatus::Open),
            created_by_id: Set(creator_id),
            created_at: Set(Utc::now()),
            resolved_at: Set(None),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        info!(issue_id = %created.id, "issue opened");
        self.event_sender
            .send_or_log(Event::IssueOpened {
                issue_id: created.id,
                project_id,
            })
            .await;
        Ok(created)
    }

    /// Resolves an issue; only the project's client may do so.
    #[instrument(skip(self), fields(issue_id = %issue_id, resolver_id = %resolver_id))]
    pub async fn resolve_issue(
        &self,
        issue_id: Uuid,
        resolver_id: Uuid,
    ) -> Result<issue::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let found = self.load_issue(&txn, issue_id).await?;
        let project = load_for_update(&txn, found.project_id).await?;

        if project.client_id != resolver_id {
            return Err(ServiceError::Forbidden(
                "Only the project's client can resolve issues".into(),
            ));
        }
        if found.status == IssueStatus::Resolved {
            return Err(ServiceError::InvalidState("Issue is already resolved".into()));
        }

        let project_id = found.project_id;
        let mut active: issue::ActiveModel = found.into();
        active.status = Set(IssueStatus::Resolved);
        active.resolved_at = Set(Some(Utc::now()));
        let updated = active.update(&txn).await?;
        txn.commit().await?;

        info!("issue resolved");
        self.event_sender
            .send_or_log(Event::IssueResolved {
                issue_id,
                project_id,
            })
            .await;
        Ok(updated)
    }

    pub async fn get_issue(&self, issue_id: Uuid) -> Result<issue::Model, ServiceError> {
        self.load_issue(&*self.db, issue_id).await
    }

    /// Issues of a project in creation order.
    pub async fn list_issues(&self, project_id: Uuid) -> Result<Vec<issue::Model>, ServiceError> {
        load_project(&*self.db, project_id).await?;
        Ok(issue::Entity::find()
            .filter(issue::Column::ProjectId.eq(project_id))
            .order_by_asc(issue::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Appends a comment from either project party.
    #[instrument(skip(self, input), fields(issue_id = %issue_id, sender_id = %sender_id))]
    pub async fn add_comment(
        &self,
        issue_id: Uuid,
        sender_id: Uuid,
        input: NewComment,
    ) -> Result<issue_comment::Model, ServiceError> {
        input.validate()?;
        let found = self.load_issue(&*self.db, issue_id).await?;
        let project = load_project(&*self.db, found.project_id).await?;
        if !project.is_party(sender_id) {
            return Err(ServiceError::Forbidden(
                "Only the project's client or contractor can comment".into(),
            ));
        }

        Ok(issue_comment::ActiveModel {
            id: Set(Uuid::new_v4()),
            issue_id: Set(issue_id),
            sender_id: Set(sender_id),
            content: Set(input.content),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?)
    }

    /// Comments of an issue in creation order.
    pub async fn list_comments(
        &self,
        issue_id: Uuid,
    ) -> Result<Vec<issue_comment::Model>, ServiceError> {
        self.load_issue(&*self.db, issue_id).await?;
        Ok(issue_comment::Entity::find()
            .filter(issue_comment::Column::IssueId.eq(issue_id))
            .order_by_asc(issue_comment::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn load_issue<C: ConnectionTrait>(
        &self,
        conn: &C,
        issue_id: Uuid,
    ) -> Result<issue::Model, ServiceError> {
        issue::Entity::find_by_id(issue_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Issue", issue_id))
    }
}
