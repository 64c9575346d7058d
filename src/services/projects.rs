//! Project lifecycle state machine.
//!
//! ```text
//! Draft --publish--> Open --select_contractor--> InProgress --submit--> Submitted
//!                                                  Rejected --submit--> Submitted
//! Submitted --accept--> Completed
//! Submitted --reject--> Rejected
//! ```
//!
//! Every transition loads the project inside one transaction, checks its
//! guards against the stored state and writes the new state before commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use serde::Deserialize;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    db::{supports_row_locks, DbPool},
    entities::{project, submission_version, user, ProjectStatus, UserRole},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        issues::has_open_issues,
        ledger::{ArtifactLedger, SubmissionArtifact, SubmissionLedger},
    },
    storage::{BlobStore, Upload},
};

/// Blob namespace for deliverables.
pub const SUBMISSION_NAMESPACE: &str = "submissions";

/// Guarded lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Publish,
    SelectContractor,
    Submit,
    Accept,
    Reject,
}

/// Target state of `transition` from `current`, or `InvalidState`.
pub fn next_status(
    current: ProjectStatus,
    transition: Transition,
) -> Result<ProjectStatus, ServiceError> {
    use ProjectStatus::*;
    use Transition::*;

    let next = match (current, transition) {
        (Draft, Publish) => Some(Open),
        (Open, SelectContractor) => Some(InProgress),
        (InProgress | Rejected, Submit) => Some(Submitted),
        (Submitted, Accept) => Some(Completed),
        (Submitted, Reject) => Some(Rejected),
        (Draft | Open | InProgress | Submitted | Completed | Rejected, _) => None,
    };

    next.ok_or_else(|| {
        ServiceError::InvalidState(format!(
            "Cannot {:?} a project that is {}",
            transition, current
        ))
    })
}

/// Open status and, when a deadline is set, `now` not past it.
pub fn is_open_for_bidding(project: &project::Model, now: DateTime<Utc>) -> bool {
    project.status == ProjectStatus::Open && project.deadline.map_or(true, |d| now <= d)
}

fn validate_budget(budget: &Decimal) -> Result<(), ValidationError> {
    if budget.is_sign_negative() {
        let mut err = ValidationError::new("budget");
        err.message = Some("Budget cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Input for a new project
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProject {
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(custom = "validate_budget")]
    pub budget: Option<Decimal>,
    pub deadline: Option<DateTime<Utc>>,
    /// `false` keeps the project as an unpublished draft.
    #[serde(default = "default_publish")]
    pub publish: bool,
}

fn default_publish() -> bool {
    true
}

/// Narrow edit of descriptive fields. Status changes only through transitions.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProjectPatch {
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_budget")]
    pub budget: Option<Decimal>,
    /// Absent leaves the deadline as is; `null` clears it.
    #[serde(default, with = "::serde_with::rust::double_option")]
    pub deadline: Option<Option<DateTime<Utc>>>,
}

/// Where a deliverable comes from.
#[derive(Debug, Clone)]
pub enum SubmissionSource {
    /// A locator supplied directly by the contractor.
    Url(String),
    /// File content persisted through the blob store. Any media type.
    Upload(Upload),
}

#[derive(Clone)]
pub struct ProjectService {
    db: Arc<DbPool>,
    blob_store: Arc<dyn BlobStore>,
    event_sender: EventSender,
}

impl ProjectService {
    pub fn new(db: Arc<DbPool>, blob_store: Arc<dyn BlobStore>, event_sender: EventSender) -> Self {
        Self {
            db,
            blob_store,
            event_sender,
        }
    }

    /// Creates a project owned by `client_id`, open unless `publish` is false.
    #[instrument(skip(self, input), fields(client_id = %client_id))]
    pub async fn create_project(
        &self,
        client_id: Uuid,
        input: NewProject,
    ) -> Result<project::Model, ServiceError> {
        input.validate()?;

        let client = user::Entity::find_by_id(client_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", client_id))?;
        if client.role != UserRole::Client {
            return Err(ServiceError::Forbidden(
                "Only clients can create projects".into(),
            ));
        }

        let status = if input.publish {
            ProjectStatus::Open
        } else {
            ProjectStatus::Draft
        };
        let now = Utc::now();

        let created = project::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(input.title.trim().to_string()),
            description: Set(input.description),
            budget: Set(input.budget),
            status: Set(status),
            client_id: Set(client_id),
            contractor_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            completed_at: Set(None),
            rejection_reason: Set(None),
            submission_file_url: Set(None),
            deadline: Set(input.deadline),
        }
        .insert(&*self.db)
        .await?;

        info!(project_id = %created.id, %status, "project created");
        self.event_sender
            .send_or_log(Event::ProjectCreated {
                project_id: created.id,
                client_id,
                status,
            })
            .await;
        Ok(created)
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<project::Model, ServiceError> {
        project::Entity::find_by_id(project_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Project", project_id))
    }

    /// Moves a draft to open. Client only.
    #[instrument(skip(self), fields(project_id = %project_id, actor_id = %actor_id))]
    pub async fn publish(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
    ) -> Result<project::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_for_update(&txn, project_id).await?;
        require_client(&current, actor_id)?;
        let next = next_status(current.status, Transition::Publish)?;

        let mut active: project::ActiveModel = current.clone().into();
        active.status = Set(next);
        self.finish(txn, &current, active, actor_id).await
    }

    /// Assigns the contractor and starts work. Client only; the contractor
    /// reference is written exactly once here.
    #[instrument(skip(self), fields(project_id = %project_id, actor_id = %actor_id, contractor_id = %contractor_id))]
    pub async fn select_contractor(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        contractor_id: Uuid,
    ) -> Result<project::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_for_update(&txn, project_id).await?;
        require_client(&current, actor_id)?;
        let next = next_status(current.status, Transition::SelectContractor)?;

        let contractor = user::Entity::find_by_id(contractor_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", contractor_id))?;
        if contractor.role != UserRole::Contractor {
            return Err(ServiceError::ValidationError(format!(
                "User {} is not a contractor",
                contractor_id
            )));
        }

        let mut active: project::ActiveModel = current.clone().into();
        active.status = Set(next);
        active.contractor_id = Set(Some(contractor_id));
        self.finish(txn, &current, active, actor_id).await
    }

    /// Records a deliverable as the next submission version. Contractor only.
    ///
    /// Uploaded content is written to the blob store before the transaction
    /// commits; a storage failure leaves the project untouched.
    #[instrument(skip(self, source), fields(project_id = %project_id, actor_id = %actor_id))]
    pub async fn submit(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        source: SubmissionSource,
    ) -> Result<project::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_for_update(&txn, project_id).await?;
        if current.contractor_id != Some(actor_id) {
            return Err(ServiceError::Forbidden(
                "Only the selected contractor can submit deliverables".into(),
            ));
        }
        let next = next_status(current.status, Transition::Submit)?;

        let locator = match source {
            SubmissionSource::Url(url) => {
                let url = url.trim().to_string();
                if url.is_empty() {
                    return Err(ServiceError::ValidationError(
                        "Submission locator must not be empty".into(),
                    ));
                }
                url
            }
            SubmissionSource::Upload(upload) => {
                if upload.bytes.is_empty() {
                    return Err(ServiceError::ValidationError(
                        "Uploaded file is empty".into(),
                    ));
                }
                self.blob_store
                    .store(SUBMISSION_NAMESPACE, &upload.filename, upload.bytes)
                    .await?
            }
        };

        let version = SubmissionLedger::append_version(
            &txn,
            project_id,
            SubmissionArtifact {
                submit_url: locator.clone(),
            },
        )
        .await?;

        let mut active: project::ActiveModel = current.clone().into();
        active.status = Set(next);
        active.submission_file_url = Set(Some(locator));
        active.rejection_reason = Set(None);
        let updated = self.finish(txn, &current, active, actor_id).await?;

        self.event_sender
            .send_or_log(Event::SubmissionRecorded {
                project_id,
                version: version.version,
            })
            .await;
        Ok(updated)
    }

    /// Completes the project. Client only; blocked while issues are open.
    #[instrument(skip(self), fields(project_id = %project_id, actor_id = %actor_id))]
    pub async fn accept(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
    ) -> Result<project::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_for_update(&txn, project_id).await?;
        require_client(&current, actor_id)?;
        let next = next_status(current.status, Transition::Accept)?;

        if has_open_issues(&txn, project_id).await? {
            return Err(ServiceError::InvalidState(
                "Resolve all open issues before accepting the submission".into(),
            ));
        }

        let mut active: project::ActiveModel = current.clone().into();
        active.status = Set(next);
        active.completed_at = Set(Some(Utc::now()));
        self.finish(txn, &current, active, actor_id).await
    }

    /// Sends the submission back with a reason. Client only.
    #[instrument(skip(self, reason), fields(project_id = %project_id, actor_id = %actor_id))]
    pub async fn reject(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        reason: &str,
    ) -> Result<project::Model, ServiceError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "A rejection reason is required".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let current = load_for_update(&txn, project_id).await?;
        require_client(&current, actor_id)?;
        let next = next_status(current.status, Transition::Reject)?;

        let mut active: project::ActiveModel = current.clone().into();
        active.status = Set(next);
        active.rejection_reason = Set(Some(reason.to_string()));
        active.submission_file_url = Set(None);
        self.finish(txn, &current, active, actor_id).await
    }

    /// Edits title, description, budget or deadline. Client only.
    #[instrument(skip(self, patch), fields(project_id = %project_id, actor_id = %actor_id))]
    pub async fn update_project_details(
        &self,
        project_id: Uuid,
        actor_id: Uuid,
        patch: ProjectPatch,
    ) -> Result<project::Model, ServiceError> {
        patch.validate()?;

        let txn = self.db.begin().await?;
        let current = load_for_update(&txn, project_id).await?;
        require_client(&current, actor_id)?;
        if current.status.is_terminal() {
            return Err(ServiceError::InvalidState(
                "Completed projects cannot be edited".into(),
            ));
        }

        let mut active: project::ActiveModel = current.into();
        if let Some(title) = patch.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(budget) = patch.budget {
            active.budget = Set(Some(budget));
        }
        if let Some(deadline) = patch.deadline {
            active.deadline = Set(deadline);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Projects still accepting bids, newest first, with the total count.
    pub async fn list_open_projects(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<project::Model>, u64), ServiceError> {
        let now = Utc::now();
        let paginator = project::Entity::find()
            .filter(project::Column::Status.eq(ProjectStatus::Open))
            .filter(
                Condition::any()
                    .add(project::Column::Deadline.is_null())
                    .add(project::Column::Deadline.gt(now)),
            )
            .order_by_desc(project::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    /// Projects where the user is client or contractor, newest first.
    pub async fn list_user_projects(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<project::Model>, ServiceError> {
        Ok(project::Entity::find()
            .filter(
                Condition::any()
                    .add(project::Column::ClientId.eq(user_id))
                    .add(project::Column::ContractorId.eq(user_id)),
            )
            .order_by_desc(project::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Full submission history, oldest first.
    pub async fn list_submissions(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<submission_version::Model>, ServiceError> {
        self.get_project(project_id).await?;
        SubmissionLedger::list_versions(&*self.db, project_id).await
    }

    /// Persists the transition, commits and reports it.
    async fn finish(
        &self,
        txn: DatabaseTransaction,
        before: &project::Model,
        mut active: project::ActiveModel,
        actor_id: Uuid,
    ) -> Result<project::Model, ServiceError> {
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;
        txn.commit().await.map_err(|e| {
            error!(project_id = %before.id, error = %e, "failed to commit transition");
            ServiceError::DatabaseError(e)
        })?;

        counter!(
            "freelance_project_transitions_total",
            1,
            "to" => updated.status.to_string()
        );
        info!(
            project_id = %updated.id,
            from = %before.status,
            to = %updated.status,
            "project transitioned"
        );
        self.event_sender
            .send_or_log(Event::ProjectStatusChanged {
                project_id: updated.id,
                old_status: before.status,
                new_status: updated.status,
                actor_id,
            })
            .await;
        Ok(updated)
    }
}

/// Loads a project, holding its row lock until the transaction ends on
/// backends that support one.
pub(crate) async fn load_for_update<C: ConnectionTrait>(
    conn: &C,
    project_id: Uuid,
) -> Result<project::Model, ServiceError> {
    let mut query = project::Entity::find_by_id(project_id);
    if supports_row_locks(conn.get_database_backend()) {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Project", project_id))
}

fn require_client(project: &project::Model, actor_id: Uuid) -> Result<(), ServiceError> {
    if project.client_id != actor_id {
        return Err(ServiceError::Forbidden(
            "Only the project's client can perform this action".into(),
        ));
    }
    Ok(())
}
