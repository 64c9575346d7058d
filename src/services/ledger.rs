//! Append-only version history for uploaded artifacts.
//!
//! Every parent (a project for submissions, a proposal for its PDF) owns a
//! gap-free version sequence starting at 1. Records are never updated; the
//! current artifact is the one with the highest version. Appends are meant to
//! run inside the transaction of the lifecycle change they accompany.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::supports_row_locks,
    entities::{project, proposal, proposal_file, submission_version},
    errors::ServiceError,
    services::users::map_unique_violation,
};

/// Highest recorded version for a parent, 0 when it has none.
async fn max_version<E, C>(
    conn: &C,
    parent_column: E::Column,
    version_column: E::Column,
    parent_id: Uuid,
) -> Result<i32, DbErr>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let max: Option<Option<i32>> = E::find()
        .select_only()
        .column_as(version_column.max(), "max_version")
        .filter(parent_column.eq(parent_id))
        .into_tuple()
        .one(conn)
        .await?;
    Ok(max.flatten().unwrap_or(0))
}

/// Versioned history of one artifact kind.
#[async_trait]
pub trait ArtifactLedger {
    /// What the caller supplies for a new version.
    type Artifact: Send + 'static;
    /// The stored version record.
    type Record: Send;

    /// Locks the parent row (where the backend supports it) and records
    /// `artifact` as version `max + 1`.
    async fn append_version<C>(
        conn: &C,
        parent_id: Uuid,
        artifact: Self::Artifact,
    ) -> Result<Self::Record, ServiceError>
    where
        C: ConnectionTrait;

    /// All versions, ascending.
    async fn list_versions<C>(conn: &C, parent_id: Uuid) -> Result<Vec<Self::Record>, ServiceError>
    where
        C: ConnectionTrait;

    /// Highest version, if any.
    async fn latest_version<C>(
        conn: &C,
        parent_id: Uuid,
    ) -> Result<Option<Self::Record>, ServiceError>
    where
        C: ConnectionTrait;
}

/// Deliverable submissions of a project.
pub struct SubmissionLedger;

#[derive(Debug, Clone)]
pub struct SubmissionArtifact {
    pub submit_url: String,
}

#[async_trait]
impl ArtifactLedger for SubmissionLedger {
    type Artifact = SubmissionArtifact;
    type Record = submission_version::Model;

    async fn append_version<C>(
        conn: &C,
        parent_id: Uuid,
        artifact: Self::Artifact,
    ) -> Result<Self::Record, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut parent = project::Entity::find_by_id(parent_id);
        if supports_row_locks(conn.get_database_backend()) {
            parent = parent.lock_exclusive();
        }
        parent
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Project", parent_id))?;

        let version = max_version::<submission_version::Entity, _>(
            conn,
            submission_version::Column::ProjectId,
            submission_version::Column::Version,
            parent_id,
        )
        .await?
            + 1;

        let record = submission_version::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(parent_id),
            version: Set(version),
            submit_url: Set(artifact.submit_url),
            created_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .map_err(|e| map_unique_violation(e, "Submission version"))?;

        counter!("freelance_ledger_appends_total", 1, "ledger" => "submission");
        debug!(project_id = %parent_id, version, "submission version appended");
        Ok(record)
    }

    async fn list_versions<C>(conn: &C, parent_id: Uuid) -> Result<Vec<Self::Record>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(submission_version::Entity::find()
            .filter(submission_version::Column::ProjectId.eq(parent_id))
            .order_by_asc(submission_version::Column::Version)
            .all(conn)
            .await?)
    }

    async fn latest_version<C>(
        conn: &C,
        parent_id: Uuid,
    ) -> Result<Option<Self::Record>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(submission_version::Entity::find()
            .filter(submission_version::Column::ProjectId.eq(parent_id))
            .order_by_desc(submission_version::Column::Version)
            .one(conn)
            .await?)
    }
}

/// PDF attachments of a proposal.
pub struct ProposalFileLedger;

#[derive(Debug, Clone)]
pub struct ProposalFileArtifact {
    pub original_filename: String,
    pub stored_path: String,
}

#[async_trait]
impl ArtifactLedger for ProposalFileLedger {
    type Artifact = ProposalFileArtifact;
    type Record = proposal_file::Model;

    async fn append_version<C>(
        conn: &C,
        parent_id: Uuid,
        artifact: Self::Artifact,
    ) -> Result<Self::Record, ServiceError>
    where
        C: ConnectionTrait,
    {
        let mut parent = proposal::Entity::find_by_id(parent_id);
        if supports_row_locks(conn.get_database_backend()) {
            parent = parent.lock_exclusive();
        }
        parent
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Proposal", parent_id))?;

        let version = max_version::<proposal_file::Entity, _>(
            conn,
            proposal_file::Column::ProposalId,
            proposal_file::Column::Version,
            parent_id,
        )
        .await?
            + 1;

        let record = proposal_file::ActiveModel {
            id: Set(Uuid::new_v4()),
            proposal_id: Set(parent_id),
            version: Set(version),
            original_filename: Set(artifact.original_filename),
            stored_path: Set(artifact.stored_path),
            uploaded_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .map_err(|e| map_unique_violation(e, "Proposal file version"))?;

        counter!("freelance_ledger_appends_total", 1, "ledger" => "proposal_file");
        debug!(proposal_id = %parent_id, version, "proposal file version appended");
        Ok(record)
    }

    async fn list_versions<C>(conn: &C, parent_id: Uuid) -> Result<Vec<Self::Record>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(proposal_file::Entity::find()
            .filter(proposal_file::Column::ProposalId.eq(parent_id))
            .order_by_asc(proposal_file::Column::Version)
            .all(conn)
            .await?)
    }

    async fn latest_version<C>(
        conn: &C,
        parent_id: Uuid,
    ) -> Result<Option<Self::Record>, ServiceError>
    where
        C: ConnectionTrait,
    {
        Ok(proposal_file::Entity::find()
            .filter(proposal_file::Column::ProposalId.eq(parent_id))
            .order_by_desc(proposal_file::Column::Version)
            .one(conn)
            .await?)
    }
}
