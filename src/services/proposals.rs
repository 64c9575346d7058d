use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{project, proposal, proposal_file, user, UserRole},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        ledger::{ArtifactLedger, ProposalFileArtifact, ProposalFileLedger},
        projects::{is_open_for_bidding, load_for_update},
    },
    storage::{BlobStore, Upload},
};

/// Blob namespace for proposal attachments.
pub const PROPOSAL_NAMESPACE: &str = "proposals";

#[derive(Debug, Clone, Deserialize)]
pub struct NewProposal {
    pub price: Decimal,
    pub description: Option<String>,
}

/// A proposal together with its current attachment, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalWithFile {
    #[serde(flatten)]
    pub proposal: proposal::Model,
    pub latest_file: Option<proposal_file::Model>,
}

#[derive(Clone)]
pub struct ProposalService {
    db: Arc<DbPool>,
    blob_store: Arc<dyn BlobStore>,
    event_sender: EventSender,
}

impl ProposalService {
    pub fn new(db: Arc<DbPool>, blob_store: Arc<dyn BlobStore>, event_sender: EventSender) -> Self {
        Self {
            db,
            blob_store,
            event_sender,
        }
    }

    /// Places a bid while the project accepts them. An attachment must be a
    /// PDF and becomes version 1 of the proposal's file history.
    #[instrument(skip(self, input, attachment), fields(project_id = %project_id, contractor_id = %contractor_id))]
    pub async fn create_proposal(
        &self,
        project_id: Uuid,
        contractor_id: Uuid,
        input: NewProposal,
        attachment: Option<Upload>,
    ) -> Result<ProposalWithFile, ServiceError> {
        let txn = self.db.begin().await?;
        let project = load_for_update(&txn, project_id).await?;

        let contractor = user::Entity::find_by_id(contractor_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", contractor_id))?;
        if contractor.role != UserRole::Contractor {
            return Err(ServiceError::Forbidden(
                "Only contractors can submit proposals".into(),
            ));
        }

        if input.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price must be greater than zero".into(),
            ));
        }
        if !is_open_for_bidding(&project, Utc::now()) {
            return Err(ServiceError::BiddingClosed(format!(
                "Project {} is not accepting proposals",
                project_id
            )));
        }
        if let Some(upload) = &attachment {
            require_pdf(upload)?;
        }

        let created = proposal::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            contractor_id: Set(contractor_id),
            price: Set(input.price),
            description: Set(input
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let latest_file = match attachment {
            Some(upload) => Some(self.record_attachment(&txn, created.id, upload).await?),
            None => None,
        };
        txn.commit().await?;

        info!(proposal_id = %created.id, "proposal created");
        self.event_sender
            .send_or_log(Event::ProposalCreated {
                proposal_id: created.id,
                project_id,
                contractor_id,
            })
            .await;
        if let Some(file) = &latest_file {
            self.announce_file(file).await;
        }

        Ok(ProposalWithFile {
            proposal: created,
            latest_file,
        })
    }

    /// Uploads a further PDF version for a proposal. Owner only, and only
    /// while the project still accepts bids.
    #[instrument(skip(self, attachment), fields(proposal_id = %proposal_id, contractor_id = %contractor_id))]
    pub async fn attach_proposal_file(
        &self,
        proposal_id: Uuid,
        contractor_id: Uuid,
        attachment: Upload,
    ) -> Result<proposal_file::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let found = find_proposal(&txn, proposal_id).await?;
        if found.contractor_id != contractor_id {
            return Err(ServiceError::Forbidden(
                "Only the proposal's author can upload files".into(),
            ));
        }

        let project = load_for_update(&txn, found.project_id).await?;
        if !is_open_for_bidding(&project, Utc::now()) {
            return Err(ServiceError::BiddingClosed(format!(
                "Project {} is not accepting proposals",
                project.id
            )));
        }
        require_pdf(&attachment)?;

        let file = self.record_attachment(&txn, proposal_id, attachment).await?;
        txn.commit().await?;

        info!(version = file.version, "proposal file attached");
        self.announce_file(&file).await;
        Ok(file)
    }

    pub async fn get_proposal(&self, proposal_id: Uuid) -> Result<proposal::Model, ServiceError> {
        find_proposal(&*self.db, proposal_id).await
    }

    /// Proposals of a project in creation order, each with its newest file.
    pub async fn list_proposals(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ProposalWithFile>, ServiceError> {
        load_project(&*self.db, project_id).await?;

        let proposals = proposal::Entity::find()
            .filter(proposal::Column::ProjectId.eq(project_id))
            .order_by_asc(proposal::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut result = Vec::with_capacity(proposals.len());
        for p in proposals {
            let latest_file = ProposalFileLedger::latest_version(&*self.db, p.id).await?;
            result.push(ProposalWithFile {
                proposal: p,
                latest_file,
            });
        }
        Ok(result)
    }

    /// File history of a proposal, oldest first.
    pub async fn list_proposal_files(
        &self,
        proposal_id: Uuid,
    ) -> Result<Vec<proposal_file::Model>, ServiceError> {
        self.get_proposal(proposal_id).await?;
        ProposalFileLedger::list_versions(&*self.db, proposal_id).await
    }

    async fn record_attachment<C: ConnectionTrait>(
        &self,
        conn: &C,
        proposal_id: Uuid,
        upload: Upload,
    ) -> Result<proposal_file::Model, ServiceError> {
        let original_filename = upload.filename.clone();
        let stored_path = self
            .blob_store
            .store(PROPOSAL_NAMESPACE, &upload.filename, upload.bytes)
            .await?;

        let file = ProposalFileLedger::append_version(
            conn,
            proposal_id,
            ProposalFileArtifact {
                original_filename,
                stored_path,
            },
        )
        .await?;
        Ok(file)
    }

    async fn announce_file(&self, file: &proposal_file::Model) {
        self.event_sender
            .send_or_log(Event::ProposalFileAttached {
                proposal_id: file.proposal_id,
                version: file.version,
            })
            .await;
    }
}

fn require_pdf(upload: &Upload) -> Result<(), ServiceError> {
    if !upload.is_pdf() {
        return Err(ServiceError::ValidationError(
            "Proposal attachments must be PDF files".into(),
        ));
    }
    if upload.bytes.is_empty() {
        return Err(ServiceError::ValidationError(
            "Uploaded file is empty".into(),
        ));
    }
    Ok(())
}

async fn find_proposal<C: ConnectionTrait>(
    conn: &C,
    proposal_id: Uuid,
) -> Result<proposal::Model, ServiceError> {
    proposal::Entity::find_by_id(proposal_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Proposal", proposal_id))
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
