pub mod auth;
pub mod common;
pub mod health;
pub mod issues;
pub mod messages;
pub mod projects;
pub mod proposals;
pub mod ratings;

use std::sync::Arc;

use crate::{
    auth::password::CredentialHasher,
    db::DbPool,
    events::EventSender,
    services::{
        issues::IssueService, messages::MessageService, projects::ProjectService,
        proposals::ProposalService, ratings::RatingService, users::UserService,
    },
    storage::BlobStore,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub projects: Arc<ProjectService>,
    pub proposals: Arc<ProposalService>,
    pub issues: Arc<IssueService>,
    pub ratings: Arc<RatingService>,
    pub messages: Arc<MessageService>,
}

impl AppServices {
    /// Wires every service onto the shared pool, blob store and event channel.
    pub fn new(
        db_pool: Arc<DbPool>,
        hasher: Arc<dyn CredentialHasher>,
        blob_store: Arc<dyn BlobStore>,
        event_sender: EventSender,
    ) -> Self {
        let users = Arc::new(UserService::new(
            db_pool.clone(),
            hasher,
            event_sender.clone(),
        ));
        let projects = Arc::new(ProjectService::new(
            db_pool.clone(),
            blob_store.clone(),
            event_sender.clone(),
        ));
        let proposals = Arc::new(ProposalService::new(
            db_pool.clone(),
            blob_store,
            event_sender.clone(),
        ));
        let issues = Arc::new(IssueService::new(db_pool.clone(), event_sender.clone()));
        let ratings = Arc::new(RatingService::new(db_pool.clone(), event_sender.clone()));
        let messages = Arc::new(MessageService::new(db_pool, event_sender));

        Self {
            users,
            projects,
            proposals,
            issues,
            ratings,
            messages,
        }
    }
}
