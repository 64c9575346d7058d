use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::ProjectStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends and logs a failure instead of returning it.
    /// Events are informational; a closed channel never fails a request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "domain event dropped");
        }
    }
}

/// Domain events emitted after a committed change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered(Uuid),
    ProjectCreated {
        project_id: Uuid,
        client_id: Uuid,
        status: ProjectStatus,
    },
    ProjectStatusChanged {
        project_id: Uuid,
        old_status: ProjectStatus,
        new_status: ProjectStatus,
        actor_id: Uuid,
    },
    SubmissionRecorded {
        project_id: Uuid,
        version: i32,
    },
    ProposalCreated {
        proposal_id: Uuid,
        project_id: Uuid,
        contractor_id: Uuid,
    },
    ProposalFileAttached {
        proposal_id: Uuid,
        version: i32,
    },
    IssueOpened {
        issue_id: Uuid,
        project_id: Uuid,
    },
    IssueResolved {
        issue_id: Uuid,
        project_id: Uuid,
    },
    RatingSubmitted {
        project_id: Uuid,
        rater_id: Uuid,
        rated_user_id: Uuid,
    },
    MessagePosted {
        message_id: Uuid,
        project_id: Uuid,
    },
}

/// Creates the bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging every event until all senders drop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::ProjectStatusChanged {
                project_id,
                old_status,
                new_status,
                actor_id,
            } => {
                info!(
                    %project_id,
                    %old_status,
                    %new_status,
                    %actor_id,
                    "project status changed"
                );
            }
            Event::SubmissionRecorded {
                project_id,
                version,
            } => {
                info!(%project_id, version, "submission recorded");
            }
            Event::IssueOpened {
                issue_id,
                project_id,
            } => {
                info!(%issue_id, %project_id, "issue opened; acceptance blocked");
            }
            other => {
                info!(event = ?other, "domain event");
            }
        }
    }

    info!("Event processing loop stopped");
}
