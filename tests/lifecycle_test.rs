mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use freelance_api::{
    entities::{submission_version, user, ProjectStatus, UserRole},
    errors::ServiceError,
    services::{
        issues::NewIssue,
        ledger::{ArtifactLedger, SubmissionArtifact, SubmissionLedger},
        projects::{NewProject, ProjectPatch, SubmissionSource},
        proposals::NewProposal,
        users::map_unique_violation,
    },
    storage::Upload,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, TransactionTrait};

use common::{pdf_upload, TestApp};

fn bid(price: i64) -> NewProposal {
    NewProposal {
        price: Decimal::new(price, 0),
        description: Some("Can start Monday".to_string()),
    }
}

#[tokio::test]
async fn open_project_takes_bids_until_deadline() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let contractor = app.user("contractor", UserRole::Contractor).await;

    let open = app.open_project(&client, None).await;
    let created = app
        .services()
        .proposals
        .create_proposal(open.id, contractor.id, bid(900), Some(pdf_upload("offer.pdf")))
        .await
        .unwrap();
    let file = created.latest_file.expect("attachment recorded");
    assert_eq!(file.version, 1);
    assert!(file.stored_path.starts_with("/static/proposals/"));

    let expired = app
        .open_project(&client, Some(Utc::now() - Duration::hours(1)))
        .await;
    let result = app
        .services()
        .proposals
        .create_proposal(expired.id, contractor.id, bid(900), None)
        .await;
    assert_matches!(result, Err(ServiceError::BiddingClosed(_)));
}

#[tokio::test]
async fn proposal_guards_run_in_order() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let contractor = app.user("contractor", UserRole::Contractor).await;
    let open = app.open_project(&client, None).await;
    let proposals = &app.services().proposals;

    assert_matches!(
        proposals
            .create_proposal(uuid::Uuid::new_v4(), contractor.id, bid(10), None)
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        proposals.create_proposal(open.id, client.id, bid(10), None).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        proposals.create_proposal(open.id, contractor.id, bid(0), None).await,
        Err(ServiceError::ValidationError(_))
    );

    let not_pdf = Upload {
        filename: "offer.docx".to_string(),
        content_type: Some("application/msword".to_string()),
        bytes: bytes::Bytes::from_static(b"doc"),
    };
    assert_matches!(
        proposals
            .create_proposal(open.id, contractor.id, bid(10), Some(not_pdf))
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert!(proposals.list_proposals(open.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn proposal_files_are_versioned() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let contractor = app.user("contractor", UserRole::Contractor).await;
    let rival = app.user("rival", UserRole::Contractor).await;
    let open = app.open_project(&client, None).await;
    let proposals = &app.services().proposals;

    let created = proposals
        .create_proposal(open.id, contractor.id, bid(500), Some(pdf_upload("v1.pdf")))
        .await
        .unwrap();
    let second = proposals
        .attach_proposal_file(created.proposal.id, contractor.id, pdf_upload("v2.pdf"))
        .await
        .unwrap();
    assert_eq!(second.version, 2);

    assert_matches!(
        proposals
            .attach_proposal_file(created.proposal.id, rival.id, pdf_upload("x.pdf"))
            .await,
        Err(ServiceError::Forbidden(_))
    );

    let files = proposals
        .list_proposal_files(created.proposal.id)
        .await
        .unwrap();
    let versions: Vec<i32> = files.iter().map(|f| f.version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert_eq!(files[1].original_filename, "v2.pdf");

    let listed = proposals.list_proposals(open.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].latest_file.as_ref().map(|f| f.version), Some(2));
}

#[tokio::test]
async fn full_review_cycle_reaches_completed() {
    let app = TestApp::new().await;
    let (client, contractor, project) = app.project_in_progress().await;
    assert_eq!(project.status, ProjectStatus::InProgress);
    assert_eq!(project.contractor_id, Some(contractor.id));
    let projects = &app.services().projects;

    let submitted = projects
        .submit(
            project.id,
            contractor.id,
            SubmissionSource::Url("https://files.example.com/a.zip".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(submitted.status, ProjectStatus::Submitted);

    let rejected = projects
        .reject(project.id, client.id, "Colors are off")
        .await
        .unwrap();
    assert_eq!(rejected.status, ProjectStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Colors are off"));
    assert_eq!(rejected.submission_file_url, None);

    let upload = Upload {
        filename: "b.zip".to_string(),
        content_type: Some("application/zip".to_string()),
        bytes: bytes::Bytes::from_static(b"PK\x03\x04"),
    };
    let resubmitted = projects
        .submit(project.id, contractor.id, SubmissionSource::Upload(upload))
        .await
        .unwrap();
    assert_eq!(resubmitted.rejection_reason, None);
    let locator = resubmitted.submission_file_url.clone().unwrap();
    assert!(locator.starts_with("/static/submissions/"));

    let completed = projects.accept(project.id, client.id).await.unwrap();
    assert_eq!(completed.status, ProjectStatus::Completed);
    assert!(completed.completed_at.is_some());

    let history = projects.list_submissions(project.id).await.unwrap();
    let versions: Vec<i32> = history.iter().map(|v| v.version).collect();
    assert_eq!(versions, vec![1, 2]);
    assert_eq!(history[0].submit_url, "https://files.example.com/a.zip");
    assert_eq!(history[1].submit_url, locator);
}

#[tokio::test]
async fn transitions_check_actor_and_state() {
    let app = TestApp::new().await;
    let (client, contractor, project) = app.project_in_progress().await;
    let projects = &app.services().projects;

    assert_matches!(
        projects.accept(project.id, client.id).await,
        Err(ServiceError::InvalidState(_))
    );
    assert_matches!(
        projects
            .submit(
                project.id,
                client.id,
                SubmissionSource::Url("https://x.example.com".into())
            )
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        projects.reject(project.id, contractor.id, "no").await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        projects.accept(uuid::Uuid::new_v4(), client.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn reject_requires_reason() {
    let app = TestApp::new().await;
    let (client, _, project) = app.submitted_project().await;
    assert_matches!(
        app.services().projects.reject(project.id, client.id, "   ").await,
        Err(ServiceError::ValidationError(_))
    );
    let unchanged = app.services().projects.get_project(project.id).await.unwrap();
    assert_eq!(unchanged.status, ProjectStatus::Submitted);
}

#[tokio::test]
async fn select_contractor_requires_contractor_role() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let other_client = app.user("other", UserRole::Client).await;
    let project = app.open_project(&client, None).await;

    assert_matches!(
        app.services()
            .projects
            .select_contractor(project.id, client.id, other_client.id)
            .await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        app.services()
            .projects
            .select_contractor(project.id, client.id, uuid::Uuid::new_v4())
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn open_issue_blocks_accept_until_resolved() {
    let app = TestApp::new().await;
    let (client, contractor, project) = app.submitted_project().await;
    let issue_id = app.open_issue(project.id, contractor.id).await;

    assert_matches!(
        app.services().projects.accept(project.id, client.id).await,
        Err(ServiceError::InvalidState(_))
    );

    assert_matches!(
        app.services().issues.resolve_issue(issue_id, contractor.id).await,
        Err(ServiceError::Forbidden(_))
    );
    app.services()
        .issues
        .resolve_issue(issue_id, client.id)
        .await
        .unwrap();
    assert_matches!(
        app.services().issues.resolve_issue(issue_id, client.id).await,
        Err(ServiceError::InvalidState(_))
    );

    let completed = app
        .services()
        .projects
        .accept(project.id, client.id)
        .await
        .unwrap();
    assert_eq!(completed.status, ProjectStatus::Completed);
}

#[tokio::test]
async fn issues_only_on_submitted_projects() {
    let app = TestApp::new().await;
    let (client, _, project) = app.project_in_progress().await;
    let outsider = app.user("outsider", UserRole::Contractor).await;
    let issues = &app.services().issues;
    let input = || freelance_api::services::issues::NewIssue {
        title: "Too early".to_string(),
        description: "Nothing to review yet".to_string(),
    };

    assert_matches!(
        issues.create_issue(project.id, client.id, input()).await,
        Err(ServiceError::InvalidState(_))
    );
    assert_matches!(
        issues.create_issue(project.id, outsider.id, input()).await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn comments_are_kept_in_order() {
    let app = TestApp::new().await;
    let (client, contractor, project) = app.submitted_project().await;
    let issue_id = app.open_issue(project.id, client.id).await;
    let issues = &app.services().issues;

    for (sender, text) in [(client.id, "First"), (contractor.id, "Second")] {
        issues
            .add_comment(
                issue_id,
                sender,
                freelance_api::services::issues::NewComment {
                    content: text.to_string(),
                },
            )
            .await
            .unwrap();
    }
    let comments = issues.list_comments(issue_id).await.unwrap();
    let texts: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(texts, vec!["First", "Second"]);
}

#[tokio::test]
async fn draft_projects_publish_before_bidding() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let contractor = app.user("contractor", UserRole::Contractor).await;
    let projects = &app.services().projects;

    let draft = projects
        .create_project(
            client.id,
            NewProject {
                title: "Mobile app".to_string(),
                description: String::new(),
                budget: None,
                deadline: None,
                publish: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(draft.status, ProjectStatus::Draft);
    assert_matches!(
        app.services()
            .proposals
            .create_proposal(draft.id, contractor.id, bid(100), None)
            .await,
        Err(ServiceError::BiddingClosed(_))
    );

    let open = projects.publish(draft.id, client.id).await.unwrap();
    assert_eq!(open.status, ProjectStatus::Open);

    let (listed, total) = projects.list_open_projects(1, 20).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(listed[0].id, open.id);
}

#[tokio::test]
async fn contractors_cannot_create_projects() {
    let app = TestApp::new().await;
    let contractor = app.user("contractor", UserRole::Contractor).await;
    let result = app
        .services()
        .projects
        .create_project(
            contractor.id,
            NewProject {
                title: "Nope".to_string(),
                description: String::new(),
                budget: None,
                deadline: None,
                publish: true,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn details_patch_leaves_status_alone() {
    let app = TestApp::new().await;
    let (client, contractor, project) = app.project_in_progress().await;
    let projects = &app.services().projects;

    let patched = projects
        .update_project_details(
            project.id,
            client.id,
            ProjectPatch {
                title: Some("Landing page v2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.title, "Landing page v2");
    assert_eq!(patched.status, ProjectStatus::InProgress);

    assert_matches!(
        projects
            .update_project_details(project.id, contractor.id, ProjectPatch::default())
            .await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn user_projects_cover_both_sides() {
    let app = TestApp::new().await;
    let (client, contractor, project) = app.project_in_progress().await;
    let projects = &app.services().projects;

    let as_client = projects.list_user_projects(client.id).await.unwrap();
    let as_contractor = projects.list_user_projects(contractor.id).await.unwrap();
    assert_eq!(as_client.len(), 1);
    assert_eq!(as_contractor[0].id, project.id);
}

#[tokio::test]
async fn ledger_appends_in_separate_transactions_have_no_gaps() {
    let app = TestApp::new().await;
    let (_, _, project) = app.project_in_progress().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let db = app.state.db.clone();
        let project_id = project.id;
        handles.push(tokio::spawn(async move {
            let txn = db.begin().await?;
            let record = SubmissionLedger::append_version(
                &txn,
                project_id,
                SubmissionArtifact {
                    submit_url: format!("https://files.example.com/{}.zip", i),
                },
            )
            .await
            .map_err(|e| sea_orm::DbErr::Custom(e.to_string()))?;
            txn.commit().await?;
            Ok::<_, sea_orm::DbErr>(record.version)
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let versions: Vec<i32> = SubmissionLedger::list_versions(&*app.state.db, project.id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version)
        .collect();
    assert_eq!(versions, (1..=8).collect::<Vec<_>>());
    let latest = SubmissionLedger::latest_version(&*app.state.db, project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, 8);
}

#[tokio::test]
async fn duplicate_ledger_version_maps_to_conflict() {
    let app = TestApp::new().await;
    let (_, _, project) = app.submitted_project().await;

    let duplicate = submission_version::ActiveModel {
        id: Set(uuid::Uuid::new_v4()),
        project_id: Set(project.id),
        version: Set(1),
        submit_url: Set("https://files.example.com/dup.zip".to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(&*app.state.db)
    .await
    .map_err(|e| map_unique_violation(e, "Submission version"));
    assert_matches!(duplicate, Err(ServiceError::Conflict(_)));

    let versions = SubmissionLedger::list_versions(&*app.state.db, project.id)
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
}

#[tokio::test]
async fn guards_read_state_committed_by_earlier_transitions() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let contractor = app.user("contractor", UserRole::Contractor).await;
    let late = app.user("late", UserRole::Contractor).await;
    let open = app.open_project(&client, None).await;
    let proposals = &app.services().proposals;
    let projects = &app.services().projects;

    let placed = proposals
        .create_proposal(open.id, contractor.id, bid(700), Some(pdf_upload("v1.pdf")))
        .await
        .unwrap();
    projects
        .select_contractor(open.id, client.id, contractor.id)
        .await
        .unwrap();

    assert_matches!(
        proposals.create_proposal(open.id, late.id, bid(650), None).await,
        Err(ServiceError::BiddingClosed(_))
    );
    assert_matches!(
        proposals
            .attach_proposal_file(placed.proposal.id, contractor.id, pdf_upload("v2.pdf"))
            .await,
        Err(ServiceError::BiddingClosed(_))
    );
    assert_eq!(proposals.list_proposals(open.id).await.unwrap().len(), 1);
    assert_eq!(
        proposals
            .list_proposal_files(placed.proposal.id)
            .await
            .unwrap()
            .len(),
        1
    );

    projects
        .submit(
            open.id,
            contractor.id,
            SubmissionSource::Url("https://files.example.com/final.zip".to_string()),
        )
        .await
        .unwrap();
    projects.accept(open.id, client.id).await.unwrap();

    let issues = &app.services().issues;
    assert_matches!(
        issues
            .create_issue(
                open.id,
                client.id,
                NewIssue {
                    title: "After the fact".to_string(),
                    description: "Raised once the work was accepted".to_string(),
                },
            )
            .await,
        Err(ServiceError::InvalidState(_))
    );
    assert!(issues.list_issues(open.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn details_patch_can_clear_deadline() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let project = app
        .open_project(&client, Some(Utc::now() + Duration::days(7)))
        .await;
    let projects = &app.services().projects;

    let kept = projects
        .update_project_details(
            project.id,
            client.id,
            ProjectPatch {
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(kept.deadline.is_some());

    let cleared = projects
        .update_project_details(
            project.id,
            client.id,
            ProjectPatch {
                deadline: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.deadline, None);
}

#[tokio::test]
async fn selected_contractor_cannot_be_deleted() {
    let app = TestApp::new().await;
    let (_, contractor, project) = app.project_in_progress().await;

    let deleted = user::Entity::delete_by_id(contractor.id)
        .exec(&*app.state.db)
        .await;
    assert!(deleted.is_err());

    let reloaded = app.services().projects.get_project(project.id).await.unwrap();
    assert_eq!(reloaded.contractor_id, Some(contractor.id));
}
