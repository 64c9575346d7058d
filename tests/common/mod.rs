#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use freelance_api::{
    auth::{password::Argon2Hasher, AuthConfig, AuthService},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{project, user, UserRole},
    events,
    handlers::AppServices,
    services::{
        issues::NewIssue,
        projects::{NewProject, SubmissionSource},
        users::NewUser,
    },
    storage::{LocalBlobStore, Upload},
    AppState,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str =
    "Vq7Lr2Nx9Tz4Kp8Wm3Jd6Hs1Fb5Gc0Ye-uQiOtRnMlKjHgWzXcVbNmPoIuYtReWqAsDf";
pub const PASSWORD: &str = "correct-horse-battery";

/// Application state over a fresh in-memory SQLite database and a
/// throwaway upload directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub upload_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let upload_dir = TempDir::new().expect("temp upload dir");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.upload_dir = upload_dir.path().to_string_lossy().into_owned();
        cfg.max_upload_bytes = 1024 * 1024;

        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let hasher = Arc::new(Argon2Hasher::with_params(1024, 1, 1).expect("test hasher params"));
        let blob_store = Arc::new(LocalBlobStore::new(upload_dir.path()));
        let services = AppServices::new(db_arc.clone(), hasher, blob_store, event_sender);
        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));

        let state = AppState {
            db: db_arc,
            config: cfg,
            auth,
            services,
        };
        let router = freelance_api::app_router(state.clone()).expect("router builds");

        Self {
            router,
            state,
            upload_dir,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub async fn user(&self, username: &str, role: UserRole) -> user::Model {
        self.services()
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{}@example.com", username),
                password: PASSWORD.to_string(),
                role,
            })
            .await
            .expect("create test user")
    }

    pub fn token_for(&self, user: &user::Model) -> String {
        self.state
            .auth
            .generate_token(user)
            .expect("issue test token")
            .access_token
    }

    pub async fn open_project(
        &self,
        client: &user::Model,
        deadline: Option<DateTime<Utc>>,
    ) -> project::Model {
        self.services()
            .projects
            .create_project(
                client.id,
                NewProject {
                    title: "Landing page".to_string(),
                    description: "Marketing site for the spring launch".to_string(),
                    budget: Some(Decimal::new(150_000, 2)),
                    deadline,
                    publish: true,
                },
            )
            .await
            .expect("create open project")
    }

    /// Client, contractor and a project already IN_PROGRESS between them.
    pub async fn project_in_progress(&self) -> (user::Model, user::Model, project::Model) {
        let client = self.user("client", UserRole::Client).await;
        let contractor = self.user("contractor", UserRole::Contractor).await;
        let open = self.open_project(&client, None).await;
        let project = self
            .services()
            .projects
            .select_contractor(open.id, client.id, contractor.id)
            .await
            .expect("select contractor");
        (client, contractor, project)
    }

    pub async fn submitted_project(&self) -> (user::Model, user::Model, project::Model) {
        let (client, contractor, project) = self.project_in_progress().await;
        let project = self
            .services()
            .projects
            .submit(
                project.id,
                contractor.id,
                SubmissionSource::Url("https://files.example.com/v1.zip".to_string()),
            )
            .await
            .expect("submit deliverable");
        (client, contractor, project)
    }

    pub async fn completed_project(&self) -> (user::Model, user::Model, project::Model) {
        let (client, contractor, project) = self.submitted_project().await;
        let project = self
            .services()
            .projects
            .accept(project.id, client.id)
            .await
            .expect("accept submission");
        (client, contractor, project)
    }

    pub async fn open_issue(&self, project_id: Uuid, creator_id: Uuid) -> Uuid {
        self.services()
            .issues
            .create_issue(
                project_id,
                creator_id,
                NewIssue {
                    title: "Broken footer".to_string(),
                    description: "Links in the footer return 404".to_string(),
                },
            )
            .await
            .expect("open issue")
            .id
    }

    /// Sends a request against the router with an optional JSON body and bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize json body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("build request")).await
    }

    /// Sends a `multipart/form-data` POST.
    pub async fn multipart(&self, uri: &str, parts: &[Part], token: &str) -> Response {
        let (content_type, body) = multipart_body(parts);
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", content_type)
            .body(Body::from(body))
            .expect("build multipart request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// One part of a multipart body.
pub enum Part {
    Text(&'static str, String),
    File {
        name: &'static str,
        filename: &'static str,
        content_type: &'static str,
        bytes: Vec<u8>,
    },
}

pub fn pdf_part(filename: &'static str) -> Part {
    Part::File {
        name: "file",
        filename,
        content_type: "application/pdf",
        bytes: b"%PDF-1.4\n%test\n".to_vec(),
    }
}

pub fn pdf_upload(filename: &str) -> Upload {
    Upload {
        filename: filename.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: Bytes::from_static(b"%PDF-1.4\n%test\n"),
    }
}

const BOUNDARY: &str = "freelance-test-boundary";

fn multipart_body(parts: &[Part]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (
        format!("multipart/form-data; boundary={}", BOUNDARY),
        body,
    )
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read response body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("response body is json")
}
