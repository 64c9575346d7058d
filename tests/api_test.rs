mod common;

use axum::http::{Method, StatusCode};
use freelance_api::{entities::UserRole, middleware_helpers::REQUEST_ID_HEADER};
use serde_json::json;

use common::{body_json, pdf_part, Part, TestApp, PASSWORD};

#[tokio::test]
async fn register_then_login_issues_token() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "username": "ada",
                "email": "ada@example.com",
                "password": PASSWORD,
                "role": "client"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], "ada");
    assert!(body["data"].get("password_hash").is_none());

    let duplicate = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "username": "ada",
                "email": "other@example.com",
                "password": PASSWORD,
                "role": "contractor"
            })),
            None,
        )
        .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let login = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({"username": "ada", "password": PASSWORD})),
            None,
        )
        .await;
    assert_eq!(login.status(), StatusCode::OK);
    let body = body_json(login).await;
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["role"], "client");

    let wrong = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({"username": "ada", "password": "not-the-password"})),
            None,
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let unknown = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({"username": "nobody", "password": PASSWORD})),
            None,
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn api_requires_bearer_token() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api/v1/projects", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .request(Method::GET, "/api/v1/projects", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn project_endpoints_follow_the_lifecycle() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let contractor = app.user("contractor", UserRole::Contractor).await;
    let client_token = app.token_for(&client);
    let contractor_token = app.token_for(&contractor);

    let created = app
        .request(
            Method::POST,
            "/api/v1/projects",
            Some(json!({"title": "Brand refresh", "budget": "2500.00"})),
            Some(&client_token),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = body_json(created).await;
    assert_eq!(body["data"]["status"], "open");
    let project_id = body["data"]["id"].as_str().unwrap().to_string();

    let listed = body_json(
        app.request(Method::GET, "/api/v1/projects", None, Some(&contractor_token))
            .await,
    )
    .await;
    assert_eq!(listed["data"]["total"], 1);

    let bid = app
        .multipart(
            &format!("/api/v1/projects/{}/proposals", project_id),
            &[
                Part::Text("price", "1800".to_string()),
                Part::Text("description", "Two rounds of revisions".to_string()),
                pdf_part("offer.pdf"),
            ],
            &contractor_token,
        )
        .await;
    assert_eq!(bid.status(), StatusCode::CREATED);
    let body = body_json(bid).await;
    assert_eq!(body["data"]["latest_file"]["version"], 1);

    let selected = app
        .request(
            Method::POST,
            &format!("/api/v1/projects/{}/select-contractor", project_id),
            Some(json!({"contractor_id": contractor.id})),
            Some(&client_token),
        )
        .await;
    assert_eq!(selected.status(), StatusCode::OK);

    let submitted = app
        .multipart(
            &format!("/api/v1/projects/{}/submit", project_id),
            &[Part::Text(
                "submission_file_url",
                "https://files.example.com/brand.zip".to_string(),
            )],
            &contractor_token,
        )
        .await;
    assert_eq!(submitted.status(), StatusCode::OK);
    let body = body_json(submitted).await;
    assert_eq!(body["data"]["status"], "submitted");

    let early_rating = app
        .request(
            Method::POST,
            &format!("/api/v1/projects/{}/rate", project_id),
            Some(json!({"rated_user_id": contractor.id, "output_quality": 5})),
            Some(&client_token),
        )
        .await;
    assert_eq!(early_rating.status(), StatusCode::BAD_REQUEST);

    let accepted = app
        .request(
            Method::POST,
            &format!("/api/v1/projects/{}/accept", project_id),
            None,
            Some(&client_token),
        )
        .await;
    assert_eq!(accepted.status(), StatusCode::OK);

    let rated = app
        .request(
            Method::POST,
            &format!("/api/v1/projects/{}/rate", project_id),
            Some(json!({"rated_user_id": contractor.id, "output_quality": 5, "compliance": 4})),
            Some(&client_token),
        )
        .await;
    assert_eq!(rated.status(), StatusCode::CREATED);

    let average = body_json(
        app.request(
            Method::GET,
            &format!("/api/v1/users/{}/average-rating", contractor.id),
            None,
            Some(&client_token),
        )
        .await,
    )
    .await;
    assert_eq!(average["data"]["average"], 4.5);
    assert_eq!(average["data"]["count"], 1);
}

#[tokio::test]
async fn patch_with_status_is_rejected() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let project = app.open_project(&client, None).await;
    let token = app.token_for(&client);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/projects/{}", project.id),
            Some(json!({"title": "Sneaky", "status": "completed"})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let unchanged = app.services().projects.get_project(project.id).await.unwrap();
    assert_eq!(unchanged.title, project.title);
}

#[tokio::test]
async fn guard_failures_map_to_status_codes() {
    let app = TestApp::new().await;
    let (client, contractor, project) = app.submitted_project().await;
    let client_token = app.token_for(&client);
    let contractor_token = app.token_for(&contractor);

    let forbidden = app
        .request(
            Method::POST,
            &format!("/api/v1/projects/{}/accept", project.id),
            None,
            Some(&contractor_token),
        )
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let missing = app
        .request(
            Method::GET,
            &format!("/api/v1/projects/{}", uuid::Uuid::new_v4()),
            None,
            Some(&client_token),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let issue = app
        .request(
            Method::POST,
            &format!("/api/v1/projects/{}/issues", project.id),
            Some(json!({"title": "Typo", "description": "Header says 'Welcom'"})),
            Some(&client_token),
        )
        .await;
    assert_eq!(issue.status(), StatusCode::CREATED);
    let issue_id = body_json(issue).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let blocked = app
        .request(
            Method::POST,
            &format!("/api/v1/projects/{}/accept", project.id),
            None,
            Some(&client_token),
        )
        .await;
    assert_eq!(blocked.status(), StatusCode::BAD_REQUEST);

    let resolved = app
        .request(
            Method::POST,
            &format!("/api/v1/projects/{}/issues/{}/resolve", project.id, issue_id),
            None,
            Some(&client_token),
        )
        .await;
    assert_eq!(resolved.status(), StatusCode::OK);
    assert_eq!(body_json(resolved).await["data"]["status"], "resolved");
}

#[tokio::test]
async fn non_pdf_proposal_attachment_is_rejected() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let contractor = app.user("contractor", UserRole::Contractor).await;
    let project = app.open_project(&client, None).await;

    let response = app
        .multipart(
            &format!("/api/v1/projects/{}/proposals", project.id),
            &[
                Part::Text("price", "100".to_string()),
                Part::File {
                    name: "file",
                    filename: "offer.png",
                    content_type: "image/png",
                    bytes: vec![0x89, b'P', b'N', b'G'],
                },
            ],
            &app.token_for(&contractor),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn errors_echo_the_request_id() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    let token = app.token_for(&client);

    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri(format!("/api/v1/projects/{}", uuid::Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .header(REQUEST_ID_HEADER, "trace-me-42")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(
        freelance_api::app_router(app.state.clone()).unwrap(),
        request,
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get(REQUEST_ID_HEADER).unwrap(),
        "trace-me-42"
    );
    let body = body_json(response).await;
    assert_eq!(body["request_id"], "trace-me-42");
}

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["database"]["status"], "up");
}

#[tokio::test]
async fn out_of_range_page_returns_empty_listing() {
    let app = TestApp::new().await;
    let client = app.user("client", UserRole::Client).await;
    app.open_project(&client, None).await;
    let token = app.token_for(&client);

    let response = app
        .request(
            Method::GET,
            "/api/v1/projects?page=18446744073709551615&limit=100",
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
}
