//! End-to-end REST API tests over an in-memory database.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;

use assignment_helper::api::api_routes;
use assignment_helper::models::{ClassSection, Enrollment, Student, Teacher};
use assignment_helper::pipeline::EmailProcessor;
use assignment_helper::store::{Database, LibSqlBackend};

const TEACHER_EMAIL: &str = "jane@school.test";
const HELPER_ADDR: &str = "assignments@school.test";

async fn seeded_app() -> (Router, Arc<dyn Database>) {
    let backend = LibSqlBackend::new_memory().await.unwrap();
    let db: Arc<dyn Database> = Arc::new(backend);

    db.insert_teacher(&Teacher {
        id: "teacher-1".into(),
        email: TEACHER_EMAIL.into(),
        first_name: "Jane".into(),
        last_name: "Smith".into(),
        status: "ACTIVE".into(),
    })
    .await
    .unwrap();
    db.insert_class(&ClassSection {
        id: "class-1".into(),
        term_id: None,
        name: "English 7".into(),
        subject: Some("English".into()),
        teacher_id: "teacher-1".into(),
        status: "ACTIVE".into(),
    })
    .await
    .unwrap();
    db.insert_student(&Student {
        id: "student-1".into(),
        student_id: "STU001".into(),
        first_name: "John".into(),
        last_name: "Doe".into(),
        email: None,
        status: "ACTIVE".into(),
    })
    .await
    .unwrap();
    db.insert_enrollment(&Enrollment {
        id: "enr-1".into(),
        class_id: "class-1".into(),
        student_id: "STU001".into(),
        active: true,
        joined_at: Utc::now(),
        left_at: None,
    })
    .await
    .unwrap();

    let processor = Arc::new(EmailProcessor::new(Arc::clone(&db)));
    (api_routes(Arc::clone(&db), processor), db)
}

fn email_request(
    subject: &str,
    body: &str,
    from_email: &str,
    message_id: &str,
) -> Request<Body> {
    let payload = serde_json::json!({
        "subject": subject,
        "body": body,
        "from_email": from_email,
        "to_email": HELPER_ADDR,
        "message_id": message_id,
    });
    Request::builder()
        .method("POST")
        .uri("/api/process-email")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _db) = seeded_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn process_email_creates_assignment() {
    let (app, db) = seeded_app().await;

    let response = app
        .oneshot(email_request(
            "ASSIGN",
            "Title: Essay\nClass: English 7\nDeadline: 2025-01-15 23:59 CT",
            TEACHER_EMAIL,
            "msg-1",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert!(
        body["response"]
            .as_str()
            .unwrap()
            .contains("ENGLISH7-0115")
    );

    assert!(
        db.find_assignment_by_code("ENGLISH7-0115")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn process_email_rejects_unknown_sender() {
    let (app, _db) = seeded_app().await;

    let response = app
        .oneshot(email_request(
            "ASSIGN",
            "Title: Essay\nClass: English 7\nDeadline: 2025-01-15",
            "stranger@elsewhere.test",
            "msg-1",
        ))
        .await
        .unwrap();

    // Business rejection is still HTTP 200; success flags the outcome.
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(
        body["response"]
            .as_str()
            .unwrap()
            .contains("not an authorized teacher")
    );
}

#[tokio::test]
async fn duplicate_message_id_not_reprocessed() {
    let (app, db) = seeded_app().await;

    let first = app
        .clone()
        .oneshot(email_request(
            "ASSIGN",
            "Title: Essay\nClass: English 7\nDeadline: 2099-01-15",
            TEACHER_EMAIL,
            "msg-dup",
        ))
        .await
        .unwrap();
    assert_eq!(json_body(first).await["success"], true);

    let second = app
        .oneshot(email_request(
            "ASSIGN",
            "Title: Essay\nClass: English 7\nDeadline: 2099-01-15",
            TEACHER_EMAIL,
            "msg-dup",
        ))
        .await
        .unwrap();
    let body = json_body(second).await;
    assert!(
        body["response"]
            .as_str()
            .unwrap()
            .contains("already processed")
    );

    assert_eq!(db.list_assignments().await.unwrap().len(), 1);
}

#[tokio::test]
async fn submit_and_status_flow() {
    let (app, _db) = seeded_app().await;

    let response = app
        .clone()
        .oneshot(email_request(
            "ASSIGN",
            "Title: Essay\nClass: English 7\nDeadline: 2099-01-15",
            TEACHER_EMAIL,
            "msg-a",
        ))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["success"], true);

    let response = app
        .clone()
        .oneshot(email_request(
            "SUBMIT ENGLISH7-0115",
            "StudentID: STU001\nMy essay is attached.",
            "student@school.test",
            "msg-s",
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert!(body["response"].as_str().unwrap().contains("on time"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/assignments/ENGLISH7-0115/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["code"], "ENGLISH7-0115");
    assert_eq!(body["submission_count"], 1);
    assert_eq!(body["submissions"][0]["student_id"], "STU001");
    assert_eq!(body["submissions"][0]["on_time"], true);
}

#[tokio::test]
async fn list_assignments_returns_created() {
    let (app, _db) = seeded_app().await;

    app.clone()
        .oneshot(email_request(
            "ASSIGN",
            "Title: Essay\nClass: English 7\nDeadline: 2025-01-15",
            TEACHER_EMAIL,
            "msg-a",
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/assignments")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["code"], "ENGLISH7-0115");
}

#[tokio::test]
async fn status_for_unknown_assignment_is_404() {
    let (app, _db) = seeded_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/assignments/NOPE-0101/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_command_returns_guidance() {
    let (app, _db) = seeded_app().await;

    let response = app
        .oneshot(email_request(
            "Hello!",
            "Just saying hi.",
            "anyone@anywhere.test",
            "msg-u",
        ))
        .await
        .unwrap();

    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["response"].as_str().unwrap().contains("ASSIGN"));
}
