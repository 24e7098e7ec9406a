//! HTTP-level tests for the report routes.

mod common;

use axum::http::{header, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use common::{empty_request, json_request, parse_response_body, response_bytes, staffed_event, TestApp};

async fn queue_and_generate(app: &TestApp, body: serde_json::Value) -> String {
    let response = app
        .router()
        .oneshot(json_request("POST", "/api/v1/reports", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job = parse_response_body(response).await;
    assert_eq!(job["status"], "pending");

    let summary = app.state.generation.process_pending(10).await.unwrap();
    assert_eq!(summary.completed, 1);
    job["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_memory_backend() {
    let app = TestApp::empty();
    let response = app
        .router()
        .oneshot(empty_request("GET", "/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage_backend"], "memory");
    assert_eq!(body["database"]["configured"], false);

    let live = app
        .router()
        .oneshot(empty_request("GET", "/api/health/live"))
        .await
        .unwrap();
    assert_eq!(live.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_poll_and_download_report() {
    let app = TestApp::new(staffed_event(3));
    let job_id = queue_and_generate(
        &app,
        json!({"report_type": "volunteer_detail", "format": "delimited_text", "title": "Stewards"}),
    )
    .await;

    let response = app
        .router()
        .oneshot(empty_request("GET", &format!("/api/v1/reports/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job = parse_response_body(response).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress_percentage"], 100);
    assert_eq!(job["total_records"], 3);

    let response = app
        .router()
        .oneshot(empty_request("GET", &format!("/api/v1/reports/{job_id}/download")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/csv"));
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains(".csv"));
    let bytes = response_bytes(response).await;
    assert!(!bytes.is_empty());

    let response = app
        .router()
        .oneshot(empty_request("GET", &format!("/api/v1/reports/{job_id}/metrics")))
        .await
        .unwrap();
    let metrics = parse_response_body(response).await;
    assert_eq!(metrics["rows_processed"], 3);
    assert_eq!(metrics["download_count"], 1);
}

#[tokio::test]
async fn test_create_report_validation_errors() {
    let app = TestApp::empty();

    let response = app
        .router()
        .oneshot(json_request("POST", "/api/v1/reports", json!({"format": "structured_data"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "validation_error");

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/reports",
            json!({
                "report_type": "summary",
                "format": "structured_data",
                "parameters": {"date_from": "2026-05-01", "date_to": "2026-04-01"}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_report_is_not_found() {
    let app = TestApp::empty();
    let response = app
        .router()
        .oneshot(empty_request("GET", &format!("/api/v1/reports/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_before_completion_is_rejected() {
    let app = TestApp::empty();
    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/reports",
            json!({"report_type": "summary", "format": "paginated_document"}),
        ))
        .await
        .unwrap();
    let job = parse_response_body(response).await;
    let job_id = job["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(empty_request("GET", &format!("/api/v1/reports/{job_id}/download")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let app = TestApp::new(staffed_event(1));
    queue_and_generate(&app, json!({"report_type": "summary", "format": "spreadsheet"})).await;
    app.router()
        .oneshot(json_request(
            "POST",
            "/api/v1/reports",
            json!({"report_type": "role_assignment", "format": "structured_data"}),
        ))
        .await
        .unwrap();

    let response = app
        .router()
        .oneshot(empty_request("GET", "/api/v1/reports?status=pending"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["report_type"], "role_assignment");
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_share_link_download_flow() {
    let app = TestApp::new(staffed_event(2));
    let job_id = queue_and_generate(&app, json!({"report_type": "summary", "format": "structured_data"})).await;

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/reports/{job_id}/shares"),
            json!({"max_downloads": 1, "password": "spring-fair"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let share = parse_response_body(response).await;
    assert!(share.get("password_hash").is_none());
    let token = share["token"].as_str().unwrap().to_string();

    let response = app
        .router()
        .oneshot(empty_request("GET", &format!("/api/v1/reports/shares/{token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(parse_response_body(response).await["error"], "share_password_required");

    let download = axum::http::Request::builder()
        .uri(format!("/api/v1/reports/shares/{token}/download"))
        .header("x-share-password", "spring-fair")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.router().oneshot(download).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc: serde_json::Value = serde_json::from_slice(&response_bytes(response).await).unwrap();
    assert_eq!(doc["total_records"], 1);

    let again = axum::http::Request::builder()
        .uri(format!("/api/v1/reports/shares/{token}/download"))
        .header("x-share-password", "spring-fair")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.router().oneshot(again).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(parse_response_body(response).await["error"], "share_exhausted");
}

#[tokio::test]
async fn test_revoked_share_is_denied() {
    let app = TestApp::new(staffed_event(2));
    let job_id = queue_and_generate(&app, json!({"report_type": "summary", "format": "delimited_text"})).await;

    let response = app
        .router()
        .oneshot(json_request("POST", &format!("/api/v1/reports/{job_id}/shares"), json!({})))
        .await
        .unwrap();
    let token = parse_response_body(response).await["token"].as_str().unwrap().to_string();

    let response = app
        .router()
        .oneshot(empty_request("DELETE", &format!("/api/v1/reports/shares/{token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .router()
        .oneshot(empty_request("GET", &format!("/api/v1/reports/shares/{token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(parse_response_body(response).await["error"], "share_revoked");
}

#[tokio::test]
async fn test_bulk_delete_reports_partial_failure() {
    let app = TestApp::new(staffed_event(1));
    let job_id = queue_and_generate(&app, json!({"report_type": "summary", "format": "delimited_text"})).await;
    let missing = Uuid::new_v4();

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/reports/bulk/delete",
            json!({"job_ids": [job_id, missing]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["failed"], 1);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["success"], true);
    assert_eq!(items[1]["success"], false);
    assert!(app.storage.paths().is_empty());
}

#[tokio::test]
async fn test_template_and_schedule_run_now() {
    let app = TestApp::new(staffed_event(2));

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/reports/templates",
            json!({
                "name": "Weekly staffing",
                "report_type": "event_performance",
                "default_format": "delimited_text",
                "is_public": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let template = parse_response_body(response).await;
    let template_id = template["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/reports/schedules",
            json!({
                "name": "Monday staffing",
                "frequency": "weekly",
                "template_id": template_id,
                "start_date": "2027-01-04",
                "run_time": "09:00"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let schedule = parse_response_body(response).await;
    assert_eq!(schedule["next_run"], "2027-01-04T09:00:00Z");
    let schedule_id = schedule["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(empty_request("POST", &format!("/api/v1/reports/schedules/{schedule_id}/run")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let execution = parse_response_body(response).await;
    assert_eq!(execution["job_status"], "completed");

    let job_id = execution["job_id"].as_str().unwrap();
    let response = app
        .router()
        .oneshot(empty_request("GET", &format!("/api/v1/reports/{job_id}")))
        .await
        .unwrap();
    let job = parse_response_body(response).await;
    assert_eq!(job["report_type"], "event_performance");
    assert_eq!(job["total_records"], 1);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::empty();
    let request = axum::http::Request::builder()
        .uri("/api/health/live")
        .header("x-request-id", "req-1234")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-1234");
}
