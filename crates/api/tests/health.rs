//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_json};
use serde_json::json;

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let app = build_test_app().await;
    let response = get(&app.router, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["storage_healthy"], true);
    assert_eq!(json["active_polls"], 0);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let app = build_test_app().await;
    let response = get(&app.router, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let app = build_test_app().await;
    let response = get(&app.router, "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn diagnostics_reports_projects_and_tasks() {
    let app = build_test_app().await;
    post_json(&app.router, "/api/v1/projects", json!({"name": "One"})).await;
    post_json(&app.router, "/api/v1/jimeng/tasks", json!({"prompt": "#slow"})).await;

    let response = get(&app.router, "/api/v1/system/diagnostics").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["projects"]["projectCount"], 1);
    assert_eq!(json["data"]["tasks"]["total"], 1);
    assert_eq!(json["data"]["tasks"]["active"], 1);
    assert_eq!(json["data"]["tasks"]["polling"], 1);
    assert_eq!(json["data"]["phase"], "P0");
    assert_eq!(
        json["data"]["logDir"],
        app.config.log_dir.display().to_string()
    );

    app.registry.shutdown().await;
}

#[tokio::test]
async fn backup_zips_every_project() {
    let app = build_test_app().await;
    let created = body_json(
        post_json(&app.router, "/api/v1/projects", json!({"name": "Archived"})).await,
    )
    .await;
    let project_id = created["data"]["manifest"]["id"].as_str().unwrap().to_string();

    let response = post_json(&app.router, "/api/v1/system/backup", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "succeeded");
    let path = std::path::PathBuf::from(json["data"]["path"].as_str().unwrap());
    assert!(path.starts_with(&app.config.backups_dir));
    assert!(path.to_string_lossy().ends_with("-projects.zip"));

    let archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&format!("{project_id}/manifest.json").as_str()));
}
