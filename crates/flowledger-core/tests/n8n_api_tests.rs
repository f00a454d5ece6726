use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use flowledger_core::error::{ClientError, ErrorKind};
use flowledger_core::instance::{Environment, Instance};
use flowledger_core::providers::n8n_api::{N8nClient, API_KEY_HEADER, PAGE_LIMIT};
use flowledger_core::providers::WorkflowSource;
use flowledger_core::scanner::{scan_instance, ScanOptions};
use flowledger_core::FindingType;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

const KEY: &str = "stub-key";

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == KEY)
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": "unauthorized" })))
}

fn workflow(id: &str, name: &str, params: Value) -> Value {
    json!({
        "id": id,
        "name": name,
        "active": true,
        "nodes": [{
            "id": format!("{id}-node"),
            "name": "Request",
            "type": "n8n-nodes-base.httpRequest",
            "parameters": params,
            "credentials": { "httpBasicAuth": { "id": "7", "name": "Partner API" } }
        }],
        "connections": {}
    })
}

/// Stub n8n instance: two workflow pages, optional credentials endpoint.
fn n8n_stub(with_credentials: bool) -> Router {
    let router = Router::new()
        .route(
            "/api/v1/workflows",
            get(
                |headers: HeaderMap, Query(query): Query<HashMap<String, String>>| async move {
                    if !authorized(&headers) {
                        return unauthorized();
                    }
                    if query.get("limit").map(String::as_str) == Some("1") {
                        return (StatusCode::OK, Json(json!({ "data": [], "nextCursor": null })));
                    }
                    assert_eq!(query.get("limit"), Some(&PAGE_LIMIT.to_string()));
                    match query.get("cursor").map(String::as_str) {
                        None => (
                            StatusCode::OK,
                            Json(json!({
                                "data": [workflow("1", "(Partners) Sync", json!({ "url": "http://partner.example/api" }))],
                                "nextCursor": "page-2"
                            })),
                        ),
                        Some("page-2") => (
                            StatusCode::OK,
                            Json(json!({
                                "data": [workflow("2", "(Partners) Report", json!({ "url": "https://partner.example/report" }))],
                                "nextCursor": null
                            })),
                        ),
                        Some(_) => (StatusCode::BAD_REQUEST, Json(json!({ "message": "bad cursor" }))),
                    }
                },
            ),
        )
        .route(
            "/api/v1/settings",
            get(|headers: HeaderMap| async move {
                if !authorized(&headers) {
                    return unauthorized();
                }
                (StatusCode::OK, Json(json!({ "data": { "versionCli": "1.45.2" } })))
            }),
        );

    if with_credentials {
        router.route(
            "/api/v1/credentials",
            get(|headers: HeaderMap| async move {
                if !authorized(&headers) {
                    return unauthorized();
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "data": [
                            { "id": "7", "name": "Partner API", "type": "httpBasicAuth" },
                            { "id": "8", "name": "Old SMTP", "type": "smtp" }
                        ]
                    })),
                )
            }),
        )
    } else {
        router
    }
}

fn instance(url: &str, key: &str) -> Instance {
    Instance::new("stub", "Stub", url, key, Environment::Staging)
}

fn client() -> N8nClient {
    N8nClient::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_fetch_workflows_follows_cursor() {
    let url = serve(n8n_stub(true)).await;
    let workflows = client().fetch_workflows(&instance(&url, KEY)).await.unwrap();

    let ids: Vec<&str> = workflows.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(workflows[0].nodes[0].credentials, vec!["7".to_string()]);
    assert_eq!(workflows[0].instance_id, "stub");
}

#[tokio::test]
async fn test_wrong_key_is_authentication_error() {
    let url = serve(n8n_stub(true)).await;
    let err = client()
        .list_workflows(&instance(&url, "wrong"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_missing_credentials_endpoint_is_not_found() {
    let url = serve(n8n_stub(false)).await;
    let err = client()
        .list_credentials(&instance(&url, KEY))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound { .. }));
}

#[tokio::test]
async fn test_scan_over_http_reports_findings() {
    let url = serve(n8n_stub(true)).await;
    let report = scan_instance(&client(), &instance(&url, KEY), &ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(report.stats.workflows.active, 2);
    assert_eq!(report.stats.total_credentials, 2);
    assert_eq!(report.findings_of(FindingType::Deprecated).count(), 2);
    assert_eq!(report.findings_of(FindingType::WeakAuth).count(), 1);
    let unused: Vec<_> = report.findings_of(FindingType::Unused).collect();
    assert_eq!(unused.len(), 1);
    assert_eq!(unused[0].credential_id.as_deref(), Some("8"));
}

#[tokio::test]
async fn test_scan_without_credentials_endpoint_degrades() {
    let url = serve(n8n_stub(false)).await;
    let report = scan_instance(&client(), &instance(&url, KEY), &ScanOptions::default())
        .await
        .unwrap();
    assert!(!report.credentials_available);
    assert_eq!(report.stats.total_credentials, 0);
    assert_eq!(report.findings_of(FindingType::Deprecated).count(), 2);
}

#[tokio::test]
async fn test_connection_check_reports_version() {
    let url = serve(n8n_stub(true)).await;
    let check = client().test_connection(&instance(&url, KEY)).await;
    assert!(check.connected);
    assert_eq!(check.version.as_deref(), Some("1.45.2"));

    let check = client().test_connection(&instance(&url, "nope")).await;
    assert!(!check.connected);
    assert_eq!(check.error.as_deref(), Some("Invalid API key"));
    assert_eq!(check.error_kind, Some(ErrorKind::Authentication));
}

#[tokio::test]
async fn test_version_falls_back_to_editor_page() {
    let app = Router::new()
        .route("/healthz", get(|| async { Json(json!({ "status": "ok" })) }))
        .route(
            "/",
            get(|| async { "<html><head><meta name=\"n8n:version\"></head><!-- n8n@1.30.2 --></html>" }),
        );
    let url = serve(app).await;
    let version = client().detect_version(&instance(&url, KEY)).await;
    assert_eq!(version.as_deref(), Some("1.30.2"));
}

#[tokio::test]
async fn test_version_from_healthz() {
    let app = Router::new().route(
        "/healthz",
        get(|| async { Json(json!({ "status": "ok", "version": "1.40.0" })) }),
    );
    let url = serve(app).await;
    let version = client().detect_version(&instance(&url, KEY)).await;
    assert_eq!(version.as_deref(), Some("1.40.0"));
}

#[tokio::test]
async fn test_latest_version_from_registry() {
    let app = Router::new().route(
        "/n8n/latest",
        get(|| async { Json(json!({ "name": "n8n", "version": "1.50.1" })) }),
    );
    let url = serve(app).await;
    let latest = client()
        .with_registry_url(&format!("{}/n8n/latest", url))
        .fetch_latest_version()
        .await
        .unwrap();
    assert_eq!(latest, "1.50.1");
}

#[tokio::test]
async fn test_refused_connection_is_connectivity_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client()
        .list_workflows(&instance(&format!("http://{}", addr), KEY))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connectivity);

    let check = client()
        .test_connection(&instance(&format!("http://{}", addr), KEY))
        .await;
    assert!(check.error.unwrap().starts_with("Cannot connect"));
}

#[tokio::test]
async fn test_slow_instance_hits_client_timeout() {
    let app = Router::new().route(
        "/api/v1/workflows",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "data": [] }))
        }),
    );
    let url = serve(app).await;
    let client = N8nClient::new(Duration::from_millis(200)).unwrap();
    let err = client.list_workflows(&instance(&url, KEY)).await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }));
}
