mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{devices, MockProbe};
use lan_fingerprint_rs::config::SessionConfig;
use lan_fingerprint_rs::server::{router, AppState};
use lan_fingerprint_rs::ScanController;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;

fn app(probe: MockProbe) -> Router {
    let controller = ScanController::new(Arc::new(probe), SessionConfig::default());
    router(AppState::new(Arc::new(controller)))
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_scan(range: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/scan")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "range": range }).to_string()))
        .unwrap()
}

async fn wait_for_summary(app: &Router) -> Value {
    for _ in 0..200 {
        let (_, body) = send(app, get("/status")).await;
        let status: Value = serde_json::from_slice(&body).unwrap();
        if status["active"] == false {
            let (code, body) = send(app, get("/results")).await;
            assert_eq!(code, StatusCode::OK);
            let v: Value = serde_json::from_slice(&body).unwrap();
            assert!(!v["summary"].is_null(), "inactive status without a summary: {status}");
            return v;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan did not complete");
}

#[tokio::test]
async fn results_before_any_scan_are_empty() {
    let app = app(MockProbe::new(Vec::new()));
    let (status, _) = send(&app, get("/results")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, get("/export.csv")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn empty_range_is_bad_request() {
    let app = app(MockProbe::new(Vec::new()));
    let (status, body) = send(&app, post_scan("  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["error"]["kind"], "invalid_input");
}

#[tokio::test]
async fn scan_then_sorted_results_and_csv() {
    let probe = MockProbe::new(devices(&[("10.0.0.20", "20:20:20:20:20:20"), ("10.0.0.3", "")]))
        .mac("10.0.0.3", Ok("03:03:03:03:03:03"))
        .os("10.0.0.3", Ok(vec![("Linux 4.x", 90)]));
    let app = app(probe);

    let (status, _) = send(&app, post_scan("10.0.0.0/24")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let results = wait_for_summary(&app).await;
    assert_eq!(results["summary"]["device_count"], 2);

    let (_, body) = send(&app, get("/results?sort=ip")).await;
    let v: Value = serde_json::from_slice(&body).unwrap();
    let rows = v["rows"].as_array().unwrap();
    assert_eq!(rows[0]["ip"], "10.0.0.3");
    assert_eq!(rows[0]["index"], 1);
    assert_eq!(rows[0]["os"], "Linux 4.x (90% accurate)");
    assert_eq!(rows[1]["os"], "Unknown");

    let (status, body) = send(&app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["state"], "completed");
    assert_eq!(v["active"], false);
    assert_eq!(v["discovered"], 2);
    assert!(v["message"].as_str().unwrap().starts_with("2 devices found • Completed in "));

    let (status, body) = send(&app, get("/export.csv")).await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(body).unwrap();
    assert!(csv.starts_with("IP Address,MAC Address,Operating System\n10.0.0.20,"));
}

#[tokio::test]
async fn second_scan_while_running_conflicts() {
    let gate = Arc::new(Notify::new());
    let app = app(MockProbe::new(devices(&[("10.0.0.1", "01:01:01:01:01:01")])).gated(gate.clone()));

    let (status, _) = send(&app, post_scan("10.0.0.0/24")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, body) = send(&app, post_scan("10.0.0.0/24")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["error"]["kind"], "scan_in_progress");

    let cancel = Request::builder().method("POST").uri("/cancel").body(Body::empty()).unwrap();
    let (status, _) = send(&app, cancel).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    gate.notify_one();
    let results = wait_for_summary(&app).await;
    assert_eq!(results["summary"]["cancelled"], true);
    assert_eq!(results["summary"]["resolved_count"], 0);
}

#[tokio::test]
async fn export_follows_requested_sort() {
    let probe = MockProbe::new(devices(&[
        ("10.0.0.20", "20:20:20:20:20:20"),
        ("10.0.0.3", "03:03:03:03:03:03"),
        ("10.0.0.100", "64:64:64:64:64:64"),
    ]));
    let app = app(probe);
    let (status, _) = send(&app, post_scan("10.0.0.0/24")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_summary(&app).await;

    let ips = |body: Vec<u8>| -> Vec<String> {
        String::from_utf8(body)
            .unwrap()
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap().to_string())
            .collect()
    };

    let (_, body) = send(&app, get("/export.csv")).await;
    assert_eq!(ips(body), vec!["10.0.0.20", "10.0.0.3", "10.0.0.100"]);

    let (_, body) = send(&app, get("/export.csv?sort=ip&desc=true")).await;
    assert_eq!(ips(body), vec!["10.0.0.100", "10.0.0.20", "10.0.0.3"]);
}
