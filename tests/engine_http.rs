//! End-to-end runs of the load test engine against a mock Arzt server.

use mockito::Matcher;

use arzt_loadtest::loadtest::config::{LoadTestConfig, WaitTime};
use arzt_loadtest::loadtest::engine::LoadTestEngine;
use arzt_loadtest::loadtest::report::{write_report, LoadTestReport};
use arzt_loadtest::loadtest::summary::render_summary;

const DOCTOR_IDS_ONLY: &str = r#"
[settings]
virtual_users = 1
duration_secs = 30
timeout_ms = 2000

[[task]]
type = "path"
name = "get_id"
weight = 1
path = "/rest/{value}"
values = [1, 20, 30, 40, 50, 60]
"#;

async fn arzt_server() -> (mockito::ServerGuard, Vec<mockito::Mock>) {
    let mut server = mockito::Server::new_async().await;
    let mocks = vec![
        server
            .mock("GET", Matcher::Regex(r"^/rest/(1|20|30|40|50)$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":1,"name":"Bernd Brot","praxis":"Dr. Bernd"}"#)
            .create_async()
            .await,
        server
            .mock("GET", "/rest/60")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await,
        server
            .mock("GET", "/rest")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await,
    ];
    (server, mocks)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_path_task_counts_missing_doctor_as_failure() {
    let (server, _mocks) = arzt_server().await;
    let config = LoadTestConfig::from_toml(DOCTOR_IDS_ONLY).unwrap();

    let engine = LoadTestEngine::new(config, server.url())
        .with_live_display(false)
        .with_no_color(true)
        .with_iterations(2);
    let result = engine.run().await.unwrap();

    let snap = &result.snapshot;
    assert_eq!(result.iterations, 2);
    assert_eq!(snap.total_requests, 12, "6 ids per iteration");
    assert_eq!(snap.success_count, 10);
    assert_eq!(snap.error_count, 2);
    assert_eq!(snap.error_category_counts.get("http"), Some(&2));

    let missing = snap
        .per_endpoint
        .iter()
        .find(|e| e.label == "/rest/60")
        .expect("endpoint /rest/60 recorded");
    assert_eq!(missing.error_count, 2);
    assert_eq!(missing.success_count, 0);
    assert_eq!(snap.per_endpoint.len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_arzt_scenario_mix_and_report() {
    let (server, _mocks) = arzt_server().await;
    let mut config = LoadTestConfig::arzt_default().unwrap();
    config.settings.virtual_users = 3;
    config.settings.insecure = false;
    config.settings.wait_time = WaitTime::Constant { seconds: 0.0 };

    let engine = LoadTestEngine::new(config, server.url())
        .with_live_display(false)
        .with_no_color(true)
        .with_iterations(6);
    let result = engine.run().await.unwrap();
    let snap = &result.snapshot;

    assert_eq!(result.iterations, 6);
    assert_eq!(result.final_active_vus, 0);
    // Every task issues 5 or 6 requests per iteration.
    assert!(
        (30..=36).contains(&snap.total_requests),
        "unexpected request total {}",
        snap.total_requests
    );
    let per_task_total: u64 = snap.per_task.iter().map(|t| t.requests).sum();
    assert_eq!(per_task_total, snap.total_requests);
    for task in &snap.per_task {
        assert!(
            ["get_id", "get_praxis", "get_name"].contains(&task.name.as_str()),
            "unknown task {}",
            task.name
        );
    }
    assert!(snap
        .per_endpoint
        .iter()
        .all(|e| e.label.starts_with("/rest")));

    let summary = render_summary(&result, engine.config(), engine.host());
    assert!(summary.contains("http_req_total"), "{summary}");
    assert!(summary.contains("iterations"), "{summary}");

    let dir = tempfile::tempdir().unwrap();
    let report = LoadTestReport::from_result(&result, engine.config(), engine.host());
    let path = write_report(&report, dir.path()).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["iterations"], 6);
    assert_eq!(json["metrics"]["total_requests"], snap.total_requests);
    assert_eq!(json["target_url"], server.url());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_query_values_are_url_encoded_on_the_wire() {
    let mut server = mockito::Server::new_async().await;
    let praxis = server
        .mock("GET", "/rest")
        .match_query(Matcher::UrlEncoded("praxis".into(), "Dr. Bernd".into()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let _rest = server
        .mock("GET", "/rest")
        .match_query(Matcher::Any)
        .with_status(200)
        .create_async()
        .await;

    let config = LoadTestConfig::from_toml(
        r#"
[settings]
virtual_users = 1
duration_secs = 30

[[task]]
type = "query"
name = "get_praxis"
weight = 1
path = "/rest"
param = "praxis"
values = ["Dr. Bernd", "l", "t", "i", "p"]
"#,
    )
    .unwrap();

    let result = LoadTestEngine::new(config, server.url())
        .with_live_display(false)
        .with_iterations(1)
        .run()
        .await
        .unwrap();

    assert_eq!(result.snapshot.total_requests, 5);
    assert_eq!(result.snapshot.error_count, 0);
    praxis.assert_async().await;
}
