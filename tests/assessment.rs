//! End-to-end assessments against an in-process target over real TCP.

mod harness;

use std::io::Write;
use std::time::Duration;

use harness::{BroadcastServer, Behavior, DEFAULT_PAGE};
use wsassess::{Category, Coordinator, Error, HarnessConfig, Phase, Tolerance};

/// A shorter window at a faster cadence keeps failure scenarios quick.
fn quick(endpoint: String) -> HarnessConfig {
    HarnessConfig::new(endpoint).with_tolerance(Tolerance {
        observation: Duration::from_millis(1000),
        messages_per_sec: 10.0,
        ..Default::default()
    })
}

fn quick_behavior() -> Behavior {
    Behavior {
        interval: Duration::from_millis(100),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reference_target_passes() {
    let (server, addr) = BroadcastServer::spawn(Behavior::default()).await;

    let mut coordinator = Coordinator::new(HarnessConfig::new(BroadcastServer::endpoint(addr)));
    let report = coordinator.run().await.unwrap();

    assert!(report.passed(), "{}", report);
    assert_eq!(coordinator.phase(), Phase::Done);
    let open = report.in_category(Category::OpenCount).next().unwrap();
    assert_eq!(open.message, "3/3 connections opened");
    assert_eq!(report.in_category(Category::Rate).filter(|a| a.passed).count(), 3);
    assert_eq!(server.hub().clients(), 3);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_static_page_is_compared_trimmed() {
    let (server, addr) = BroadcastServer::spawn(quick_behavior()).await;
    let mut page = tempfile::NamedTempFile::new().unwrap();
    write!(page, "\n\n{}   ", DEFAULT_PAGE.trim()).unwrap();

    let config = quick(BroadcastServer::endpoint(addr)).with_reference_page(page.path());
    let report = Coordinator::new(config).run().await.unwrap();

    let statics: Vec<_> = report.in_category(Category::StaticResource).collect();
    assert_eq!(statics.len(), 3);
    assert!(statics.iter().all(|a| a.passed), "{}", report);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_static_page_mismatch_and_content_type() {
    let (server, addr) = BroadcastServer::spawn(Behavior {
        content_type: "text/plain",
        ..quick_behavior()
    })
    .await;
    let mut page = tempfile::NamedTempFile::new().unwrap();
    write!(page, "<h1>something else</h1>").unwrap();

    let config = quick(BroadcastServer::endpoint(addr)).with_reference_page(page.path());
    let report = Coordinator::new(config).run().await.unwrap();

    assert!(!report.passed());
    let failed: Vec<_> = report
        .in_category(Category::StaticResource)
        .filter(|a| !a.passed)
        .collect();
    assert_eq!(failed.len(), 2, "{}", report);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_reference_page_fails() {
    let (server, addr) = BroadcastServer::spawn(quick_behavior()).await;
    let dir = tempfile::tempdir().unwrap();

    let config =
        quick(BroadcastServer::endpoint(addr)).with_reference_page(dir.path().join("index.html"));
    let report = Coordinator::new(config).run().await.unwrap();

    let statics: Vec<_> = report.in_category(Category::StaticResource).collect();
    assert_eq!(statics.len(), 1);
    assert!(statics[0].message.contains("missing"));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refused_upgrades_are_connection_errors() {
    let (server, addr) = BroadcastServer::spawn(Behavior {
        max_clients: Some(2),
        ..quick_behavior()
    })
    .await;

    let report = Coordinator::new(quick(BroadcastServer::endpoint(addr)))
        .run()
        .await
        .unwrap();

    let open = report.in_category(Category::OpenCount).next().unwrap();
    assert!(!open.passed);
    assert_eq!(open.message, "2/3 connections opened");
    let errors: Vec<_> = report.in_category(Category::ConnectionError).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("503"), "{}", errors[0].message);

    server.shutdown().await;
}

#[tokio::test]
async fn test_nothing_listening_is_target_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = Coordinator::new(quick(BroadcastServer::endpoint(addr)))
        .run()
        .await;
    assert!(matches!(result, Err(Error::TargetUnavailable(_))));
}

#[tokio::test]
async fn test_report_renders_as_json() {
    let (server, addr) = BroadcastServer::spawn(quick_behavior()).await;

    let report = Coordinator::new(quick(BroadcastServer::endpoint(addr)))
        .run()
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(
        json["summary"]["passed"].as_u64().unwrap() as usize,
        report.summary.passed
    );
    assert!(json["assertions"].as_array().unwrap().len() >= 5);

    server.shutdown().await;
}
