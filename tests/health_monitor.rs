//! Monitor loop tests against live mock backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use droplet_balancer::config::BackendConfig;
use droplet_balancer::lifecycle::Shutdown;
use droplet_balancer::{Backend, Inventory, InventoryError};
use tower::ServiceExt;

mod common;
use common::{
    droplet, eventually, start_mock_backend, start_programmable_backend, start_silent_backend,
    temp_inventory_path,
};

/// Short period with a health timeout far longer than it.
fn slow_probe_config() -> BackendConfig {
    BackendConfig {
        monitor_interval_ms: 100,
        health_timeout_ms: 3_000,
        dial_timeout_ms: 500,
        ..BackendConfig::default()
    }
}

fn fast_config() -> BackendConfig {
    BackendConfig {
        monitor_interval_ms: 20,
        health_timeout_ms: 500,
        dial_timeout_ms: 500,
        ..BackendConfig::default()
    }
}

#[tokio::test]
async fn test_health_follows_probe_results() {
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    let addr = start_programmable_backend(move |_path| {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, "ok".into())
            } else {
                (500, "dead".into())
            }
        }
    })
    .await;

    let shutdown = Shutdown::default();
    let backend = Backend::new(
        droplet(1, &format!("http://{addr}/health")),
        &fast_config(),
        &shutdown,
    )
    .unwrap();

    assert!(
        eventually(|| backend.healthy(), Duration::from_secs(3)).await,
        "first successful probe should mark backend healthy"
    );

    healthy.store(false, Ordering::SeqCst);
    assert!(
        eventually(|| !backend.healthy(), Duration::from_secs(3)).await,
        "failing probes should mark backend unhealthy"
    );
    assert!(backend.stats().consecutive_failures > 5);

    healthy.store(true, Ordering::SeqCst);
    assert!(
        eventually(|| backend.healthy(), Duration::from_secs(3)).await,
        "a single success should recover the backend"
    );
    assert_eq!(backend.stats().consecutive_failures, 0);

    backend.close();
    backend.closed().await;
}

#[tokio::test]
async fn test_unreachable_health_url_never_becomes_healthy() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let shutdown = Shutdown::default();
    let backend = Backend::new(
        droplet(1, &format!("http://{addr}/health")),
        &fast_config(),
        &shutdown,
    )
    .unwrap();

    assert!(
        eventually(|| backend.stats().consecutive_failures >= 3, Duration::from_secs(3)).await
    );
    assert!(!backend.healthy());
    backend.close();
}

#[tokio::test]
async fn test_transport_measures_requests() {
    let addr = start_programmable_backend(|path| async move {
        if path == "/fail" {
            (503, "unavailable".into())
        } else {
            (200, "ok".into())
        }
    })
    .await;

    let shutdown = Shutdown::default();
    let mut target = droplet(1, "");
    target.server_host = addr.to_string();
    let backend = Backend::new(target, &fast_config(), &shutdown).unwrap();

    let mut statuses = Vec::new();
    for i in 0..10 {
        let path = if i < 2 { "fail" } else { "ok" };
        let request = Request::builder()
            .uri(format!("http://{}/{}", backend.host(), path))
            .body(Body::empty())
            .unwrap();
        let response = backend.transport().oneshot(request).await.unwrap();
        statuses.push(response.status());
    }

    // Classification never changes what the caller sees.
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::SERVICE_UNAVAILABLE).count(),
        2
    );
    assert_eq!(backend.connections(), 0);

    // The failure-rate average reports once its warm-up period has passed.
    assert!(
        eventually(|| backend.failure_rate() > 0.0, Duration::from_secs(3)).await,
        "errors should reach the failure-rate average"
    );
    assert!(backend.latency() > 0.0);
    assert!(backend.healthy());

    backend.close();
}

#[tokio::test]
async fn test_connection_errors_are_returned_to_caller() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let shutdown = Shutdown::default();
    let backend = Backend::new(droplet(1, ""), &fast_config(), &shutdown).unwrap();

    let request = Request::builder()
        .uri(format!("http://{addr}/"))
        .body(Body::empty())
        .unwrap();
    assert!(backend.transport().oneshot(request).await.is_err());
    assert_eq!(backend.connections(), 0);

    assert!(eventually(|| backend.failure_rate() > 0.0, Duration::from_secs(3)).await);
    backend.close();
}

#[tokio::test]
async fn test_shutdown_is_acknowledged_by_every_monitor() {
    let addr = start_mock_backend("ok").await;
    let path = temp_inventory_path();
    std::fs::write(&path, "untouched").unwrap();

    let shutdown = Shutdown::new(Duration::from_secs(2));
    let inventory = Inventory::new(fast_config(), shutdown.clone());
    inventory.add(droplet(1, &format!("http://{addr}/health"))).unwrap();
    inventory.add(droplet(2, "")).unwrap();
    inventory.add(droplet(3, "")).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(shutdown.trigger().await);
    assert!(shutdown.wait().await, "every monitor should acknowledge");
    assert_eq!(shutdown.acknowledged(), 3);
    for backend in inventory.backends() {
        tokio::time::timeout(Duration::from_secs(1), backend.closed())
            .await
            .expect("monitor exited");
    }

    assert!(matches!(inventory.save(&path), Err(InventoryError::ShuttingDown)));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "untouched");
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_close_interrupts_pending_health_check() {
    let addr = start_silent_backend().await;
    let shutdown = Shutdown::default();
    let backend = Backend::new(
        droplet(1, &format!("http://{addr}/health")),
        &slow_probe_config(),
        &shutdown,
    )
    .unwrap();

    // The first health check is now waiting on a backend that never answers.
    tokio::time::sleep(Duration::from_millis(250)).await;

    let started = tokio::time::Instant::now();
    backend.close();
    tokio::time::timeout(Duration::from_millis(200), backend.closed())
        .await
        .expect("close should be observed within one period");
    assert!(started.elapsed() <= Duration::from_millis(200));
    assert!(!backend.healthy());
}

#[tokio::test]
async fn test_shutdown_interrupts_pending_health_check() {
    let addr = start_silent_backend().await;
    let shutdown = Shutdown::new(Duration::from_secs(1));
    let backend = Backend::new(
        droplet(1, &format!("http://{addr}/health")),
        &slow_probe_config(),
        &shutdown,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;

    let started = tokio::time::Instant::now();
    assert!(shutdown.trigger().await);
    assert!(shutdown.wait().await, "monitor should acknowledge before the timeout");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(shutdown.acknowledged(), 1);

    tokio::time::timeout(Duration::from_millis(200), backend.closed())
        .await
        .expect("monitor exited");
}
