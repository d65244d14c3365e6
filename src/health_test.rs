//! Tests for `HttpHealthProbe` against local test servers.

use crate::health::{DEFAULT_HEALTH_PATH, HealthProbe, HttpHealthProbe, local_health_url};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use std::time::{Duration, Instant};

async fn serve(app: Router) -> u16 {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let port = listener.local_addr().unwrap().port();
  tokio::spawn(async move {
    axum::serve(listener, app).await.unwrap();
  });
  port
}

fn probe(port: u16) -> HttpHealthProbe {
  HttpHealthProbe::new(
    local_health_url(port),
    Duration::from_millis(300),
    Duration::from_millis(500),
  )
  .unwrap()
}

#[test]
fn local_url_points_at_loopback_health_route() {
  assert_eq!(
    local_health_url(8080),
    "http://127.0.0.1:8080/v1/system/health"
  );
}

#[tokio::test]
async fn ok_response_is_healthy() {
  let port = serve(Router::new().route(DEFAULT_HEALTH_PATH, get(|| async { "ok" }))).await;
  assert!(probe(port).check_health().await);
}

#[tokio::test]
async fn non_200_is_unhealthy() {
  let app = Router::new().route(
    DEFAULT_HEALTH_PATH,
    get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
  );
  let port = serve(app).await;
  assert!(!probe(port).check_health().await);

  let port = serve(Router::new()).await;
  assert!(!probe(port).check_health().await, "404 must not count");
}

#[tokio::test]
async fn closed_port_is_unhealthy() {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  let port = listener.local_addr().unwrap().port();
  drop(listener);
  assert!(!probe(port).check_health().await);
}

#[tokio::test]
async fn slow_endpoint_is_cut_off() {
  let app = Router::new().route(
    DEFAULT_HEALTH_PATH,
    get(|| async {
      tokio::time::sleep(Duration::from_secs(10)).await;
      "late"
    }),
  );
  let port = serve(app).await;
  let started = Instant::now();
  assert!(!probe(port).check_health().await);
  assert!(started.elapsed() < Duration::from_secs(2));
}
