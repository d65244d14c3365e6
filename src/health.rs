//! Liveness probe against the workload's loopback health endpoint.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Path of the workload's health route.
pub const DEFAULT_HEALTH_PATH: &str = "/v1/system/health";
/// Port the workload binds on loopback.
pub const DEFAULT_PORT: u16 = 8080;
/// Upper bound for one HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound for a whole probe, connection setup included.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Bounded health check. Implementations never fail: anything but healthy is `false`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
  async fn check_health(&self) -> bool;
}

/// `GET {url}`; healthy means status 200.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
  client: reqwest::Client,
  url: String,
  probe_timeout: Duration,
}

/// Loopback health URL for `port`.
pub fn local_health_url(port: u16) -> String {
  format!("http://127.0.0.1:{}{}", port, DEFAULT_HEALTH_PATH)
}

impl HttpHealthProbe {
  pub fn new(
    url: impl Into<String>,
    request_timeout: Duration,
    probe_timeout: Duration,
  ) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .timeout(request_timeout)
      .connect_timeout(request_timeout)
      .no_proxy()
      .build()?;
    Ok(Self {
      client,
      url: url.into(),
      probe_timeout,
    })
  }

  /// Probe for the workload's default route on `port` with default timeouts.
  pub fn local(port: u16) -> Result<Self, reqwest::Error> {
    Self::new(
      local_health_url(port),
      DEFAULT_REQUEST_TIMEOUT,
      DEFAULT_PROBE_TIMEOUT,
    )
  }

  pub fn url(&self) -> &str {
    &self.url
  }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
  #[instrument(level = "trace", skip(self), fields(url = %self.url))]
  async fn check_health(&self) -> bool {
    match tokio::time::timeout(self.probe_timeout, self.client.get(&self.url).send()).await {
      Ok(Ok(resp)) => {
        let healthy = resp.status() == reqwest::StatusCode::OK;
        if !healthy {
          debug!(status = %resp.status(), "health endpoint not ready");
        }
        healthy
      }
      Ok(Err(e)) => {
        debug!(error = %e, "health request failed");
        false
      }
      Err(_) => {
        debug!(timeout_ms = self.probe_timeout.as_millis() as u64, "health probe timed out");
        false
      }
    }
  }
}
