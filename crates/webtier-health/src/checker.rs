//! Health check probe logic.
//!
//! `HealthTracker` turns a stream of probe results into target health
//! transitions. `http_probe` performs one HTTP check.

use std::time::Duration;

use tracing::{debug, info, warn};

use webtier_core::{HealthCheckSpec, SuccessCodes};
use webtier_state::TargetHealth;

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint answered with a status inside the success range.
    Success,
    /// The endpoint answered with a status outside the success range.
    BadStatus(u16),
    /// The probe could not complete (connection error or timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeResult::Success)
    }
}

/// A health change reported by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TargetHealth,
    pub to: TargetHealth,
}

/// Tracks consecutive probe results for a single target.
#[derive(Debug)]
pub struct HealthTracker {
    health: TargetHealth,
    consecutive_successes: u32,
    consecutive_failures: u32,
    /// Successes needed to become Healthy.
    healthy_threshold: u32,
    /// Failures needed to become Unhealthy.
    unhealthy_threshold: u32,
}

impl HealthTracker {
    /// A tracker for a freshly registered target.
    pub fn new(spec: &HealthCheckSpec) -> Self {
        Self::with_thresholds(spec.healthy_threshold, spec.unhealthy_threshold)
    }

    pub fn with_thresholds(healthy_threshold: u32, unhealthy_threshold: u32) -> Self {
        Self {
            health: TargetHealth::Initial,
            consecutive_successes: 0,
            consecutive_failures: 0,
            healthy_threshold: healthy_threshold.max(1),
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    /// A tracker picking up from a persisted health value.
    pub fn resume(spec: &HealthCheckSpec, health: TargetHealth) -> Self {
        Self {
            health,
            ..Self::new(spec)
        }
    }

    /// Record a probe result. Returns the transition it caused, if any.
    ///
    /// A transition is reported once, at the probe that crosses the
    /// threshold; further results in the same direction report nothing.
    pub fn record(&mut self, result: ProbeResult) -> Option<Transition> {
        if self.health == TargetHealth::Draining {
            return None;
        }

        if result.is_success() {
            self.consecutive_failures = 0;
            self.consecutive_successes = self.consecutive_successes.saturating_add(1);

            if self.health != TargetHealth::Healthy
                && self.consecutive_successes >= self.healthy_threshold
            {
                info!(
                    successes = self.consecutive_successes,
                    from = ?self.health,
                    "target became healthy"
                );
                return Some(self.transition_to(TargetHealth::Healthy));
            }
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);

            if self.health != TargetHealth::Unhealthy
                && self.consecutive_failures >= self.unhealthy_threshold
            {
                warn!(
                    failures = self.consecutive_failures,
                    threshold = self.unhealthy_threshold,
                    from = ?self.health,
                    ?result,
                    "target marked unhealthy"
                );
                return Some(self.transition_to(TargetHealth::Unhealthy));
            }
        }

        None
    }

    /// Move the target to Draining. Later results are ignored.
    pub fn mark_draining(&mut self) -> Option<Transition> {
        if self.health == TargetHealth::Draining {
            return None;
        }
        Some(self.transition_to(TargetHealth::Draining))
    }

    fn transition_to(&mut self, to: TargetHealth) -> Transition {
        let from = self.health;
        self.health = to;
        Transition { from, to }
    }

    pub fn health(&self) -> TargetHealth {
        self.health
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }
}

/// Perform one HTTP GET health check against `{address}{path}`.
///
/// A status inside `success_codes` is a success. Timeouts and connection
/// errors are `Failed`.
pub async fn http_probe(
    address: &str,
    path: &str,
    timeout: Duration,
    success_codes: SuccessCodes,
) -> ProbeResult {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", address)
            .header("user-agent", "webtier-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "health probe request invalid");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if success_codes.contains(status) {
                    ProbeResult::Success
                } else {
                    debug!(status, %uri, "health probe status outside success range");
                    ProbeResult::BadStatus(status)
                }
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%uri, "health probe timed out");
            ProbeResult::Failed
        }
    }
}
