//! HTTP front door for `webtierd run`.
//!
//! Every request is routed by the listener rules. Fixed responses are
//! answered directly. Forwards are answered with the routing decision as
//! JSON (bytes are not proxied) and count toward the fleet's load.
//!
//! Instances report CPU utilization with
//! `PUT /_webtier/members/{target_group}/{instance_id}/cpu` and a body of
//! `{"percent": 42.5}`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use webtier_metrics::MetricsCollector;
use webtier_routing::{MeteredRouter, RouteDecision, Routed};

#[derive(Clone)]
pub struct FrontDoor {
    router: Arc<MeteredRouter>,
    metrics: Arc<MetricsCollector>,
}

#[derive(Debug, Deserialize)]
struct CpuSample {
    percent: f64,
}

impl FrontDoor {
    pub fn new(router: MeteredRouter, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            router: Arc::new(router),
            metrics,
        }
    }

    pub fn build_router(self) -> axum::Router {
        axum::Router::new()
            .route(
                "/_webtier/members/{target_group}/{instance_id}/cpu",
                put(report_cpu),
            )
            .fallback(serve_request)
            .with_state(self)
    }

    /// Serve until the shutdown signal flips.
    pub async fn serve(
        self,
        addr: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, "front door listening");

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await?;

        info!("front door stopped");
        Ok(())
    }
}

async fn serve_request(State(door): State<FrontDoor>, uri: Uri) -> Response {
    let path = uri.path();
    match door.router.route(path).await {
        Ok(Routed {
            decision:
                RouteDecision::FixedResponse {
                    status_code,
                    content_type,
                    body,
                    ..
                },
            ..
        }) => {
            let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::OK);
            (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Ok(Routed { decision, lease }) => {
            let response = Json(decision).into_response();
            if let Some(lease) = lease {
                door.router.finish(lease).await;
            }
            response
        }
        Err(e) => {
            debug!(path, error = %e, "request not routable");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

async fn report_cpu(
    State(door): State<FrontDoor>,
    Path((target_group, instance_id)): Path<(String, String)>,
    Json(sample): Json<CpuSample>,
) -> StatusCode {
    match door
        .metrics
        .ingest_cpu(&target_group, &instance_id, sample.percent)
        .await
    {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            warn!(%target_group, %instance_id, error = %e, "cpu sample rejected");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
