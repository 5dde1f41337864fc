//! The extender's HTTP surface.
//!
//! Three POST endpoints map onto the plugin operations; each request gets a
//! fresh cycle state, so a bypassed PreFilter (opaque pod) simply reads as
//! an absent request downstream.

use crate::api::{ExtenderArgs, ExtenderBindingArgs, ExtenderFilterResult, HostPriority};
use crate::error::{ExtenderError, Result};
use crate::framework::{Code, CycleState};
use crate::plugin::ComputePlugin;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the axum router over a shared plugin.
pub fn build_router(plugin: Arc<ComputePlugin>) -> Router {
    Router::new()
        .route("/filter", post(handle_filter))
        .route("/prioritize", post(handle_prioritize))
        .route("/bind", post(handle_bind))
        .route("/healthz", get(health_check))
        .with_state(plugin)
}

/// Bind the HTTP surface and serve until `shutdown` resolves.
pub async fn serve(
    plugin: Arc<ComputePlugin>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = build_router(plugin);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "extender listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ExtenderError::Server(e.to_string()))
}

async fn health_check() -> &'static str {
    "ok"
}

async fn handle_filter(
    State(plugin): State<Arc<ComputePlugin>>,
    Json(args): Json<ExtenderArgs>,
) -> Json<ExtenderFilterResult> {
    let mut state = CycleState::new();
    let pre = plugin.pre_filter(&mut state, &args.pod);
    if pre.code() == Code::Error {
        warn!(status = %pre, "prefilter failed");
        return Json(ExtenderFilterResult {
            error: Some(pre.message().to_string()),
            ..Default::default()
        });
    }

    let mut result = ExtenderFilterResult::default();
    let mut survivors = Vec::new();
    for name in args.candidate_names() {
        let status = plugin.filter(&state, &args.pod, &name).await;
        match status.code() {
            Code::Success => survivors.push(name),
            Code::Unschedulable => {
                result.failed_nodes.insert(name, status.message().to_string());
            }
            Code::UnschedulableAndUnresolvable => {
                result
                    .failed_and_unresolvable_nodes
                    .insert(name, status.message().to_string());
            }
            // Per-node isolation: an internal failure removes only this
            // node from the cycle.
            Code::Error => {
                result.failed_nodes.insert(name, status.message().to_string());
            }
        }
    }

    // Mirror the input form.
    if args.nodenames.is_some() {
        result.nodenames = Some(survivors);
    } else if let Some(list) = args.nodes {
        let items = list
            .items
            .into_iter()
            .filter(|n| {
                n.metadata
                    .name
                    .as_ref()
                    .is_some_and(|name| survivors.contains(name))
            })
            .collect();
        result.nodes = Some(k8s_openapi::List {
            items,
            metadata: list.metadata,
        });
    } else {
        result.nodenames = Some(survivors);
    }
    Json(result)
}

async fn handle_prioritize(
    State(plugin): State<Arc<ComputePlugin>>,
    Json(args): Json<ExtenderArgs>,
) -> Json<Vec<HostPriority>> {
    let mut state = CycleState::new();
    let pre = plugin.pre_filter(&mut state, &args.pod);
    if pre.code() == Code::Error {
        warn!(status = %pre, "prefilter failed, returning zero scores");
    }

    let mut scores = Vec::new();
    for name in args.candidate_names() {
        let score = plugin.score(&state, &args.pod, &name).await;
        scores.push((name, score));
    }
    ComputePlugin::normalize_scores(&mut scores);

    Json(
        scores
            .into_iter()
            .map(|(host, score)| HostPriority { host, score })
            .collect(),
    )
}

async fn handle_bind(
    State(plugin): State<Arc<ComputePlugin>>,
    Json(args): Json<ExtenderBindingArgs>,
) -> impl IntoResponse {
    let mut state = CycleState::new();
    let pre = plugin.pre_filter(&mut state, &args.pod);
    if pre.code() == Code::Error {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": pre.message() })),
        );
    }

    let status = plugin.reserve(&state, &args.pod, &args.node_name).await;
    match status.code() {
        Code::Success => {
            info!(node = %args.node_name, "bind reserved capacity");
            (StatusCode::OK, Json(json!({ "status": "ok" })))
        }
        Code::Unschedulable => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": status.message() })),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": status.message() })),
        ),
    }
}
