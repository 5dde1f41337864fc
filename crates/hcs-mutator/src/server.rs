//! The admission HTTP surface.
//!
//! Decodes the admission-review envelope, runs vendor injection followed by
//! quota injection, and answers with a JSON patch against the original pod.
//! TLS is terminated outside this process.

use crate::error::MutatorError;
use crate::profile::ProfileRegistry;
use crate::quota::{self, QuotaConfig};
use crate::validate::validate_single_vendor;
use crate::vendor::{inject_vendor, needs_injection, resolve_vendor};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hcs_core::Vendor;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::Api;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct MutatorState {
    pub registry: Arc<ProfileRegistry>,
    pub quota: QuotaConfig,
    pub default_vendor: Option<Vendor>,
    pub skip_containers: Vec<String>,
    /// Used to read the scheduled node's labels; label-based vendor
    /// resolution is skipped when absent.
    pub client: Option<kube::Client>,
}

pub fn build_router(state: Arc<MutatorState>) -> Router {
    Router::new()
        .route("/mutate-v1-pod", post(handle_mutate))
        .route("/validate-v1-pod", post(handle_validate))
        .route("/healthz", get(health_check))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn node_labels(state: &MutatorState, pod: &Pod) -> BTreeMap<String, String> {
    let Some(client) = &state.client else {
        return BTreeMap::new();
    };
    let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) else {
        return BTreeMap::new();
    };
    let nodes: Api<Node> = Api::all(client.clone());
    match nodes.get(node_name).await {
        Ok(node) => node.metadata.labels.unwrap_or_default(),
        Err(e) => {
            warn!(node = node_name, error = %e, "node label lookup failed");
            BTreeMap::new()
        }
    }
}

fn bad_request(detail: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        format!("malformed admission request: {detail}"),
    )
        .into_response()
}

async fn handle_mutate(
    State(state): State<Arc<MutatorState>>,
    Json(review): Json<AdmissionReview<Pod>>,
) -> Response {
    let request: AdmissionRequest<Pod> = match review.try_into() {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };
    let Some(pod) = request.object.clone() else {
        return bad_request("no pod object attached");
    };
    let response = AdmissionResponse::from(&request);

    if !needs_injection(&pod) {
        debug!(pod = pod.metadata.name.as_deref().unwrap_or(""), "no injection needed");
        return Json(response.into_review()).into_response();
    }

    let labels = node_labels(&state, &pod).await;
    let vendor = resolve_vendor(&pod, &labels, state.default_vendor.as_ref());

    let mut mutated = pod.clone();
    if let Some(vendor) = &vendor {
        let Some(profile) = state.registry.get(vendor) else {
            warn!(vendor = %vendor, "no runtime profile registered");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                MutatorError::ProfileNotFound(vendor.to_string()).to_string(),
            )
                .into_response();
        };
        let result = inject_vendor(&mut mutated, &profile, &state.skip_containers);
        info!(
            pod = pod.metadata.name.as_deref().unwrap_or(""),
            vendor = %vendor,
            env_added = result.env_added,
            volumes_added = result.volumes_added,
            "vendor environment injected"
        );
    } else {
        warn!("no vendor resolved, skipping vendor injection");
    }

    // Quota injection runs after vendor injection; its failures are logged
    // and the vendor result still ships.
    if quota::should_inject(&mutated) {
        if let Err(e) = quota::inject_quota(&mut mutated, &state.quota, &state.skip_containers) {
            warn!(error = %e, "quota injection failed, returning vendor result only");
        }
    }

    let (original, patched) = match (serde_json::to_value(&pod), serde_json::to_value(&mutated)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), _) | (_, Err(e)) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    let patch = json_patch::diff(&original, &patched);
    match response.with_patch(patch) {
        Ok(response) => Json(response.into_review()).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn handle_validate(Json(review): Json<AdmissionReview<Pod>>) -> Response {
    let request: AdmissionRequest<Pod> = match review.try_into() {
        Ok(request) => request,
        Err(e) => return bad_request(e),
    };
    let Some(pod) = request.object.clone() else {
        return bad_request("no pod object attached");
    };
    let response = AdmissionResponse::from(&request);
    match validate_single_vendor(&pod) {
        Ok(()) => Json(response.into_review()).into_response(),
        Err(reason) => Json(response.deny(reason).into_review()).into_response(),
    }
}
