//! End-to-end scheduling flow: a mock-backed agent publishes a node record,
//! then the extender filters, scores and binds against it over HTTP.

use axum::body::Body;
use hcs_agent::{Agent, AgentConfig};
use hcs_calculator::Calculator;
use hcs_core::{ComputeNodeStore, MemoryStore, NodePhase};
use hcs_detector::MockDetector;
use hcs_extender::plugin::ComputePlugin;
use hcs_extender::reservation::ReservationTable;
use hcs_extender::server::build_router;
use http::{Request, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

const GIB: u64 = 1 << 30;

async fn publish_node(store: &Arc<dyn ComputeNodeStore>, node_name: &str) {
    let config = AgentConfig {
        node_name: node_name.to_string(),
        collect_interval: Duration::from_secs(30),
        report_interval: Duration::from_secs(60),
    };
    let agent = Agent::new(config, Arc::new(MockDetector::default()), store.clone());
    agent.collect_once().await.unwrap();
    agent.report_once().await.unwrap();
}

fn scheduling_pod(name: &str, vram: &str) -> Value {
    json!({
        "metadata": { "name": name, "namespace": "default" },
        "spec": { "containers": [{
            "name": "main",
            "resources": { "requests": {
                "ai.compute/vram": vram,
                "ai.compute/tflops-fp16": "100"
            }}
        }]}
    })
}

async fn post(router: &axum::Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn agent_record_drives_filter_prioritize_bind() {
    let store: Arc<dyn ComputeNodeStore> = Arc::new(MemoryStore::new());
    publish_node(&store, "node-a").await;

    // The agent's record must be schedulable as published.
    let record = store.get("node-a").await.unwrap();
    assert_eq!(record.phase(), NodePhase::Ready);
    assert_eq!(record.spec.total_capacity.vram, 160 * GIB);

    let plugin = Arc::new(ComputePlugin::new(
        store,
        Arc::new(Calculator::new()),
        Arc::new(ReservationTable::new()),
    ));
    let router = build_router(plugin.clone());

    // Filter keeps the node, drops an unknown one.
    let (status, value) = post(
        &router,
        "/filter",
        json!({
            "pod": scheduling_pod("train-1", "16Gi"),
            "nodenames": ["node-a", "node-b"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["nodenames"], json!(["node-a"]));
    assert!(value["failedAndUnresolvableNodes"]["node-b"].is_string());

    // Prioritize returns an in-range score for the survivor.
    let (status, value) = post(
        &router,
        "/prioritize",
        json!({
            "pod": scheduling_pod("train-1", "16Gi"),
            "nodenames": ["node-a"]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let score = value[0]["score"].as_i64().unwrap();
    assert!((0..=100).contains(&score));

    // Bind commits the reservation.
    let (status, _) = post(
        &router,
        "/bind",
        json!({
            "pod": scheduling_pod("train-1", "16Gi"),
            "nodeName": "node-a"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plugin.reservations().reserved_vram("node-a"), 16 * GIB);

    // A request larger than what remains is rejected at bind time even
    // though the record alone would admit it.
    let (status, value) = post(
        &router,
        "/bind",
        json!({
            "pod": scheduling_pod("train-2", "150Gi"),
            "nodeName": "node-a"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(value["error"].as_str().unwrap().contains("reserve"));
    assert_eq!(plugin.reservations().count("node-a"), 1);
}
