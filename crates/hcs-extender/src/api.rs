//! Wire types for the scheduler-extender protocol.
//!
//! Field names follow the upstream extender v1 JSON contract; either a full
//! node list or a bare name list may arrive, and the response mirrors
//! whichever form the request used.

use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node name → human-readable failure reason.
pub type FailedNodesMap = BTreeMap<String, String>;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtenderArgs {
    pub pod: Pod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<k8s_openapi::List<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodenames: Option<Vec<String>>,
}

impl ExtenderArgs {
    /// Candidate node names regardless of which form the caller used.
    pub fn candidate_names(&self) -> Vec<String> {
        if let Some(names) = &self.nodenames {
            return names.clone();
        }
        self.nodes
            .as_ref()
            .map(|list| {
                list.items
                    .iter()
                    .filter_map(|n| n.metadata.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtenderFilterResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<k8s_openapi::List<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodenames: Option<Vec<String>>,
    #[serde(
        rename = "failedNodes",
        default,
        skip_serializing_if = "FailedNodesMap::is_empty"
    )]
    pub failed_nodes: FailedNodesMap,
    #[serde(
        rename = "failedAndUnresolvableNodes",
        default,
        skip_serializing_if = "FailedNodesMap::is_empty"
    )]
    pub failed_and_unresolvable_nodes: FailedNodesMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of the prioritize response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPriority {
    pub host: String,
    pub score: i64,
}

/// Body of the bind call: the pod and the node the driver selected.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtenderBindingArgs {
    pub pod: Pod,
    pub node_name: String,
}
