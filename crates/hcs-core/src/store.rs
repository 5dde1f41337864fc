//! Node-record storage.
//!
//! The agent writes `ComputeNode` records, the extender reads them. In a
//! cluster both go through [`KubeStore`]; tests and local runs use
//! [`MemoryStore`]. Conflicts surface as [`StoreError::Conflict`] so callers
//! can lean on the API server's optimistic concurrency and retry on their
//! next tick.

use crate::record::{ComputeNode, ComputeNodeSpec, ComputeNodeStatus};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams, PostParams};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("compute node {0:?} not found")]
    NotFound(String),

    #[error("conflicting update for compute node {0:?}")]
    Conflict(String),

    #[error("compute node {0:?} already exists")]
    AlreadyExists(String),

    #[error("api error: {0}")]
    Api(#[from] kube::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Access to the cluster-scoped `ComputeNode` records.
#[async_trait]
pub trait ComputeNodeStore: Send + Sync + 'static {
    async fn get(&self, name: &str) -> StoreResult<ComputeNode>;

    async fn create(&self, node: &ComputeNode) -> StoreResult<()>;

    /// Replace the spec of an existing record.
    async fn update_spec(&self, name: &str, spec: &ComputeNodeSpec) -> StoreResult<()>;

    /// Replace the status of an existing record.
    async fn update_status(&self, name: &str, status: &ComputeNodeStatus) -> StoreResult<()>;

    async fn delete(&self, name: &str) -> StoreResult<()>;

    async fn list(&self) -> StoreResult<Vec<ComputeNode>>;
}

/// Kubernetes-backed store over the `computenodes.hetero.zrs.io` API.
#[derive(Clone)]
pub struct KubeStore {
    api: Api<ComputeNode>,
}

impl KubeStore {
    pub fn new(client: kube::Client) -> Self {
        KubeStore {
            api: Api::all(client),
        }
    }

    fn map_err(name: &str, err: kube::Error) -> StoreError {
        if let kube::Error::Api(response) = &err {
            match response.code {
                404 => return StoreError::NotFound(name.to_string()),
                409 => return StoreError::Conflict(name.to_string()),
                _ => {}
            }
        }
        StoreError::Api(err)
    }
}

#[async_trait]
impl ComputeNodeStore for KubeStore {
    async fn get(&self, name: &str) -> StoreResult<ComputeNode> {
        self.api.get(name).await.map_err(|e| Self::map_err(name, e))
    }

    async fn create(&self, node: &ComputeNode) -> StoreResult<()> {
        let name = node.metadata.name.clone().unwrap_or_default();
        match self.api.create(&PostParams::default(), node).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 409 => {
                Err(StoreError::AlreadyExists(name))
            }
            Err(e) => Err(Self::map_err(&name, e)),
        }
    }

    async fn update_spec(&self, name: &str, spec: &ComputeNodeSpec) -> StoreResult<()> {
        let patch = json!({ "spec": spec });
        self.api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Self::map_err(name, e))?;
        Ok(())
    }

    async fn update_status(&self, name: &str, status: &ComputeNodeStatus) -> StoreResult<()> {
        let patch = json!({ "status": status });
        self.api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| Self::map_err(name, e))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        self.api
            .delete(name, &Default::default())
            .await
            .map_err(|e| Self::map_err(name, e))?;
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<ComputeNode>> {
        let list = self.api.list(&Default::default()).await?;
        Ok(list.items)
    }
}

/// In-memory store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<String, ComputeNode>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl ComputeNodeStore for MemoryStore {
    async fn get(&self, name: &str) -> StoreResult<ComputeNode> {
        self.nodes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn create(&self, node: &ComputeNode) -> StoreResult<()> {
        let name = node
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| node.spec.node_name.clone());
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&name) {
            return Err(StoreError::AlreadyExists(name));
        }
        nodes.insert(name, node.clone());
        Ok(())
    }

    async fn update_spec(&self, name: &str, spec: &ComputeNodeSpec) -> StoreResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        node.spec = spec.clone();
        Ok(())
    }

    async fn update_status(&self, name: &str, status: &ComputeNodeStatus) -> StoreResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        node.status = Some(status.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        self.nodes
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<ComputeNode>> {
        Ok(self.nodes.read().values().cloned().collect())
    }
}
