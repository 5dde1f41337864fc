//! The agent's collect and report loops.

use crate::collector::{Collector, Metrics, default_collectors, run_pipeline};
use crate::error::{AgentError, Result};
use crate::reporter;
use hcs_core::ComputeNodeStore;
use hcs_detector::{DetectorOutput, HardwareDetector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub node_name: String,
    pub collect_interval: Duration,
    pub report_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            node_name: "unknown".to_string(),
            collect_interval: Duration::from_secs(30),
            report_interval: Duration::from_secs(60),
        }
    }
}

/// The per-node inventory agent.
///
/// Holds the latest metrics snapshot behind a read/write lock: the collect
/// loop is the single writer, the report loop and any external reader take
/// read locks. `stop` cancels both loops, waits for them to drain, then
/// closes the detector exactly once.
pub struct Agent {
    config: AgentConfig,
    detector: Arc<dyn HardwareDetector>,
    store: Arc<dyn ComputeNodeStore>,
    collectors: Vec<Box<dyn Collector>>,
    snapshot: Arc<RwLock<Option<Metrics>>>,
    stop: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        detector: Arc<dyn HardwareDetector>,
        store: Arc<dyn ComputeNodeStore>,
    ) -> Self {
        Agent {
            config,
            detector,
            store,
            collectors: default_collectors(),
            snapshot: Arc::new(RwLock::new(None)),
            stop: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// The latest good snapshot, if any collection has succeeded yet.
    pub async fn snapshot(&self) -> Option<Metrics> {
        self.snapshot.read().await.clone()
    }

    /// Run one collection tick: observe the detector, run the pipeline, and
    /// atomically replace the snapshot. A failed observation or a failed
    /// collector keeps the prior snapshot.
    pub async fn collect_once(&self) -> Result<()> {
        let detection = self.detector.detect().await?;
        let devices = if detection.driver_available {
            self.detector.devices().await?
        } else {
            Vec::new()
        };
        let topology = match self.detector.topology().await {
            Ok(topology) => Some(topology),
            Err(e) => {
                warn!(error = %e, "topology unavailable, continuing without it");
                None
            }
        };

        let observation = DetectorOutput {
            detection,
            devices,
            topology,
        };
        let metrics = run_pipeline(&self.collectors, &observation)?;
        *self.snapshot.write().await = Some(metrics);
        debug!("snapshot replaced");
        Ok(())
    }

    /// Run one report tick from the latest snapshot.
    pub async fn report_once(&self) -> Result<()> {
        let snapshot = self.snapshot.read().await.clone();
        match snapshot {
            Some(metrics) => reporter::report(&self.store, &self.config.node_name, &metrics).await,
            None => {
                debug!("no snapshot yet, skipping report");
                Ok(())
            }
        }
    }

    /// Spawn the collect and report loops.
    pub async fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().await;

        let agent = self.clone();
        let cancel = self.stop.child_token();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(agent.config.collect_interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = agent.collect_once().await {
                            warn!(error = %e, "collection failed, keeping prior snapshot");
                        }
                    }
                }
            }
            debug!("collect loop drained");
        }));

        let agent = self.clone();
        let cancel = self.stop.child_token();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(agent.config.report_interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = agent.report_once().await {
                            warn!(error = %e, "report failed, retrying next tick");
                        }
                    }
                }
            }
            debug!("report loop drained");
        }));

        info!(
            node = %self.config.node_name,
            detector = self.detector.name(),
            "agent started"
        );
    }

    /// Stop both loops, wait for them to drain, then close the detector.
    pub async fn stop(&self) -> Result<()> {
        self.stop.cancel();
        let mut handles = self.handles.lock().await;
        if handles.is_empty() {
            return Err(AgentError::AlreadyStopped);
        }
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        self.detector.close().await?;
        info!(node = %self.config.node_name, "agent stopped");
        Ok(())
    }
}
