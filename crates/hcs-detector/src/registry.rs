//! Probe registry and first-available selection.

use crate::detector::HardwareDetector;
use crate::error::{DetectorError, Result};
use crate::mock::MockDetector;
use std::sync::Arc;
use tracing::{info, warn};

/// Holds the registered hardware probes in registration order.
#[derive(Default)]
pub struct DetectorRegistry {
    probes: Vec<Arc<dyn HardwareDetector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        DetectorRegistry::default()
    }

    pub fn register(&mut self, probe: Arc<dyn HardwareDetector>) {
        info!(probe = probe.name(), "registering hardware probe");
        self.probes.push(probe);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn HardwareDetector>> {
        self.probes
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| DetectorError::UnknownDetector(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// Pick the probe the agent should run with.
    ///
    /// Selection order: an explicit mock request wins; otherwise the first
    /// registered non-mock probe whose `detect` reports an available driver;
    /// otherwise a degraded mock so the agent can still report an unhealthy
    /// record.
    pub async fn select(&self, force_mock: bool) -> Arc<dyn HardwareDetector> {
        if force_mock {
            if let Ok(mock) = self.get("mock") {
                return mock;
            }
            return Arc::new(MockDetector::default());
        }

        for probe in self.probes.iter().filter(|p| p.name() != "mock") {
            match probe.detect().await {
                Ok(detection) if detection.driver_available => {
                    info!(
                        probe = probe.name(),
                        vendor = %detection.vendor,
                        driver = %detection.driver_version,
                        "selected hardware probe"
                    );
                    return probe.clone();
                }
                Ok(_) => {
                    info!(probe = probe.name(), "probe found no driver, skipping");
                }
                Err(e) => {
                    warn!(probe = probe.name(), error = %e, "probe failed, skipping");
                }
            }
        }

        warn!("no probe reported an available driver, falling back to degraded mock");
        Arc::new(MockDetector::degraded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detection;
    use crate::error::Result as DetResult;
    use crate::mock::MockConfig;
    use async_trait::async_trait;
    use hcs_core::{DeviceRecord, Topology, Vendor};

    struct NoDriverProbe;

    #[async_trait]
    impl HardwareDetector for NoDriverProbe {
        fn name(&self) -> &str {
            "nvidia"
        }
        async fn detect(&self) -> DetResult<Detection> {
            Ok(Detection {
                vendor: Vendor::Nvidia,
                driver_available: false,
                driver_version: String::new(),
            })
        }
        async fn devices(&self) -> DetResult<Vec<DeviceRecord>> {
            Ok(vec![])
        }
        async fn topology(&self) -> DetResult<Topology> {
            Ok(Topology::default())
        }
        async fn close(&self) -> DetResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn force_mock_wins() {
        let mut registry = DetectorRegistry::new();
        registry.register(Arc::new(NoDriverProbe));
        registry.register(Arc::new(MockDetector::default()));
        let selected = registry.select(true).await;
        assert_eq!(selected.name(), "mock");
    }

    #[tokio::test]
    async fn first_available_probe_wins() {
        let mut registry = DetectorRegistry::new();
        registry.register(Arc::new(NoDriverProbe));
        let available = Arc::new(MockDetector::new(MockConfig {
            vendor: Vendor::Huawei,
            ..MockConfig::default()
        }));
        // A second, driver-available probe under a non-mock name.
        struct Named(Arc<MockDetector>);
        #[async_trait]
        impl HardwareDetector for Named {
            fn name(&self) -> &str {
                "huawei"
            }
            async fn detect(&self) -> DetResult<Detection> {
                self.0.detect().await
            }
            async fn devices(&self) -> DetResult<Vec<DeviceRecord>> {
                self.0.devices().await
            }
            async fn topology(&self) -> DetResult<Topology> {
                self.0.topology().await
            }
            async fn close(&self) -> DetResult<()> {
                self.0.close().await
            }
        }
        registry.register(Arc::new(Named(available)));

        let selected = registry.select(false).await;
        assert_eq!(selected.name(), "huawei");
    }

    #[tokio::test]
    async fn falls_back_to_degraded_mock() {
        let mut registry = DetectorRegistry::new();
        registry.register(Arc::new(NoDriverProbe));
        let selected = registry.select(false).await;
        assert_eq!(selected.name(), "mock");
        let detection = selected.detect().await.unwrap();
        assert!(!detection.driver_available);
    }

    #[tokio::test]
    async fn get_unknown_is_an_error() {
        let registry = DetectorRegistry::new();
        assert!(matches!(
            registry.get("nvidia"),
            Err(DetectorError::UnknownDetector(_))
        ));
    }
}
