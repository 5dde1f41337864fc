//! VRAM-quota injection.
//!
//! Pods requesting `ai.compute/vram` get the in-process memory interceptor
//! preloaded. The shim enforces the quota cooperatively inside the
//! container; this module only wires up its environment, volume and
//! annotations, and must assume nothing about enforcement.

use crate::annotations;
use crate::error::Result;
use crate::vendor::InjectionResult;
use hcs_core::request::{RESOURCE_VRAM, all_resource_names, max_vram_quantity};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, HostPathVolumeSource, Pod, Volume, VolumeMount,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Well-known name of the pod-level shim volume and its container mounts.
pub const SHIM_VOLUME_NAME: &str = "hcs-vram-shim";

#[derive(Clone, Debug)]
pub struct QuotaConfig {
    /// Container path of the interceptor library, used for `LD_PRELOAD`.
    pub interceptor_path: String,
    /// Host directory holding the shim library.
    pub shim_host_dir: String,
    /// Where the shim directory is mounted inside the container.
    pub shim_mount_path: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        QuotaConfig {
            interceptor_path: "/opt/hcs/lib/libhcs-vram-interceptor.so".to_string(),
            shim_host_dir: "/opt/hcs/lib".to_string(),
            shim_mount_path: "/opt/hcs/lib".to_string(),
        }
    }
}

/// Whether quota injection applies: an `ai.compute/vram` request anywhere,
/// unless force-disabled by annotation.
pub fn should_inject(pod: &Pod) -> bool {
    let forced_off = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::VRAM_INJECT))
        .is_some_and(|v| v == "false");
    if forced_off {
        return false;
    }
    all_resource_names(pod).contains(RESOURCE_VRAM)
}

/// The quota value: the override annotation when set, else the largest
/// `ai.compute/vram` quantity across containers, in its original string
/// form.
pub fn quota_value(pod: &Pod) -> Result<Option<String>> {
    if let Some(value) = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::VRAM_QUOTA))
    {
        return Ok(Some(value.clone()));
    }
    Ok(max_vram_quantity(pod)?)
}

fn ensure_preload(container: &mut Container, interceptor: &str) -> bool {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == "LD_PRELOAD") {
        None => {
            env.push(EnvVar {
                name: "LD_PRELOAD".to_string(),
                value: Some(interceptor.to_string()),
                ..Default::default()
            });
            true
        }
        Some(existing) => {
            let current = existing.value.clone().unwrap_or_default();
            if current.contains(interceptor) {
                return false;
            }
            existing.value = Some(if current.is_empty() {
                interceptor.to_string()
            } else {
                format!("{interceptor}:{current}")
            });
            true
        }
    }
}

fn set_env(container: &mut Container, name: &str, value: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == name) {
        Some(existing) => existing.value = Some(value.to_string()),
        None => env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }),
    }
}

/// Apply quota injection. Returns `Ok(None)` when the pod carries no usable
/// quota value. Idempotent.
pub fn inject_quota(
    pod: &mut Pod,
    config: &QuotaConfig,
    skip_containers: &[String],
) -> Result<Option<InjectionResult>> {
    let Some(quota) = quota_value(pod)? else {
        return Ok(None);
    };
    let mut result = InjectionResult::default();

    if let Some(spec) = pod.spec.as_mut() {
        let containers = spec
            .containers
            .iter_mut()
            .chain(spec.init_containers.iter_mut().flatten());
        for container in containers {
            if skip_containers.contains(&container.name) {
                continue;
            }
            if ensure_preload(container, &config.interceptor_path) {
                result.env_added += 1;
            }
            set_env(container, "HCS_VRAM_QUOTA", &quota);

            let already_mounted = container
                .volume_mounts
                .as_ref()
                .is_some_and(|m| m.iter().any(|m| m.name == SHIM_VOLUME_NAME));
            if !already_mounted {
                container
                    .volume_mounts
                    .get_or_insert_with(Vec::new)
                    .push(VolumeMount {
                        name: SHIM_VOLUME_NAME.to_string(),
                        mount_path: config.shim_mount_path.clone(),
                        read_only: Some(true),
                        ..Default::default()
                    });
                result.mounts_added += 1;
            }
        }

        let volumes = spec.volumes.get_or_insert_with(Vec::new);
        if !volumes.iter().any(|v| v.name == SHIM_VOLUME_NAME) {
            volumes.push(Volume {
                name: SHIM_VOLUME_NAME.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: config.shim_host_dir.clone(),
                    type_: Some("Directory".to_string()),
                }),
                ..Default::default()
            });
            result.volumes_added += 1;
        }
    }

    let pod_annotations = pod.metadata.annotations.get_or_insert_with(BTreeMap::new);
    pod_annotations.insert(annotations::VRAM_INJECT.to_string(), "true".to_string());
    pod_annotations.insert(annotations::VRAM_QUOTA.to_string(), quota.clone());

    debug!(quota = %quota, env = result.env_added, "quota interceptor injected");
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodSpec, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn container(name: &str, vram: Option<&str>) -> Container {
        let resources = vram.map(|v| ResourceRequirements {
            requests: Some(BTreeMap::from([(
                RESOURCE_VRAM.to_string(),
                Quantity(v.to_string()),
            )])),
            ..Default::default()
        });
        Container {
            name: name.into(),
            resources,
            ..Default::default()
        }
    }

    fn two_container_pod() -> Pod {
        Pod {
            spec: Some(PodSpec {
                containers: vec![container("main", Some("16Gi")), container("sidecar", None)],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn trigger_conditions() {
        assert!(should_inject(&two_container_pod()));

        let mut off = two_container_pod();
        off.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(annotations::VRAM_INJECT.to_string(), "false".to_string());
        assert!(!should_inject(&off));

        let plain = Pod {
            spec: Some(PodSpec {
                containers: vec![container("main", None)],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!should_inject(&plain));
    }

    #[test]
    fn quota_comes_from_annotation_or_max_request() {
        let pod = two_container_pod();
        assert_eq!(quota_value(&pod).unwrap().as_deref(), Some("16Gi"));

        let mut overridden = two_container_pod();
        overridden
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(annotations::VRAM_QUOTA.to_string(), "8Gi".to_string());
        assert_eq!(quota_value(&overridden).unwrap().as_deref(), Some("8Gi"));
    }

    #[test]
    fn injects_both_containers_one_volume() {
        // Main requests 16Gi, the sidecar requests nothing; both get
        // the preload and quota, the pod gets exactly one shim volume.
        let mut pod = two_container_pod();
        let config = QuotaConfig::default();
        let result = inject_quota(&mut pod, &config, &[]).unwrap().unwrap();
        assert_eq!(result.volumes_added, 1);
        assert_eq!(result.mounts_added, 2);

        let spec = pod.spec.as_ref().unwrap();
        for container in &spec.containers {
            let env = container.env.as_ref().unwrap();
            let preload = env.iter().find(|e| e.name == "LD_PRELOAD").unwrap();
            assert_eq!(preload.value.as_deref(), Some(config.interceptor_path.as_str()));
            let quota = env.iter().find(|e| e.name == "HCS_VRAM_QUOTA").unwrap();
            assert_eq!(quota.value.as_deref(), Some("16Gi"));
        }
        assert_eq!(
            spec.volumes.as_ref().unwrap().iter().filter(|v| v.name == SHIM_VOLUME_NAME).count(),
            1
        );

        let pod_annotations = pod.metadata.annotations.as_ref().unwrap();
        assert_eq!(pod_annotations[annotations::VRAM_INJECT], "true");
        assert_eq!(pod_annotations[annotations::VRAM_QUOTA], "16Gi");
    }

    #[test]
    fn reinjection_is_identical() {
        let mut pod = two_container_pod();
        let config = QuotaConfig::default();
        inject_quota(&mut pod, &config, &[]).unwrap().unwrap();
        let snapshot = pod.clone();

        let second = inject_quota(&mut pod, &config, &[]).unwrap().unwrap();
        assert_eq!(second, InjectionResult::default());
        assert_eq!(pod, snapshot);
    }

    #[test]
    fn preload_prepends_to_existing_value() {
        let mut pod = two_container_pod();
        pod.spec.as_mut().unwrap().containers[0].env = Some(vec![EnvVar {
            name: "LD_PRELOAD".into(),
            value: Some("/usr/lib/jemalloc.so".into()),
            ..Default::default()
        }]);
        let config = QuotaConfig::default();
        inject_quota(&mut pod, &config, &[]).unwrap();

        let env = pod.spec.as_ref().unwrap().containers[0].env.as_ref().unwrap();
        let preload = env.iter().find(|e| e.name == "LD_PRELOAD").unwrap();
        assert_eq!(
            preload.value.as_deref(),
            Some("/opt/hcs/lib/libhcs-vram-interceptor.so:/usr/lib/jemalloc.so")
        );
    }

    #[test]
    fn quota_overwrites_stale_value() {
        let mut pod = two_container_pod();
        pod.spec.as_mut().unwrap().containers[0].env = Some(vec![EnvVar {
            name: "HCS_VRAM_QUOTA".into(),
            value: Some("4Gi".into()),
            ..Default::default()
        }]);
        inject_quota(&mut pod, &QuotaConfig::default(), &[]).unwrap();
        let env = pod.spec.as_ref().unwrap().containers[0].env.as_ref().unwrap();
        let quota = env.iter().find(|e| e.name == "HCS_VRAM_QUOTA").unwrap();
        assert_eq!(quota.value.as_deref(), Some("16Gi"));
    }

    #[test]
    fn no_vram_request_is_a_no_op() {
        let mut pod = Pod {
            spec: Some(PodSpec {
                containers: vec![container("main", None)],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(inject_quota(&mut pod, &QuotaConfig::default(), &[]).unwrap().is_none());
        assert!(pod.metadata.annotations.is_none());
    }
}
