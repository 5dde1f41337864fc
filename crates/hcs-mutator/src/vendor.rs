//! Injection decision, vendor resolution, and the vendor profile injector.

use crate::annotations;
use crate::profile::{PREPEND_VARS, VendorProfile};
use hcs_core::Vendor;
use hcs_core::request::{ABSTRACT_RESOURCE_PREFIX, all_resource_names};
use hcs_core::vendor::VENDOR_RESOURCE_PREFIXES;
use k8s_openapi::api::core::v1::{
    Container, EnvVar, HostPathVolumeSource, Pod, Volume, VolumeMount,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Audit counts for one admission response.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InjectionResult {
    pub env_added: usize,
    pub mounts_added: usize,
    pub volumes_added: usize,
    pub devices_added: usize,
}

/// Whether this pod wants any injection at all: accelerator resources in
/// requests or limits, or the explicit opt-in annotation.
pub fn needs_injection(pod: &Pod) -> bool {
    if pod
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(annotations::INJECT))
    {
        return true;
    }
    all_resource_names(pod).iter().any(|name| {
        name.starts_with(ABSTRACT_RESOURCE_PREFIX)
            || VENDOR_RESOURCE_PREFIXES
                .iter()
                .any(|(prefix, _)| name.starts_with(prefix))
    })
}

/// Resolve the target vendor: annotation, then resource prefixes, then the
/// scheduled node's labels, then the configured default.
pub fn resolve_vendor(
    pod: &Pod,
    node_labels: &BTreeMap<String, String>,
    default: Option<&Vendor>,
) -> Option<Vendor> {
    if let Some(value) = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(annotations::VENDOR))
    {
        return Some(Vendor::from(value.as_str()));
    }

    for name in all_resource_names(pod) {
        if let Some(vendor) = Vendor::from_resource_name(&name) {
            return Some(vendor);
        }
    }

    if let Some(value) = node_labels.get(annotations::NODE_VENDOR_LABEL) {
        return Some(Vendor::from(value.as_str()));
    }
    for (label, vendor) in annotations::NODE_VENDOR_PRESENCE_LABELS {
        if node_labels.contains_key(*label) {
            return Some(Vendor::from(*vendor));
        }
    }

    default.cloned()
}

/// Add or colon-prepend one environment variable on a container.
///
/// `PATH`-like variables get the profile value prepended unless it is
/// already present; any other collision keeps the container's own value.
fn inject_env(container: &mut Container, name: &str, value: &str) -> bool {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == name) {
        None => {
            env.push(EnvVar {
                name: name.to_string(),
                value: Some(value.to_string()),
                ..Default::default()
            });
            true
        }
        Some(existing) if PREPEND_VARS.contains(&name) => {
            let current = existing.value.clone().unwrap_or_default();
            if current.contains(value) {
                return false;
            }
            existing.value = Some(if current.is_empty() {
                value.to_string()
            } else {
                format!("{value}:{current}")
            });
            true
        }
        Some(_) => false,
    }
}

fn mount_exists(container: &Container, mount_path: &str) -> bool {
    container
        .volume_mounts
        .as_ref()
        .is_some_and(|mounts| mounts.iter().any(|m| m.mount_path == mount_path))
}

fn add_mount(container: &mut Container, name: &str, mount_path: &str, read_only: bool) -> bool {
    if mount_exists(container, mount_path) {
        return false;
    }
    container
        .volume_mounts
        .get_or_insert_with(Vec::new)
        .push(VolumeMount {
            name: name.to_string(),
            mount_path: mount_path.to_string(),
            read_only: Some(read_only),
            ..Default::default()
        });
    true
}

fn add_host_path_volume(pod: &mut Pod, name: &str, host_path: &str, kind: &str) -> bool {
    let Some(spec) = pod.spec.as_mut() else {
        return false;
    };
    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    if volumes.iter().any(|v| v.name == name) {
        return false;
    }
    volumes.push(Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: host_path.to_string(),
            type_: Some(kind.to_string()),
        }),
        ..Default::default()
    });
    true
}

fn add_annotation(pod: &mut Pod, key: &str, value: &str) -> bool {
    let annotations = pod.metadata.annotations.get_or_insert_with(BTreeMap::new);
    if annotations.contains_key(key) {
        return false;
    }
    annotations.insert(key.to_string(), value.to_string());
    true
}

/// Apply a vendor profile to the pod. Idempotent: applying the same profile
/// twice changes nothing the second time.
pub fn inject_vendor(
    pod: &mut Pod,
    profile: &VendorProfile,
    skip_containers: &[String],
) -> InjectionResult {
    let mut result = InjectionResult::default();
    let vendor = profile.vendor.clone();

    let Some(spec) = pod.spec.as_mut() else {
        return result;
    };
    let containers = spec
        .containers
        .iter_mut()
        .chain(spec.init_containers.iter_mut().flatten());
    for container in containers {
        if skip_containers.contains(&container.name) {
            continue;
        }

        for var in &profile.env {
            if inject_env(container, &var.name, &var.value) {
                result.env_added += 1;
            }
        }

        for volume in &profile.volumes {
            if add_mount(container, &volume.name, &volume.mount_path, volume.read_only) {
                result.mounts_added += 1;
            }
        }

        for (index, dev) in profile.devices.iter().enumerate() {
            let name = format!("{vendor}-device-{index}");
            if add_mount(container, &name, &dev.container_path, false) {
                result.devices_added += 1;
            }
        }
    }

    for volume in &profile.volumes {
        if add_host_path_volume(pod, &volume.name, &volume.host_path, "Directory") {
            result.volumes_added += 1;
        }
    }
    for (index, dev) in profile.devices.iter().enumerate() {
        let name = format!("{vendor}-device-{index}");
        if add_host_path_volume(pod, &name, &dev.host_path, "CharDevice") {
            result.volumes_added += 1;
        }
    }

    if let (Some(runtime_class), Some(spec)) = (&profile.runtime_class, pod.spec.as_mut()) {
        if spec.runtime_class_name.is_none() {
            spec.runtime_class_name = Some(runtime_class.clone());
        }
    }

    for (key, value) in &profile.annotations {
        add_annotation(pod, key, value);
    }
    add_annotation(pod, annotations::VENDOR, vendor.as_str());

    debug!(
        vendor = %vendor,
        env = result.env_added,
        mounts = result.mounts_added,
        volumes = result.volumes_added,
        "vendor profile applied"
    );
    result
}
