//! Vendor-conflict validation.

use hcs_core::Vendor;
use hcs_core::request::all_resource_names;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeSet;

/// Reject pods that request resources from more than one vendor at once,
/// across all containers, in requests and limits alike.
pub fn validate_single_vendor(pod: &Pod) -> Result<(), String> {
    let vendors: BTreeSet<Vendor> = all_resource_names(pod)
        .iter()
        .filter_map(|name| Vendor::from_resource_name(name))
        .collect();

    if vendors.len() > 1 {
        let list: Vec<&str> = vendors.iter().map(Vendor::as_str).collect();
        return Err(format!(
            "pod requests resources from multiple vendors: {}",
            list.join(", ")
        ));
    }
    Ok(())
}
