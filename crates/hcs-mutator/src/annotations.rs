//! Annotation keys consumed and emitted by the mutator.

/// Explicit vendor override on the pod.
pub const VENDOR: &str = "hcs.io/vendor";
/// Force injection regardless of detected resources.
pub const INJECT: &str = "hcs.io/inject";
/// `true`/`false` to force quota injection on or off.
pub const VRAM_INJECT: &str = "hcs.io/vram-inject";
/// Override for the quota value.
pub const VRAM_QUOTA: &str = "hcs.io/vram-quota";
/// Advisory topology hint, passed through untouched.
pub const TOPOLOGY_PREFERENCE: &str = "hcs.io/topology-preference";

/// Node label carrying an explicit vendor.
pub const NODE_VENDOR_LABEL: &str = "hcs.io/vendor";
/// Vendor presence labels checked on the scheduled node, in order.
pub const NODE_VENDOR_PRESENCE_LABELS: &[(&str, &str)] = &[
    ("nvidia.com/gpu.present", "nvidia"),
    ("huawei.com/npu", "huawei"),
    ("hygon.com/dcu", "hygon"),
    ("cambricon.com/mlu", "cambricon"),
];
