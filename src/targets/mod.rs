pub mod annotation;
pub mod encode;
pub mod group;

pub use annotation::{decode_metrics, MetricDescriptor};
pub use encode::encode_groups;
pub use group::{build_node_targets, build_pod_targets, TargetGroup};
