use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of a cluster node as seen by one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub labels: BTreeMap<String, String>,
}

impl Node {
    pub fn from_k8s_node(node: &k8s_openapi::api::core::v1::Node) -> Self {
        Self {
            id: node.metadata.name.clone().unwrap_or_default(),
            labels: node.metadata.labels.clone().unwrap_or_default(),
        }
    }
}

/// Snapshot of a running pod as seen by one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    /// Pod object name, unique within its namespace
    pub id: String,
    /// Logical service name taken from the grouping label
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub address: String,
}

impl Pod {
    /// Converts a pod object, returning `None` unless it is running with an IP.
    pub fn from_k8s_pod(pod: &k8s_openapi::api::core::v1::Pod, name_label: &str) -> Option<Self> {
        let metadata = &pod.metadata;
        let status = pod.status.as_ref()?;

        if status.phase.as_deref() != Some("Running") {
            return None;
        }

        let address = status.pod_ip.clone().filter(|ip| !ip.is_empty())?;
        let labels = metadata.labels.clone().unwrap_or_default();

        Some(Self {
            id: metadata.name.clone().unwrap_or_default(),
            name: labels.get(name_label).cloned().unwrap_or_default(),
            namespace: metadata.namespace.clone().unwrap_or_default(),
            labels,
            annotations: metadata.annotations.clone().unwrap_or_default(),
            address,
        })
    }
}
