use crate::k8s::types::{Node, Pod};
use crate::targets::annotation::{decode_metrics, MetricDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

pub const ROLE_LABEL: &str = "role";
pub const NODE_ROLE: &str = "kubernetes_node";
pub const POD_LABEL: &str = "pod";
pub const NAMESPACE_LABEL: &str = "namespace";

/// A file_sd target group: endpoints plus the labels attached to them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// One group holding every node, in listing order.
pub fn build_node_targets(nodes: &[Node], port: u16) -> TargetGroup {
    let mut group = TargetGroup::default();

    group.targets = nodes
        .iter()
        .map(|node| format!("{}:{}", node.id, port))
        .collect();
    group
        .labels
        .insert(ROLE_LABEL.to_string(), NODE_ROLE.to_string());

    group
}

struct Service {
    metrics: Vec<MetricDescriptor>,
    group: TargetGroup,
}

impl Service {
    fn new(name: &str, metrics: Vec<MetricDescriptor>) -> Self {
        let mut group = TargetGroup::default();
        group
            .labels
            .insert(POD_LABEL.to_string(), name.to_string());
        Self { metrics, group }
    }

    fn add(&mut self, pod: &Pod) {
        let labels = &mut self.group.labels;
        labels.insert(NAMESPACE_LABEL.to_string(), pod.namespace.clone());
        for (key, value) in &pod.labels {
            if key == POD_LABEL {
                continue;
            }
            labels.insert(key.clone(), value.clone());
        }

        for metric in &self.metrics {
            self.group
                .targets
                .push(format!("{}:{}", pod.address, metric.port));
        }
    }
}

/// Groups pods by logical service name into one target group per service.
///
/// The first pod seen for a service decides its metrics: if that pod has no
/// `annotation` or it fails to decode, the whole service is dropped. Groups
/// are returned in order of first appearance and groups without targets are
/// omitted.
pub fn build_pod_targets(pods: &[Pod], annotation: &str) -> Vec<TargetGroup> {
    let mut services: Vec<Service> = Vec::new();
    let mut index: HashMap<&str, Option<usize>> = HashMap::new();

    for pod in pods {
        if pod.name.is_empty() {
            debug!("Pod {}/{} has no service name, skipping", pod.namespace, pod.id);
            continue;
        }

        let slot = match index.get(pod.name.as_str()) {
            Some(slot) => *slot,
            None => {
                let slot = service_metrics(pod, annotation).map(|metrics| {
                    services.push(Service::new(&pod.name, metrics));
                    services.len() - 1
                });
                index.insert(pod.name.as_str(), slot);
                slot
            }
        };

        if let Some(slot) = slot {
            services[slot].add(pod);
        }
    }

    services
        .into_iter()
        .map(|service| service.group)
        .filter(|group| !group.targets.is_empty())
        .collect()
}

fn service_metrics(pod: &Pod, annotation: &str) -> Option<Vec<MetricDescriptor>> {
    let Some(text) = pod.annotations.get(annotation) else {
        debug!(
            "Pod {}/{} has no {} annotation, service {} is not scraped",
            pod.namespace, pod.id, annotation, pod.name
        );
        return None;
    };

    match decode_metrics(text) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!(
                "Skipping pod: '{}', name: '{}' as the metrics config is invalid: {}",
                pod.id, pod.name, e
            );
            None
        }
    }
}
