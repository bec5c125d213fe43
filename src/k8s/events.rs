//! Change notifications produced by the cluster watcher.
//!
//! The coordinator treats every event as an opaque trigger; the payload is
//! kept for logging only.

use kube::ResourceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw change notification for a single object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub name: String,
    pub namespace: Option<String>,
    pub resource_version: Option<String>,
}

impl Change {
    pub fn new(kind: ChangeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: None,
            resource_version: None,
        }
    }

    pub fn from_object<K: ResourceExt>(kind: ChangeKind, object: &K) -> Self {
        Self {
            kind,
            name: object.name_any(),
            namespace: object.namespace(),
            resource_version: object.resource_version(),
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Which subscription a notification arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Node,
    Pod,
}

impl ResourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Node => "node",
            ResourceKind::Pod => "pod",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    NodeChanged(Change),
    PodChanged(Change),
}

impl ChangeEvent {
    pub fn resource(&self) -> ResourceKind {
        match self {
            ChangeEvent::NodeChanged(_) => ResourceKind::Node,
            ChangeEvent::PodChanged(_) => ResourceKind::Pod,
        }
    }

    pub fn change(&self) -> &Change {
        match self {
            ChangeEvent::NodeChanged(change) | ChangeEvent::PodChanged(change) => change,
        }
    }

    /// Wraps a notification for forwarding, or drops it when it cannot affect
    /// the rendered targets. Node modifications only touch metadata we ignore.
    pub fn normalize(resource: ResourceKind, change: Change) -> Option<Self> {
        match resource {
            ResourceKind::Node if change.kind == ChangeKind::Modified => None,
            ResourceKind::Node => Some(ChangeEvent::NodeChanged(change)),
            ResourceKind::Pod => Some(ChangeEvent::PodChanged(change)),
        }
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type: {}, event: {}", self.resource(), self.change())
    }
}
