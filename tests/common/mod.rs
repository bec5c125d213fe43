#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use kubesd::k8s::{Change, ChangeKind, ChangeStream, ClusterApi, Node, Pod};
use kubesd::output::DocumentWriter;
use kubesd::{KubesdError, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub const ANNOTATION: &str = "metrics";

pub fn node(id: &str) -> Node {
    Node {
        id: id.to_string(),
        labels: BTreeMap::from([("kubernetes".to_string(), "true".to_string())]),
    }
}

pub fn pod(id: &str, name: &str, namespace: &str, address: &str, metrics: Option<&str>) -> Pod {
    let mut annotations = BTreeMap::new();
    if let Some(metrics) = metrics {
        annotations.insert(ANNOTATION.to_string(), metrics.to_string());
    }
    Pod {
        id: id.to_string(),
        name: name.to_string(),
        namespace: namespace.to_string(),
        labels: BTreeMap::new(),
        annotations,
        address: address.to_string(),
    }
}

pub fn change(kind: ChangeKind, name: &str) -> Change {
    Change::new(kind, name)
}

/// In-memory cluster with controllable listings and watch feeds
#[derive(Default)]
pub struct FakeCluster {
    nodes: Mutex<Vec<Node>>,
    pods: Mutex<Vec<Pod>>,
    missing_namespaces: Mutex<HashSet<String>>,
    broken_namespaces: Mutex<HashSet<String>>,
    pub fail_nodes: AtomicBool,
    pub fail_pods: AtomicBool,
    pub fail_watch: AtomicBool,
    pub watch_calls: AtomicUsize,
    node_feeds: Mutex<Vec<UnboundedSender<Result<Change>>>>,
    pod_feeds: Mutex<Vec<UnboundedSender<Result<Change>>>>,
}

impl FakeCluster {
    pub fn new(nodes: Vec<Node>, pods: Vec<Pod>) -> Self {
        let cluster = Self::default();
        *cluster.nodes.lock().unwrap() = nodes;
        *cluster.pods.lock().unwrap() = pods;
        cluster
    }

    pub fn set_nodes(&self, nodes: Vec<Node>) {
        *self.nodes.lock().unwrap() = nodes;
    }

    pub fn mark_missing(&self, namespace: &str) {
        self.missing_namespaces
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    pub fn mark_broken(&self, namespace: &str) {
        self.broken_namespaces
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    pub fn push_node(&self, item: Result<Change>) {
        push(&self.node_feeds, item);
    }

    pub fn push_pod(&self, item: Result<Change>) {
        push(&self.pod_feeds, item);
    }

    /// True when every subscription handed out has been dropped
    pub fn feeds_closed(&self) -> bool {
        let nodes = self.node_feeds.lock().unwrap();
        let pods = self.pod_feeds.lock().unwrap();
        nodes.iter().chain(pods.iter()).all(|feed| feed.is_closed())
    }

    fn subscribe(
        &self,
        feeds: &Mutex<Vec<UnboundedSender<Result<Change>>>>,
    ) -> Result<ChangeStream> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(KubesdError::WatchSetupFailed(
                "connection refused".to_string(),
            ));
        }
        let (tx, rx) = unbounded();
        feeds.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }
}

fn push(feeds: &Mutex<Vec<UnboundedSender<Result<Change>>>>, item: Result<Change>) {
    let feeds = feeds.lock().unwrap();
    let feed = feeds.last().expect("no subscription opened");
    feed.unbounded_send(item).expect("subscription closed");
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        if self.fail_nodes.load(Ordering::SeqCst) {
            return Err(KubesdError::ListingFailed {
                resource: "nodes".to_string(),
                reason: "api unavailable".to_string(),
            });
        }
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        if self.fail_pods.load(Ordering::SeqCst) {
            return Err(KubesdError::ListingFailed {
                resource: "pods".to_string(),
                reason: "api unavailable".to_string(),
            });
        }
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|pod| namespace.is_empty() || pod.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        if self.broken_namespaces.lock().unwrap().contains(namespace) {
            return Err(KubesdError::NamespaceLookupFailed {
                namespace: namespace.to_string(),
                reason: "forbidden".to_string(),
            });
        }
        Ok(!self.missing_namespaces.lock().unwrap().contains(namespace))
    }

    async fn watch_nodes(&self) -> Result<ChangeStream> {
        // let concurrent callers interleave like a real API round trip
        tokio::task::yield_now().await;
        self.subscribe(&self.node_feeds)
    }

    async fn watch_pods(&self) -> Result<ChangeStream> {
        self.subscribe(&self.pod_feeds)
    }
}

#[derive(Debug, Clone)]
pub struct Written {
    pub filename: String,
    pub content: String,
    pub dry_run: bool,
}

/// Writer that hands every document to the test over a channel
pub struct RecordingWriter {
    tx: mpsc::UnboundedSender<Written>,
}

impl RecordingWriter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Written>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DocumentWriter for RecordingWriter {
    async fn write_document(
        &self,
        content: &[u8],
        _directory: &Path,
        filename: &str,
        dry_run: bool,
    ) -> Result<()> {
        let _ = self.tx.send(Written {
            filename: filename.to_string(),
            content: String::from_utf8_lossy(content).into_owned(),
            dry_run,
        });
        Ok(())
    }
}
