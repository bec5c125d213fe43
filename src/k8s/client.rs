use crate::k8s::api::{ChangeStream, ClusterApi};
use crate::k8s::events::{Change, ChangeKind};
use crate::k8s::types::{Node, Pod};
use crate::{KubesdError, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::{Namespace, Node as K8sNode, Pod as K8sPod};
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, info};

/// `ClusterApi` backed by the Kubernetes API server
pub struct K8sClient {
    client: Client,
    name_label: String,
}

impl K8sClient {
    pub async fn try_default(name_label: impl Into<String>) -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            KubesdError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self::new(client, name_label))
    }

    pub fn new(client: Client, name_label: impl Into<String>) -> Self {
        Self {
            client,
            name_label: name_label.into(),
        }
    }

    fn nodes(&self) -> Api<K8sNode> {
        Api::all(self.client.clone())
    }

    fn pods(&self, namespace: &str) -> Api<K8sPod> {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }
}

#[async_trait]
impl ClusterApi for K8sClient {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let list = self
            .nodes()
            .list(&ListParams::default())
            .await
            .map_err(|e| KubesdError::listing("nodes", e))?;

        let nodes: Vec<Node> = list.items.iter().map(Node::from_k8s_node).collect();
        debug!("Retrieved {} nodes from the api", nodes.len());

        Ok(nodes)
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        let list = self
            .pods(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| KubesdError::listing("pods", e))?;

        let pods: Vec<Pod> = list
            .items
            .iter()
            .filter_map(|pod| Pod::from_k8s_pod(pod, &self.name_label))
            .collect();

        debug!(
            "Retrieved {} running pods (of {}) in namespace {:?}",
            pods.len(),
            list.items.len(),
            namespace
        );

        Ok(pods)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        if namespace.is_empty() {
            return Ok(true);
        }

        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let found = namespaces.get_opt(namespace).await.map_err(|e| {
            KubesdError::NamespaceLookupFailed {
                namespace: namespace.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(found.is_some())
    }

    async fn watch_nodes(&self) -> Result<ChangeStream> {
        open_watch(self.nodes(), "nodes").await
    }

    async fn watch_pods(&self) -> Result<ChangeStream> {
        open_watch(self.pods(""), "pods").await
    }
}

type EventStream<K> = BoxStream<'static, kube::Result<WatchEvent<K>>>;

/// Opens a raw watch starting after the given resource version
type Reopen<K> =
    Box<dyn Fn(String) -> BoxFuture<'static, kube::Result<EventStream<K>>> + Send + Sync>;

struct WatchState<K> {
    reopen: Reopen<K>,
    resource: &'static str,
    version: String,
    stream: Option<EventStream<K>>,
}

impl<K: Resource> WatchState<K> {
    fn observe(&mut self, kind: ChangeKind, object: &K) -> Change {
        if let Some(version) = object.resource_version() {
            self.version = version;
        }
        Change::from_object(kind, object)
    }
}

fn reopener<K>(api: Api<K>) -> Reopen<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    Box::new(move |version: String| {
        let api = api.clone();
        async move {
            let stream = api.watch(&WatchParams::default(), &version).await?;
            Ok::<_, kube::Error>(stream.boxed())
        }
        .boxed()
    })
}

/// Lists `api` and opens a watch anchored at the listing's resource version.
async fn open_watch<K>(api: Api<K>, resource: &'static str) -> Result<ChangeStream>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    debug!("Creating a watcher for the kubernetes {}", resource);

    let list = api.list(&ListParams::default()).await.map_err(|e| {
        KubesdError::WatchSetupFailed(format!("failed to list {}: {}", resource, e))
    })?;
    let version = list.metadata.resource_version.unwrap_or_default();

    let reopen = reopener(api);
    let stream = reopen(version.clone()).await.map_err(|e| {
        KubesdError::WatchSetupFailed(format!("unable to watch {}: {}", resource, e))
    })?;

    info!("Watching {} from resource version {}", resource, version);

    Ok(resumable(WatchState {
        reopen,
        resource,
        version,
        stream: Some(stream),
    }))
}

/// Reopens the watch from the last seen resource version whenever the API
/// server closes it. Error notifications end the stream after being yielded.
fn resumable<K>(state: WatchState<K>) -> ChangeStream
where
    K: Resource + Send + 'static,
{
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            if state.stream.is_none() {
                debug!(
                    "Resuming {} watch from resource version {}",
                    state.resource, state.version
                );
                match (state.reopen)(state.version.clone()).await {
                    Ok(stream) => state.stream = Some(stream),
                    Err(e) => {
                        let err = KubesdError::WatchStreamFailed(format!(
                            "failed to reopen {} watch: {}",
                            state.resource, e
                        ));
                        return Some((Err(err), None));
                    }
                }
            }

            let next = match state.stream.as_mut() {
                Some(stream) => stream.next().await,
                None => continue,
            };

            match next {
                None => state.stream = None,
                Some(Ok(WatchEvent::Added(object))) => {
                    let change = state.observe(ChangeKind::Added, &object);
                    return Some((Ok(change), Some(state)));
                }
                Some(Ok(WatchEvent::Modified(object))) => {
                    let change = state.observe(ChangeKind::Modified, &object);
                    return Some((Ok(change), Some(state)));
                }
                Some(Ok(WatchEvent::Deleted(object))) => {
                    let change = state.observe(ChangeKind::Deleted, &object);
                    return Some((Ok(change), Some(state)));
                }
                Some(Ok(WatchEvent::Bookmark(bookmark))) => {
                    state.version = bookmark.metadata.resource_version;
                }
                Some(Ok(WatchEvent::Error(status))) => {
                    let err = KubesdError::WatchStreamFailed(format!(
                        "{} watch returned error {}: {}",
                        state.resource, status.code, status.message
                    ));
                    return Some((Err(err), None));
                }
                Some(Err(e)) => {
                    let err = KubesdError::WatchStreamFailed(format!(
                        "{} watch failed: {}",
                        state.resource, e
                    ));
                    return Some((Err(err), None));
                }
            }
        }
    })
    .boxed()
}
