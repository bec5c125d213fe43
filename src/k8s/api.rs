use crate::k8s::events::Change;
use crate::k8s::types::{Node, Pod};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Stream of change notifications from one subscription
pub type ChangeStream = BoxStream<'static, Result<Change>>;

/// Read and watch access to the cluster inventory.
///
/// `watch_nodes`/`watch_pods` must perform a full listing first and open the
/// subscription at that listing's resource version; failure of either step
/// is returned from the call rather than from the stream.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Running pods in `namespace`; the empty namespace means every namespace.
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    async fn watch_nodes(&self) -> Result<ChangeStream>;

    async fn watch_pods(&self) -> Result<ChangeStream>;
}
