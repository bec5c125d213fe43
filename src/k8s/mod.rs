pub mod api;
pub mod client;
pub mod events;
pub mod types;
pub mod watcher;

pub use api::{ChangeStream, ClusterApi};
pub use client::K8sClient;
pub use events::{Change, ChangeEvent, ChangeKind, ResourceKind};
pub use types::{Node, Pod};
pub use watcher::{ClusterWatcher, WatchHandle, WatcherState, EVENT_BUFFER};
