//! Cluster watcher: fans node and pod subscriptions into one event channel.
//!
//! One task forwards each subscription into an internal buffer; a fan-in task
//! normalizes notifications and blocks on the consumer's bounded channel, so
//! events are never dropped while watching.

use crate::k8s::api::{ChangeStream, ClusterApi};
use crate::k8s::events::{Change, ChangeEvent, ResourceKind};
use crate::{KubesdError, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info};

/// Capacity of the event channel between the watcher and its consumer
pub const EVENT_BUFFER: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    ShuttingDown,
    Stopped,
}

type Forwarded = (ResourceKind, Result<Change>);

pub struct ClusterWatcher {
    api: Arc<dyn ClusterApi>,
    state: Arc<watch::Sender<WatcherState>>,
}

impl ClusterWatcher {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        let (state, _) = watch::channel(WatcherState::Idle);
        Self {
            api,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Opens both subscriptions and starts forwarding into `sink`.
    ///
    /// Failure to open either subscription is returned as `WatchSetupFailed`
    /// and leaves no task running.
    pub async fn start(&self, sink: mpsc::Sender<ChangeEvent>) -> Result<WatchHandle> {
        let mut previous = None;
        self.state.send_if_modified(|state| match state {
            WatcherState::Idle | WatcherState::Stopped => {
                previous = Some(*state);
                *state = WatcherState::Watching;
                true
            }
            _ => false,
        });
        let Some(previous) = previous else {
            return Err(KubesdError::WatchSetupFailed(format!(
                "watcher is already {:?}",
                self.state()
            )));
        };

        let (nodes, pods) = match self.subscribe().await {
            Ok(streams) => streams,
            Err(e) => {
                self.state.send_replace(previous);
                return Err(e);
            }
        };

        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let subscriptions = vec![
            tokio::spawn(forward(ResourceKind::Node, nodes, tx.clone(), token.clone())),
            tokio::spawn(forward(ResourceKind::Pod, pods, tx, token.clone())),
        ];

        info!("Watching cluster nodes and pods for changes");

        let fan_in = tokio::spawn(fan_in(
            rx,
            sink,
            subscriptions,
            token.clone(),
            self.state.clone(),
        ));

        Ok(WatchHandle {
            _guard: token.clone().drop_guard(),
            token,
            state: self.state.clone(),
            fan_in,
        })
    }

    async fn subscribe(&self) -> Result<(ChangeStream, ChangeStream)> {
        let nodes = self.api.watch_nodes().await.map_err(setup_failed)?;
        let pods = self.api.watch_pods().await.map_err(setup_failed)?;
        Ok((nodes, pods))
    }
}

fn setup_failed(err: KubesdError) -> KubesdError {
    match err {
        KubesdError::WatchSetupFailed(_) => err,
        other => KubesdError::WatchSetupFailed(other.to_string()),
    }
}

/// Cancel handle returned by [`ClusterWatcher::start`]. Dropping it cancels
/// the watcher.
pub struct WatchHandle {
    _guard: DropGuard,
    token: CancellationToken,
    state: Arc<watch::Sender<WatcherState>>,
    fan_in: JoinHandle<Result<()>>,
}

impl WatchHandle {
    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Signals shutdown without waiting. Buffered events may be discarded.
    pub fn cancel(&self) {
        self.state.send_if_modified(|state| {
            if *state == WatcherState::Watching {
                *state = WatcherState::ShuttingDown;
                true
            } else {
                false
            }
        });
        self.token.cancel();
    }

    /// Cancels and waits for all tasks, returning the stream error that
    /// stopped the watcher, if any.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel();
        match self.fan_in.await {
            Ok(result) => result,
            Err(e) => Err(KubesdError::WatchStreamFailed(format!(
                "watcher task failed: {}",
                e
            ))),
        }
    }
}

async fn forward(
    resource: ResourceKind,
    mut stream: ChangeStream,
    tx: mpsc::Sender<Forwarded>,
    token: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = token.cancelled() => break,
            item = stream.next() => item,
        };

        let item = item.unwrap_or_else(|| {
            Err(KubesdError::WatchStreamFailed(format!(
                "{} watch stream ended",
                resource
            )))
        });
        let failed = item.is_err();

        tokio::select! {
            _ = token.cancelled() => break,
            sent = tx.send((resource, item)) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        if failed {
            break;
        }
    }

    debug!("{} subscription stopped", resource);
}

async fn fan_in(
    mut rx: mpsc::Receiver<Forwarded>,
    sink: mpsc::Sender<ChangeEvent>,
    subscriptions: Vec<JoinHandle<()>>,
    token: CancellationToken,
    state: Arc<watch::Sender<WatcherState>>,
) -> Result<()> {
    debug!("Starting the event fan-in loop");

    let result = loop {
        let (resource, item) = tokio::select! {
            _ = token.cancelled() => break Ok(()),
            next = rx.recv() => match next {
                Some(next) => next,
                None => break Ok(()),
            },
        };

        let change = match item {
            Ok(change) => change,
            Err(e) => {
                error!("Watch on {}s failed: {}", resource, e);
                break Err(e);
            }
        };

        let Some(event) = ChangeEvent::normalize(resource, change) else {
            debug!("Ignoring node modification");
            continue;
        };

        debug!("Received an update: {}", event);

        tokio::select! {
            _ = token.cancelled() => break Ok(()),
            sent = sink.send(event) => {
                if sent.is_err() {
                    debug!("Event consumer has gone away");
                    break Ok(());
                }
            }
        }
    };

    token.cancel();
    for subscription in subscriptions {
        let _ = subscription.await;
    }

    state.send_replace(WatcherState::Stopped);
    info!("Cluster watcher stopped");

    result
}
