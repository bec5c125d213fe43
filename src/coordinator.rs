//! Regeneration coordinator.
//!
//! Owns the event loop that turns watch events and the refresh timer into
//! full regenerations of the node and pod target documents. Every trigger
//! causes its own regeneration; pending events are not coalesced.

use crate::config::Config;
use crate::k8s::api::ClusterApi;
use crate::k8s::events::{ChangeEvent, ResourceKind};
use crate::k8s::watcher::{ClusterWatcher, WatchHandle, EVENT_BUFFER};
use crate::metrics::{Metrics, TextfileExporter, Trigger};
use crate::output::DocumentWriter;
use crate::targets::{build_node_targets, build_pod_targets, encode_groups};
use crate::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Initializing,
    Running,
    Stopped,
}

struct ActiveWatch {
    events: mpsc::Receiver<ChangeEvent>,
    handle: WatchHandle,
}

enum Wake {
    Shutdown,
    Tick,
    Event(ChangeEvent),
    WatchClosed,
}

pub struct Coordinator {
    config: Config,
    api: Arc<dyn ClusterApi>,
    writer: Arc<dyn DocumentWriter>,
    watcher: ClusterWatcher,
    metrics: Metrics,
    exporter: TextfileExporter,
    state: watch::Sender<CoordinatorState>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        api: Arc<dyn ClusterApi>,
        writer: Arc<dyn DocumentWriter>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new()?;
        let exporter = TextfileExporter::new(metrics.clone(), config.metrics_file.clone());
        let (state, _) = watch::channel(CoordinatorState::Initializing);

        Ok(Self {
            watcher: ClusterWatcher::new(api.clone()),
            config,
            api,
            writer,
            metrics,
            exporter,
            state,
        })
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.borrow()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Only a failure to start the cluster watcher is returned; everything
    /// after that is logged and the loop keeps going.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        self.state.send_replace(CoordinatorState::Initializing);

        let mut active = match self.start_watch().await {
            Ok(active) => Some(active),
            Err(e) => {
                error!("Failed to start watching for events from kubernetes: {}", e);
                self.state.send_replace(CoordinatorState::Stopped);
                return Err(e);
            }
        };

        self.state.send_replace(CoordinatorState::Running);
        info!(
            "Regeneration loop running, refresh interval {:?}",
            self.config.refresh_interval
        );

        let _ = self.regenerate(Trigger::Startup).await;

        let period = self.config.refresh_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Wake::Shutdown,
                _ = ticker.tick() => Wake::Tick,
                event = next_event(&mut active) => match event {
                    Some(event) => Wake::Event(event),
                    None => Wake::WatchClosed,
                },
            };

            match wake {
                Wake::Shutdown => {
                    info!("Shutting down the regeneration loop");
                    break;
                }
                Wake::Tick => {
                    debug!("Refresh interval elapsed, regenerating the config");
                    if active.is_none() {
                        active = self.restart_watch().await;
                    }
                    let _ = self.regenerate(Trigger::Timer).await;
                }
                Wake::Event(event) => {
                    debug!("Received an update event from the watcher: {}", event);
                    self.metrics.record_watch_event(event.resource());
                    let _ = self.regenerate(Trigger::Event).await;
                }
                Wake::WatchClosed => {
                    if let Some(closed) = active.take() {
                        match closed.handle.shutdown().await {
                            Ok(()) => warn!("Cluster watcher stopped unexpectedly"),
                            Err(e) => error!("Cluster watcher stopped: {}", e),
                        }
                    }
                    warn!("Regenerating on the refresh interval until the watch is re-established");
                }
            }
        }

        if let Some(active) = active.take() {
            if let Err(e) = active.handle.shutdown().await {
                warn!("Cluster watcher reported an error during shutdown: {}", e);
            }
        }

        self.state.send_replace(CoordinatorState::Stopped);
        info!("Regeneration loop stopped");

        Ok(())
    }

    async fn start_watch(&self) -> Result<ActiveWatch> {
        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let handle = self.watcher.start(tx).await?;
        Ok(ActiveWatch { events, handle })
    }

    async fn restart_watch(&self) -> Option<ActiveWatch> {
        match self.start_watch().await {
            Ok(active) => {
                info!("Re-established the cluster watch");
                Some(active)
            }
            Err(e) => {
                warn!("Unable to re-establish the cluster watch: {}", e);
                None
            }
        }
    }

    /// Re-lists the cluster and rewrites every enabled document.
    ///
    /// A failure in one render does not stop the other; the first error is
    /// returned after both have been attempted.
    pub async fn regenerate(&self, trigger: Trigger) -> Result<()> {
        info!(
            "Generating the configuration of the prometheus nodes and pods (trigger: {})",
            trigger
        );
        self.metrics.record_regeneration(trigger);

        let mut first_err = None;

        if self.config.with_nodes {
            if let Err(e) = self.render_nodes().await {
                error!("Failed to render the node targets: {}", e);
                self.metrics.record_failure(ResourceKind::Node);
                first_err = first_err.or(Some(e));
            }
        }

        if self.config.with_pods {
            if let Err(e) = self.render_pods().await {
                error!("Failed to render the pod targets: {}", e);
                self.metrics.record_failure(ResourceKind::Pod);
                first_err = first_err.or(Some(e));
            }
        }

        if let Err(e) = self.exporter.export().await {
            warn!("Failed to export metrics: {}", e);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn render_nodes(&self) -> Result<()> {
        debug!("Generating the nodes configuration");

        let nodes = self.api.list_nodes().await?;
        let group = build_node_targets(&nodes, self.config.node_port);
        self.metrics
            .set_targets(ResourceKind::Node, group.targets.len());

        let content = encode_groups(&[group], self.config.format)?;
        self.writer
            .write_document(
                &content,
                &self.config.config_directory,
                &self.config.nodes_filename,
                self.config.dry_run,
            )
            .await
    }

    async fn render_pods(&self) -> Result<()> {
        debug!(
            "Generating the pod services configuration, namespaces: {:?}",
            self.config.namespaces
        );

        let mut groups = Vec::new();

        for namespace in &self.config.namespaces {
            match self.api.namespace_exists(namespace).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("The namespace {} does not exist, skipping", namespace);
                    continue;
                }
                Err(e) => {
                    error!(
                        "Unable to determine if the namespace {} exists, skipping: {}",
                        namespace, e
                    );
                    continue;
                }
            }

            let pods = self.api.list_pods(namespace).await?;
            debug!("Retrieved {} pods from namespace {:?}", pods.len(), namespace);

            groups.extend(build_pod_targets(&pods, &self.config.metric_annotation));
        }

        let targets = groups.iter().map(|group| group.targets.len()).sum();
        self.metrics.set_targets(ResourceKind::Pod, targets);

        let content = encode_groups(&groups, self.config.format)?;
        self.writer
            .write_document(
                &content,
                &self.config.config_directory,
                &self.config.pods_filename,
                self.config.dry_run,
            )
            .await
    }
}

async fn next_event(active: &mut Option<ActiveWatch>) -> Option<ChangeEvent> {
    match active {
        Some(active) => active.events.recv().await,
        None => std::future::pending().await,
    }
}
