mod common;

use common::{change, node, pod, FakeCluster, RecordingWriter, Written};
use kubesd::config::{Config, OutputFormat};
use kubesd::coordinator::CoordinatorState;
use kubesd::k8s::{ChangeKind, ResourceKind};
use kubesd::metrics::Trigger;
use kubesd::targets::TargetGroup;
use kubesd::{Coordinator, KubesdError};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);
const NGINX_METRICS: &str = "- name: collectd-exporter\n  port: 9103\n";

fn config() -> Config {
    Config {
        namespaces: vec!["default".to_string(), "platform".to_string()],
        ..Default::default()
    }
}

fn cluster() -> FakeCluster {
    let mut relabelled = pod("prometheus-2", "prometheus", "platform", "10.10.1.4", None);
    relabelled
        .labels
        .insert("name".to_string(), "nginx".to_string());

    FakeCluster::new(
        vec![node("10.50.0.101"), node("10.50.0.102"), node("10.50.0.103")],
        vec![
            pod("nginx-8327", "nginx", "default", "10.10.0.100", Some(NGINX_METRICS)),
            pod("nginx-dsd2", "nginx", "default", "10.10.0.101", Some(NGINX_METRICS)),
            pod("nginx-dsdd2", "nginx", "default", "10.10.0.103", Some(NGINX_METRICS)),
            pod(
                "prometheus-1",
                "prometheus",
                "platform",
                "10.10.2.10",
                Some("- name: prometheus-exporter\n  port: 1000\n"),
            ),
            relabelled,
        ],
    )
}

struct Harness {
    cluster: Arc<FakeCluster>,
    coordinator: Arc<Coordinator>,
    written: mpsc::UnboundedReceiver<Written>,
    shutdown: CancellationToken,
    task: JoinHandle<kubesd::Result<()>>,
}

impl Harness {
    fn start(config: Config, cluster: FakeCluster) -> Self {
        let cluster = Arc::new(cluster);
        let (writer, written) = RecordingWriter::new();
        let coordinator =
            Arc::new(Coordinator::new(config, cluster.clone(), Arc::new(writer)).unwrap());
        let shutdown = CancellationToken::new();

        let task = {
            let coordinator = coordinator.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { coordinator.run(shutdown).await })
        };

        Self {
            cluster,
            coordinator,
            written,
            shutdown,
            task,
        }
    }

    async fn next_write(&mut self, wait: Duration) -> Written {
        timeout(wait, self.written.recv())
            .await
            .expect("timed out waiting for a document")
            .expect("writer dropped")
    }

    /// Collects the documents of one regeneration keyed by filename
    async fn next_regeneration(
        &mut self,
        wait: Duration,
        documents: usize,
    ) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for _ in 0..documents {
            let written = self.next_write(wait).await;
            out.insert(written.filename, written.content);
        }
        out
    }

    async fn stop(self) -> (Arc<Coordinator>, Arc<FakeCluster>) {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
        (self.coordinator, self.cluster)
    }
}

fn groups(content: &str) -> Vec<TargetGroup> {
    serde_yaml::from_str(content).unwrap()
}

#[tokio::test]
async fn test_initial_regeneration_renders_nodes_and_pods() {
    let mut harness = Harness::start(config(), cluster());

    let documents = harness.next_regeneration(WAIT, 2).await;

    let nodes = groups(&documents["nodes.yml"]);
    assert_eq!(nodes.len(), 1);
    assert_eq!(
        nodes[0].targets,
        vec!["10.50.0.101:9100", "10.50.0.102:9100", "10.50.0.103:9100"]
    );
    assert_eq!(nodes[0].labels["role"], "kubernetes_node");

    let pods = groups(&documents["pods.yml"]);
    assert_eq!(pods.len(), 2);
    assert_eq!(
        pods[0].labels,
        BTreeMap::from([
            ("namespace".to_string(), "default".to_string()),
            ("pod".to_string(), "nginx".to_string()),
        ])
    );
    assert_eq!(
        pods[0].targets,
        vec!["10.10.0.100:9103", "10.10.0.101:9103", "10.10.0.103:9103"]
    );
    assert_eq!(pods[1].labels["pod"], "prometheus");
    assert_eq!(pods[1].labels["namespace"], "platform");
    assert_eq!(pods[1].labels["name"], "nginx");
    assert_eq!(pods[1].targets, vec!["10.10.2.10:1000", "10.10.1.4:1000"]);

    assert_eq!(harness.coordinator.state(), CoordinatorState::Running);
    assert_eq!(
        harness.coordinator.metrics().regenerations(Trigger::Startup),
        1
    );

    let (coordinator, cluster) = harness.stop().await;
    assert_eq!(coordinator.state(), CoordinatorState::Stopped);
    assert!(cluster.feeds_closed());
}

#[tokio::test]
async fn test_each_event_triggers_a_regeneration() {
    let mut harness = Harness::start(config(), cluster());
    harness.next_regeneration(WAIT, 2).await;

    harness
        .cluster
        .push_pod(Ok(change(ChangeKind::Added, "nginx-new")));
    harness.next_regeneration(WAIT, 2).await;

    harness
        .cluster
        .push_pod(Ok(change(ChangeKind::Deleted, "nginx-new")));
    harness.next_regeneration(WAIT, 2).await;

    let metrics = harness.coordinator.metrics();
    assert_eq!(metrics.regenerations(Trigger::Event), 2);
    assert_eq!(metrics.watch_events(ResourceKind::Pod), 2);

    harness.stop().await;
}

#[tokio::test]
async fn test_node_modification_does_not_regenerate() {
    let mut harness = Harness::start(config(), cluster());
    harness.next_regeneration(WAIT, 2).await;

    harness
        .cluster
        .push_node(Ok(change(ChangeKind::Modified, "10.50.0.101")));
    harness
        .cluster
        .push_node(Ok(change(ChangeKind::Added, "10.50.0.104")));
    harness.cluster.set_nodes(vec![
        node("10.50.0.101"),
        node("10.50.0.102"),
        node("10.50.0.103"),
        node("10.50.0.104"),
    ]);

    let documents = harness.next_regeneration(WAIT, 2).await;
    assert_eq!(groups(&documents["nodes.yml"])[0].targets.len(), 4);

    let metrics = harness.coordinator.metrics();
    assert_eq!(metrics.watch_events(ResourceKind::Node), 1);
    assert_eq!(metrics.regenerations(Trigger::Event), 1);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_timer_forces_regeneration() {
    let config = Config {
        refresh_interval: Duration::from_secs(60),
        ..config()
    };
    let mut harness = Harness::start(config, cluster());
    let long_wait = Duration::from_secs(600);

    harness.next_regeneration(long_wait, 2).await;
    harness.next_regeneration(long_wait, 2).await;
    harness.next_regeneration(long_wait, 2).await;

    let metrics = harness.coordinator.metrics();
    assert_eq!(metrics.regenerations(Trigger::Startup), 1);
    assert_eq!(metrics.regenerations(Trigger::Timer), 2);

    harness.stop().await;
}

#[tokio::test]
async fn test_listing_failure_keeps_loop_running() {
    let cluster = cluster();
    cluster.fail_nodes.store(true, Ordering::SeqCst);
    let mut harness = Harness::start(config(), cluster);

    let written = harness.next_write(WAIT).await;
    assert_eq!(written.filename, "pods.yml");

    harness
        .cluster
        .push_pod(Ok(change(ChangeKind::Modified, "nginx-8327")));
    let written = harness.next_write(WAIT).await;
    assert_eq!(written.filename, "pods.yml");

    assert_eq!(harness.coordinator.state(), CoordinatorState::Running);
    assert_eq!(
        harness.coordinator.metrics().failures(ResourceKind::Node),
        2
    );

    harness.cluster.fail_nodes.store(false, Ordering::SeqCst);
    harness
        .cluster
        .push_pod(Ok(change(ChangeKind::Modified, "nginx-8327")));
    let documents = harness.next_regeneration(WAIT, 2).await;
    assert!(documents.contains_key("nodes.yml"));

    harness.stop().await;
}

#[tokio::test]
async fn test_pod_listing_failure_skips_pod_document() {
    let cluster = cluster();
    cluster.fail_pods.store(true, Ordering::SeqCst);
    let mut harness = Harness::start(config(), cluster);

    let written = harness.next_write(WAIT).await;
    assert_eq!(written.filename, "nodes.yml");
    assert!(timeout(Duration::from_millis(100), harness.written.recv())
        .await
        .is_err());
    assert_eq!(
        harness.coordinator.metrics().failures(ResourceKind::Pod),
        1
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_unknown_and_failing_namespaces_are_skipped() {
    let config = Config {
        namespaces: vec![
            "broken".to_string(),
            "default".to_string(),
            "missing".to_string(),
            "platform".to_string(),
        ],
        with_nodes: false,
        ..Default::default()
    };
    let cluster = cluster();
    cluster.mark_broken("broken");
    cluster.mark_missing("missing");
    let mut harness = Harness::start(config, cluster);

    let written = harness.next_write(WAIT).await;
    let names: Vec<String> = groups(&written.content)
        .into_iter()
        .map(|group| group.labels["pod"].clone())
        .collect();

    assert_eq!(names, vec!["nginx", "prometheus"]);
    assert_eq!(
        harness.coordinator.metrics().failures(ResourceKind::Pod),
        0
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_all_namespaces_groups_across_namespaces() {
    let config = Config {
        namespaces: vec![String::new()],
        with_nodes: false,
        format: OutputFormat::Json,
        dry_run: true,
        ..Default::default()
    };
    let mut harness = Harness::start(config, cluster());

    let written = harness.next_write(WAIT).await;
    assert!(written.dry_run);

    let parsed: Vec<TargetGroup> = serde_json::from_str(&written.content).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0].targets.len(), 3);
    assert_eq!(parsed[1].targets.len(), 2);

    harness.stop().await;
}

#[tokio::test]
async fn test_watch_setup_failure_is_fatal() {
    let cluster = cluster();
    cluster.fail_watch.store(true, Ordering::SeqCst);
    let mut harness = Harness::start(config(), cluster);

    let result = timeout(WAIT, &mut harness.task).await.unwrap().unwrap();

    assert!(matches!(result, Err(KubesdError::WatchSetupFailed(_))));
    assert_eq!(harness.coordinator.state(), CoordinatorState::Stopped);
    assert!(harness.written.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_watch_is_reestablished_after_stream_failure() {
    let config = Config {
        refresh_interval: Duration::from_secs(60),
        ..config()
    };
    let mut harness = Harness::start(config, cluster());
    let long_wait = Duration::from_secs(600);
    harness.next_regeneration(long_wait, 2).await;
    assert_eq!(harness.cluster.watch_calls.load(Ordering::SeqCst), 2);

    harness
        .cluster
        .push_pod(Err(KubesdError::WatchStreamFailed("410 Gone".to_string())));

    // the next tick re-opens both subscriptions and regenerates
    harness.next_regeneration(long_wait, 2).await;
    assert_eq!(harness.cluster.watch_calls.load(Ordering::SeqCst), 4);
    assert_eq!(harness.coordinator.state(), CoordinatorState::Running);

    harness
        .cluster
        .push_pod(Ok(change(ChangeKind::Added, "nginx-new")));
    harness.next_regeneration(long_wait, 2).await;
    assert_eq!(
        harness.coordinator.metrics().regenerations(Trigger::Event),
        1
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_out_of_range_interval_is_rejected() {
    let config = Config {
        refresh_interval: Duration::from_secs(u64::MAX),
        ..config()
    };
    let (writer, _written) = RecordingWriter::new();

    let result = Coordinator::new(config, Arc::new(cluster()), Arc::new(writer));

    assert!(matches!(result, Err(KubesdError::ConfigError(_))));
}

#[tokio::test]
async fn test_aborted_loop_releases_the_watch() {
    let mut harness = Harness::start(config(), cluster());
    harness.next_regeneration(WAIT, 2).await;
    assert!(!harness.cluster.feeds_closed());

    harness.task.abort();
    let _ = (&mut harness.task).await;

    timeout(WAIT, async {
        while !harness.cluster.feeds_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("watch subscriptions were not released");
}
