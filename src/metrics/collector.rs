use crate::k8s::events::ResourceKind;
use crate::{KubesdError, Result};
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

/// What caused a regeneration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Timer,
    Event,
}

impl Trigger {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Timer => "timer",
            Trigger::Event => "event",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Self-instrumentation of the regeneration loop
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    regenerations: IntCounterVec,
    failures: IntCounterVec,
    watch_events: IntCounterVec,
    targets: IntGaugeVec,
}

fn register_err(e: prometheus::Error) -> KubesdError {
    KubesdError::MetricsError(e.to_string())
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("kubesd".to_string()), None)
            .map_err(register_err)?;

        let regenerations = IntCounterVec::new(
            Opts::new("regenerations_total", "Regenerations performed, by trigger"),
            &["trigger"],
        )
        .map_err(register_err)?;
        let failures = IntCounterVec::new(
            Opts::new(
                "regeneration_failures_total",
                "Renders aborted because of an error, by resource",
            ),
            &["resource"],
        )
        .map_err(register_err)?;
        let watch_events = IntCounterVec::new(
            Opts::new("watch_events_total", "Change events received from the watcher"),
            &["resource"],
        )
        .map_err(register_err)?;
        let targets = IntGaugeVec::new(
            Opts::new("targets", "Targets emitted by the last render, by resource"),
            &["resource"],
        )
        .map_err(register_err)?;

        registry
            .register(Box::new(regenerations.clone()))
            .map_err(register_err)?;
        registry
            .register(Box::new(failures.clone()))
            .map_err(register_err)?;
        registry
            .register(Box::new(watch_events.clone()))
            .map_err(register_err)?;
        registry
            .register(Box::new(targets.clone()))
            .map_err(register_err)?;

        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))
            .map_err(register_err)?;

        Ok(Self {
            registry,
            regenerations,
            failures,
            watch_events,
            targets,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_regeneration(&self, trigger: Trigger) {
        self.regenerations
            .with_label_values(&[trigger.as_str()])
            .inc();
    }

    pub fn record_failure(&self, resource: ResourceKind) {
        self.failures.with_label_values(&[resource.as_str()]).inc();
    }

    pub fn record_watch_event(&self, resource: ResourceKind) {
        self.watch_events
            .with_label_values(&[resource.as_str()])
            .inc();
    }

    pub fn set_targets(&self, resource: ResourceKind, count: usize) {
        self.targets
            .with_label_values(&[resource.as_str()])
            .set(count as i64);
    }

    pub fn regenerations(&self, trigger: Trigger) -> u64 {
        self.regenerations
            .with_label_values(&[trigger.as_str()])
            .get()
    }

    pub fn failures(&self, resource: ResourceKind) -> u64 {
        self.failures.with_label_values(&[resource.as_str()]).get()
    }

    pub fn watch_events(&self, resource: ResourceKind) -> u64 {
        self.watch_events
            .with_label_values(&[resource.as_str()])
            .get()
    }

    pub fn targets(&self, resource: ResourceKind) -> i64 {
        self.targets.with_label_values(&[resource.as_str()]).get()
    }
}
