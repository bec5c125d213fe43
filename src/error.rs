use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubesdError {
    #[error("invalid metrics annotation {annotation:?}: {reason}")]
    InvalidAnnotation { annotation: String, reason: String },

    #[error("Failed to establish watch: {0}")]
    WatchSetupFailed(String),

    #[error("Watch stream failed: {0}")]
    WatchStreamFailed(String),

    #[error("Failed to list {resource}: {reason}")]
    ListingFailed { resource: String, reason: String },

    #[error("Failed to look up namespace {namespace}: {reason}")]
    NamespaceLookupFailed { namespace: String, reason: String },

    #[error("Failed to serialize target groups: {0}")]
    SerializationFailed(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl KubesdError {
    pub(crate) fn listing(resource: &str, reason: impl ToString) -> Self {
        KubesdError::ListingFailed {
            resource: resource.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, KubesdError>;
