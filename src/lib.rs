pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod output;
pub mod targets;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{KubesdError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
