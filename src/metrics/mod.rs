pub mod collector;
pub mod exporter;

pub use collector::{Metrics, Trigger};
pub use exporter::TextfileExporter;
