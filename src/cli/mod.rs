use crate::config::{self, Config, OutputFormat};
use crate::Result;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "kubesd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Renders Prometheus file_sd targets from Kubernetes nodes and pods", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(
        long,
        env = "KUBESD_INTERVAL",
        default_value_t = config::DEFAULT_REFRESH_SECS,
        help = "Seconds between forced regenerations"
    )]
    pub interval: u64,

    #[arg(long, default_value_t = true, action = ArgAction::Set, help = "Generate targets for every cluster node")]
    pub nodes: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set, help = "Generate targets for annotated pods")]
    pub pods: bool,

    #[arg(
        long,
        env = "KUBESD_NAMESPACES",
        default_value = "default",
        help = "Comma separated namespaces to scan for pods (empty for all)"
    )]
    pub namespaces: String,

    #[arg(long, default_value = config::DEFAULT_METRIC_ANNOTATION, help = "Pod annotation carrying the metrics endpoints")]
    pub metrics: String,

    #[arg(long, default_value = config::DEFAULT_NAME_LABEL, help = "Pod label used to group pods into services")]
    pub name_label: String,

    #[arg(long, default_value_t = config::DEFAULT_NODE_PORT, help = "Port appended to every node target")]
    pub node_port: u16,

    #[arg(long = "config", default_value = ".", help = "Directory the target files are written to")]
    pub config_directory: PathBuf,

    #[arg(long, default_value = "nodes.yml", help = "Filename of the node targets")]
    pub node_file: String,

    #[arg(long, default_value = "pods.yml", help = "Filename of the pod targets")]
    pub pod_file: String,

    #[arg(long, default_value = "yaml", help = "Output format (yaml, json)")]
    pub format: String,

    #[arg(long, help = "Print the rendered targets instead of writing them")]
    pub dry_run: bool,

    #[arg(long, help = "Write the service's own metrics to this textfile")]
    pub metrics_file: Option<PathBuf>,
}

impl Cli {
    pub fn into_config(self) -> Result<Config> {
        let format: OutputFormat = self.format.parse()?;

        let config = Config {
            refresh_interval: Duration::from_secs(self.interval),
            with_nodes: self.nodes,
            with_pods: self.pods,
            namespaces: config::parse_namespaces(&self.namespaces),
            metric_annotation: self.metrics,
            name_label: self.name_label,
            node_port: self.node_port,
            config_directory: self.config_directory,
            nodes_filename: self.node_file,
            pods_filename: self.pod_file,
            format,
            dry_run: self.dry_run,
            metrics_file: self.metrics_file,
        };

        config.validate()?;
        Ok(config)
    }
}
