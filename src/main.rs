use anyhow::Context;
use clap::Parser;
use kubesd::cli::Cli;
use kubesd::k8s::K8sClient;
use kubesd::output::FileWriter;
use kubesd::Coordinator;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.into_config().context("Invalid configuration")?;

    info!("Starting the Prometheus watcher service v{}", kubesd::VERSION);

    let client = K8sClient::try_default(config.name_label.clone())
        .await
        .context("Failed to create a client for the Kubernetes API")?;

    let coordinator = Coordinator::new(config, Arc::new(client), Arc::new(FileWriter::new()))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    coordinator
        .run(shutdown)
        .await
        .context("Failed to start watching for events from kubernetes")?;

    info!("kubesd stopped");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    info!("Shutdown signal received");
    shutdown.cancel();
}
