//! Workspace Operator - status aggregation for Che workspaces

use clap::{Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};

use workspace_common::crd::{Workspace, WorkspaceExposure};
use workspace_common::telemetry::{init_telemetry, TelemetryConfig};
use workspace_common::ControllerConfig;

mod controller_runner;

/// Workspace operator - folds workspace child objects into Workspace status
#[derive(Parser, Debug)]
#[command(name = "workspace-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: ControllerConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches Workspaces and their Pods, Deployments and WorkspaceExposures
    /// and keeps each Workspace's status up to date.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [Workspace::crd(), WorkspaceExposure::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(TelemetryConfig::from_env())?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    tracing::info!(
        concurrency = config.concurrency,
        watch_timeout_secs = config.watch_timeout_secs,
        "Starting workspace controller"
    );
    controller_runner::run(client, config).await;
    tracing::info!("Workspace controller stopped");
    Ok(())
}

/// Ensure the Workspace CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply.
/// This ensures the CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(workspace_common::FIELD_MANAGER).force();

    for crd in [Workspace::crd(), WorkspaceExposure::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD...");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("All Workspace CRDs installed/updated");
    Ok(())
}
