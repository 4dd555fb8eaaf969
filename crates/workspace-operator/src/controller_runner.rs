//! Controller wiring
//!
//! One kube-rs `Controller` over Workspaces. Child object changes are routed
//! into it through `reconcile_on`, so they share its per-key queue and a
//! Workspace is never reconciled twice at the same time.

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Config as ControllerRuntimeConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use workspace_common::crd::Workspace;
use workspace_common::ControllerConfig;
use workspace_controller::{error_policy, owned_object_triggers, reconcile, Context};

/// Run the Workspace controller until a shutdown signal arrives
pub async fn run(client: Client, config: ControllerConfig) {
    let watcher_config = WatcherConfig::default().timeout(config.watch_timeout_secs);
    let runtime_config = ControllerRuntimeConfig::default().concurrency(config.concurrency);

    let ctx = Arc::new(Context::builder(client.clone()).config(config).build());
    let triggers = owned_object_triggers(client.clone(), ctx.kube.clone(), watcher_config.clone());

    let workspaces: Api<Workspace> = Api::all(client);
    Controller::new(workspaces, watcher_config)
        .with_config(runtime_config)
        .reconcile_on(triggers)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("Workspace"))
        .await;
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
