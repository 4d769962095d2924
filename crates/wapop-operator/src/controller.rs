//! Controller wiring: nodes drive passes, owned access points and actuation jobs feed
//! back into their node, and the settings objects fan out to every node.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Secret};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client};
use tracing::{debug, info, warn};
use wapop_core::mapper::{fan_out_cached, node_for_job};
use wapop_core::{AccessPoint, KubeStore, OperatorConfig, ReconcileError, Reconciler};

struct Context {
    reconciler: Reconciler<KubeStore>,
}

pub async fn run(client: Client, config: OperatorConfig) -> Result<()> {
    let config = Arc::new(config);
    let namespace = config.namespace.as_str();
    let settings_only =
        watcher::Config::default().fields(&format!("metadata.name={}", config.settings_name));

    let controller = Controller::new(Api::<Node>::all(client.clone()), watcher::Config::default());
    let nodes = controller.store();

    let config_map_mapper = {
        let config = config.clone();
        let nodes = nodes.clone();
        move |changed: ConfigMap| fan_out_cached(&changed.metadata, &nodes, &config)
    };
    let secret_mapper = {
        let config = config.clone();
        let nodes = nodes.clone();
        move |changed: Secret| fan_out_cached(&changed.metadata, &nodes, &config)
    };
    let job_mapper = {
        let config = config.clone();
        move |job: Job| node_for_job(&job.metadata, &config)
    };

    let context = Arc::new(Context {
        reconciler: Reconciler::new(Arc::new(KubeStore::new(client.clone())), config.clone()),
    });

    info!(namespace, "watching nodes");
    controller
        .owns(Api::<AccessPoint>::all(client.clone()), watcher::Config::default())
        .watches(
            Api::<Job>::namespaced(client.clone(), namespace),
            watcher::Config::default(),
            job_mapper,
        )
        .watches(
            Api::<ConfigMap>::namespaced(client.clone(), namespace),
            settings_only.clone(),
            config_map_mapper,
        )
        .watches(
            Api::<Secret>::namespaced(client, namespace),
            settings_only,
            secret_mapper,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((node, action)) => debug!(node = %node.name, ?action, "reconciled"),
                Err(err) => warn!(error = %err, "reconcile failed"),
            }
        })
        .await;
    info!("controller stopped");
    Ok(())
}

async fn reconcile(node: Arc<Node>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let name = node
        .metadata
        .name
        .as_deref()
        .ok_or(ReconcileError::MissingField("node metadata.name"))?;
    let outcome = ctx.reconciler.reconcile_with_deadline(name).await?;
    Ok(match outcome.requeue_after(ctx.reconciler.config()) {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    })
}

fn error_policy(node: Arc<Node>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    let delay = ctx.reconciler.config().error_requeue;
    warn!(
        node = node.metadata.name.as_deref().unwrap_or_default(),
        error = %err,
        ?delay,
        "reconciliation pass failed, requeueing"
    );
    Action::requeue(delay)
}
