//! Jaeger controller
//!
//! Watches Jaeger resources and triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::{ConsoleLink, Jaeger};
use crate::error::{Error, Result};
use crate::labels;
use crate::metrics;
use crate::reconcilers::status::{self, StatusReport};
use crate::reconcilers::Orchestrator;
use crate::store::{ObjectStore, StoredObject};

/// Finalizer name for Jaeger resources
const FINALIZER_NAME: &str = "finalizer.jaegertracing.io";

/// Resync interval for healthy instances
const RESYNC: Duration = Duration::from_secs(300);

/// Run the Jaeger controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<Jaeger> = Api::all(client.clone());

    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("Jaeger CRD not installed: {}", e);
        return;
    }

    info!("Starting Jaeger controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled Jaeger"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Jaeger>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["Jaeger"])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&["Jaeger"]).inc();

    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::validation("Jaeger instance has no namespace"))?;
    let api: Api<Jaeger> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(jaeger) => apply(jaeger, ctx.clone()).await,
            FinalizerEvent::Cleanup(jaeger) => cleanup(jaeger, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// Converge the instance and report the outcome in its status
async fn apply(jaeger: Arc<Jaeger>, ctx: Arc<Context>) -> Result<Action> {
    let caps = ctx.capabilities.snapshot();
    let orchestrator = Orchestrator::new(&ctx.store, &ctx.config, &ctx.cancel);

    match orchestrator.reconcile(&jaeger, caps).await {
        Ok(outcome) => {
            let report =
                StatusReport::running(&ctx.config.jaeger_version, outcome.strategy.as_str());
            status::update_status(&outcome.jaeger, &ctx.client, &report).await?;
            Ok(Action::requeue(RESYNC))
        }
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            let report = StatusReport::failed(&e.to_string(), failure_reason(&e));
            if let Err(status_err) = status::update_status(&jaeger, &ctx.client, &report).await {
                warn!(error = %status_err, "Failed to record failure in status");
            }
            Err(e)
        }
    }
}

/// Remove cluster-scoped objects, which owner references cannot collect
async fn cleanup(jaeger: Arc<Jaeger>, ctx: Arc<Context>) -> Result<Action> {
    let name = jaeger.name_any();
    let namespace = jaeger.namespace().unwrap_or_default();
    info!(name = %name, "Cleaning up Jaeger");

    let selector = labels::cluster_ownership_selector(&name, &namespace, &ctx.config.identity);
    delete_all::<ClusterRoleBinding, _>(&ctx.store, &selector).await?;
    delete_all::<ConsoleLink, _>(&ctx.store, &selector).await?;

    metrics::CLEANUPS.with_label_values(&["Jaeger"]).inc();

    Ok(Action::await_change())
}

async fn delete_all<K: StoredObject, S: ObjectStore>(store: &S, selector: &str) -> Result<()> {
    for obj in store.list::<K>(None, selector).await? {
        store.delete(&obj).await?;
    }
    Ok(())
}

fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::DeadlineExceeded { .. } => "DeadlineExceeded",
        Error::ExternallyRemoved { .. } => "ExternallyRemoved",
        Error::JobFailed { .. } => "DependencyFailed",
        Error::Config(_) | Error::Validation(_) => "ValidationFailed",
        _ => "ReconcileFailed",
    }
}

/// Requeue delay for a failed reconcile
pub fn error_policy_delay(error: &Error) -> Duration {
    match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::DeadlineExceeded { .. } | Error::ExternallyRemoved { .. } => {
            Duration::from_secs(15)
        }
        Error::Config(_) | Error::Validation(_) => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    }
}

/// Error policy for the controller
fn error_policy(obj: Arc<Jaeger>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );
    metrics::RECONCILIATION_ERRORS
        .with_label_values(&["Jaeger", error.metric_label()])
        .inc();

    Action::requeue(error_policy_delay(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requeue_delays_follow_error_class() {
        assert_eq!(
            error_policy_delay(&Error::deadline("Deployment ns.x", Duration::from_secs(300))),
            Duration::from_secs(15)
        );
        assert_eq!(
            error_policy_delay(&Error::ExternallyRemoved {
                kind: "Kafka".to_string(),
                key: "ns.demo".to_string()
            }),
            Duration::from_secs(15)
        );
        assert_eq!(
            error_policy_delay(&Error::validation("bad")),
            Duration::from_secs(300)
        );
        assert_eq!(error_policy_delay(&Error::Cancelled), Duration::from_secs(30));
    }

    #[test]
    fn failure_reasons() {
        assert_eq!(
            failure_reason(&Error::JobFailed {
                key: "ns.job".to_string()
            }),
            "DependencyFailed"
        );
        assert_eq!(failure_reason(&Error::config("x")), "ValidationFailed");
    }
}
