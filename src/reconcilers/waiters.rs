//! Readiness checks built on [`poll_until`]
//!
//! A missing object always means "not yet", except for objects that were
//! already observed once: those fail with [`Error::ExternallyRemoved`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::crd::{Condition, Kafka, KafkaUser};
use crate::error::{Error, Result};
use crate::labels;
use crate::metrics::WAITS;
use crate::poll::{poll_until, PollSettings, STABILITY};
use crate::store::{kind_of, object_key, ObjectStore, StoredObject};

/// Deadline for dependency jobs without `activeDeadlineSeconds`
pub const DEFAULT_JOB_DEADLINE: Duration = Duration::from_secs(120);

/// Kubernetes default for `spec.backoffLimit`
const DEFAULT_BACKOFF_LIMIT: i32 = 6;

/// Objects exposing `status.conditions[]`
pub trait HasConditions {
    fn conditions(&self) -> &[Condition];
}

impl HasConditions for Kafka {
    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or_default()
    }
}

impl HasConditions for KafkaUser {
    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map(|s| s.conditions.as_slice()).unwrap_or_default()
    }
}

/// Whether a `Ready` condition reports `True`, both compared case-insensitively
pub fn is_condition_ready(conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .any(|c| c.type_.eq_ignore_ascii_case("ready") && c.status.eq_ignore_ascii_case("true"))
}

/// Whether a deployment runs as many ready replicas as it asks for
///
/// A deployment its controller has not observed yet has no status and is
/// not stable.
pub fn is_deployment_stable(deployment: &Deployment) -> bool {
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    let replicas = status.replicas.unwrap_or(0);
    status.ready_replicas.unwrap_or(0) == replicas
}

/// Outcome of one look at a job
fn job_state(job: &Job) -> Result<bool> {
    let status = job.status.clone().unwrap_or_default();
    if status.succeeded.unwrap_or(0) >= 1 {
        return Ok(true);
    }
    let backoff = job
        .spec
        .as_ref()
        .and_then(|s| s.backoff_limit)
        .unwrap_or(DEFAULT_BACKOFF_LIMIT);
    if status.failed.unwrap_or(0) >= backoff + 1 {
        return Err(Error::JobFailed {
            key: object_key(job),
        });
    }
    Ok(false)
}

fn job_deadline(job: &Job) -> Duration {
    job.spec
        .as_ref()
        .and_then(|s| s.active_deadline_seconds)
        .and_then(|secs| u64::try_from(secs).ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_JOB_DEADLINE)
}

fn record<T>(target: &str, result: &Result<T>) {
    let outcome = match result {
        Ok(_) => "ready",
        Err(e) => e.metric_label(),
    };
    WAITS.with_label_values(&[target, outcome]).inc();
}

/// Wait for a dependency job to succeed
pub async fn job_completion<S: ObjectStore>(
    store: &S,
    job: &Job,
    cancel: &CancellationToken,
) -> Result<()> {
    let namespace = job.namespace();
    let (namespace, name) = (namespace.as_deref(), job.name_any());
    let name = name.as_str();
    let settings = PollSettings::new(Duration::from_secs(1), job_deadline(job));

    let what = format!("Job {}", object_key(job));
    let result = poll_until(&what, settings, cancel, move || async move {
        match store.get::<Job>(namespace, name).await? {
            Some(current) => job_state(&current),
            None => Ok(false),
        }
    })
    .await;
    record("job", &result);
    result
}

/// Wait until a deployment is stable
pub async fn deployment_stable<S: ObjectStore>(
    store: &S,
    deployment: &Deployment,
    cancel: &CancellationToken,
) -> Result<()> {
    let namespace = deployment.namespace();
    let (namespace, name) = (namespace.as_deref(), deployment.name_any());
    let name = name.as_str();

    let what = format!("Deployment {}", object_key(deployment));
    let result = poll_until(&what, STABILITY, cancel, move || async move {
        Ok(store
            .get::<Deployment>(namespace, name)
            .await?
            .is_some_and(|d| is_deployment_stable(&d)))
    })
    .await;
    record("deployment", &result);
    result
}

/// Wait for an externally provisioned object to report `Ready`
pub async fn condition_ready<S, K>(store: &S, obj: &K, cancel: &CancellationToken) -> Result<()>
where
    S: ObjectStore,
    K: StoredObject + HasConditions,
{
    let kind = kind_of::<K>();
    let key = object_key(obj);
    let namespace = obj.namespace();
    let name = obj.name_any();
    let (kind_ref, key_ref) = (kind.as_str(), key.as_str());
    let (namespace, name) = (namespace.as_deref(), name.as_str());
    let seen = &AtomicBool::new(false);

    let what = format!("{} {}", kind, key);
    let result = poll_until(&what, STABILITY, cancel, move || async move {
        match store.get::<K>(namespace, name).await? {
            Some(current) => {
                seen.store(true, Ordering::Relaxed);
                Ok(is_condition_ready(current.conditions()))
            }
            None if seen.load(Ordering::Relaxed) => Err(Error::ExternallyRemoved {
                kind: kind_ref.to_string(),
                key: key_ref.to_string(),
            }),
            None => Ok(false),
        }
    })
    .await;
    record(&kind.to_ascii_lowercase(), &result);
    result
}

/// Wait until the nodes of a provisioned Elasticsearch cluster are stable
///
/// The cluster counts as ready once at least one deployment labelled with its
/// name exists and all of them are stable.
pub async fn elasticsearch_ready<S: ObjectStore>(
    store: &S,
    namespace: &str,
    es_name: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let key = format!("{}.{}", namespace, es_name);
    let selector = format!("{}={}", labels::ES_CLUSTER_NAME, es_name);
    let (key_ref, selector) = (key.as_str(), selector.as_str());
    let seen = &AtomicBool::new(false);

    let what = format!("Elasticsearch {}", key);
    let result = poll_until(&what, STABILITY, cancel, move || async move {
        let nodes: Vec<Deployment> = store.list(Some(namespace), selector).await?;
        if nodes.is_empty() {
            if seen.load(Ordering::Relaxed) {
                return Err(Error::ExternallyRemoved {
                    kind: "Elasticsearch".to_string(),
                    key: key_ref.to_string(),
                });
            }
            return Ok(false);
        }
        seen.store(true, Ordering::Relaxed);
        let stable = nodes.iter().filter(|d| is_deployment_stable(d)).count();
        debug!(es = %key_ref, nodes = nodes.len(), stable, "Elasticsearch nodes");
        Ok(stable == nodes.len())
    })
    .await;
    record("elasticsearch", &result);
    result
}
