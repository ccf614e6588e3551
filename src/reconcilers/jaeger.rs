//! Apply orchestration for one Jaeger instance
//!
//! One pass rebuilds the desired state and converges every managed kind in a
//! fixed order. The blocking dependency jobs run once the storage backends
//! they talk to are ready and before any Jaeger component is applied.
//! Deployments must stabilize before anything no longer wanted is removed.
//! Nothing is remembered between passes.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::waiters;
use crate::builders::ingress;
use crate::capabilities::CapabilitySnapshot;
use crate::config::OperatorConfig;
use crate::crd::Jaeger;
use crate::error::{Error, Result};
use crate::inventory::{diff, Reconciled};
use crate::labels;
use crate::metrics::{APPLIED_OBJECTS, MANAGED_RESOURCES};
use crate::store::{object_key, ObjectStore};
use crate::strategy::{
    self, with_object, DeploymentStrategy, DesiredState, IntoManaged, ManagedKind, ManagedObject,
    Plan,
};

/// Result of a successful pass
#[derive(Clone, Debug)]
pub struct Outcome {
    /// Normalized CR as persisted
    pub jaeger: Jaeger,
    pub strategy: DeploymentStrategy,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Whether the CR itself had to be written back
    pub persisted: bool,
}

/// Converges the cluster to the desired state of Jaeger instances
pub struct Orchestrator<'a, S> {
    store: &'a S,
    config: &'a OperatorConfig,
    cancel: &'a CancellationToken,
}

impl<'a, S: ObjectStore> Orchestrator<'a, S> {
    pub fn new(store: &'a S, config: &'a OperatorConfig, cancel: &'a CancellationToken) -> Self {
        Self {
            store,
            config,
            cancel,
        }
    }

    /// Run one full pass for `jaeger`
    #[instrument(skip_all, fields(name = %jaeger.name_any(), namespace = ?jaeger.namespace()))]
    pub async fn reconcile(&self, jaeger: &Jaeger, caps: CapabilitySnapshot) -> Result<Outcome> {
        let namespace = jaeger
            .namespace()
            .ok_or_else(|| Error::validation("Jaeger instance has no namespace"))?;

        let Plan {
            jaeger: normalized,
            strategy,
            desired,
        } = strategy::build(jaeger, caps, self.config)?;
        info!(%strategy, objects = desired.len(), "Reconciling Jaeger instance");

        let DesiredState {
            service_accounts,
            config_maps,
            secrets,
            roles,
            role_bindings,
            cluster_role_bindings,
            elasticsearches,
            kafkas,
            kafka_users,
            services,
            deployments,
            daemon_sets,
            autoscalers,
            ingresses,
            routes,
            console_links,
            cron_jobs,
            service_monitors,
            dependencies,
        } = desired;

        let instance = normalized.name_any();
        let mut pass = Pass {
            store: self.store,
            namespace: namespace.clone(),
            selector: labels::ownership_selector(&instance, &self.config.identity),
            cluster_selector: labels::cluster_ownership_selector(
                &instance,
                &namespace,
                &self.config.identity,
            ),
            deletes: Vec::new(),
            created: 0,
            updated: 0,
        };

        pass.converge(ManagedKind::ServiceAccount, service_accounts).await?;
        pass.converge(ManagedKind::ConfigMap, config_maps).await?;
        pass.converge(ManagedKind::Secret, secrets).await?;
        pass.converge(ManagedKind::Role, roles).await?;
        pass.converge(ManagedKind::RoleBinding, role_bindings).await?;
        pass.converge(ManagedKind::ClusterRoleBinding, cluster_role_bindings)
            .await?;

        for es in pass.converge(ManagedKind::Elasticsearch, elasticsearches).await? {
            waiters::elasticsearch_ready(self.store, &namespace, &es.name_any(), self.cancel)
                .await?;
        }
        for kafka in pass.converge(ManagedKind::Kafka, kafkas).await? {
            waiters::condition_ready(self.store, &kafka, self.cancel).await?;
        }
        for user in pass.converge(ManagedKind::KafkaUser, kafka_users).await? {
            waiters::condition_ready(self.store, &user, self.cancel).await?;
        }

        // schema and index jobs need the backend and its certificates
        self.run_dependencies(&dependencies).await?;

        pass.converge(ManagedKind::Service, services).await?;
        let applied_deployments = pass.converge(ManagedKind::Deployment, deployments).await?;
        pass.converge(ManagedKind::DaemonSet, daemon_sets).await?;
        pass.converge(ManagedKind::HorizontalPodAutoscaler, autoscalers)
            .await?;
        pass.converge(ManagedKind::Ingress, ingresses).await?;
        let applied_routes = pass.converge(ManagedKind::Route, routes).await?;
        let console_links = ingress::resolve_console_links(console_links, &applied_routes);
        pass.converge(ManagedKind::ConsoleLink, console_links).await?;
        pass.converge(ManagedKind::CronJob, cron_jobs).await?;
        pass.converge(ManagedKind::ServiceMonitor, service_monitors)
            .await?;

        self.wait_for_deployments(&applied_deployments).await?;

        let deleted = pass.deletes.len();
        for obj in pass.deletes {
            self.delete(obj).await?;
        }

        let persisted = normalized.spec != jaeger.spec || normalized.metadata != jaeger.metadata;
        let jaeger = if persisted {
            debug!("Persisting normalized instance");
            self.store.update(&normalized).await?
        } else {
            normalized
        };

        info!(
            %strategy,
            created = pass.created,
            updated = pass.updated,
            deleted,
            persisted,
            "Jaeger instance reconciled"
        );
        Ok(Outcome {
            jaeger,
            strategy,
            created: pass.created,
            updated: pass.updated,
            deleted,
            persisted,
        })
    }

    /// Create each blocking job and wait for it to succeed
    async fn run_dependencies(&self, jobs: &[Job]) -> Result<()> {
        for job in jobs {
            match self.store.create(job).await {
                Ok(_) => record_write("Job", "create"),
                Err(e) if e.is_already_exists() => {
                    debug!(job = %object_key(job), "Dependency job already exists")
                }
                Err(e) => return Err(e),
            }
            waiters::job_completion(self.store, job, self.cancel).await?;
        }
        Ok(())
    }

    async fn wait_for_deployments(&self, deployments: &[Deployment]) -> Result<()> {
        for deployment in deployments {
            waiters::deployment_stable(self.store, deployment, self.cancel).await?;
        }
        Ok(())
    }

    async fn delete(&self, obj: ManagedObject) -> Result<()> {
        let kind = obj.kind();
        debug!(object = %obj, "Deleting object no longer desired");
        let result = with_object!(&obj, o => self.store.delete(o).await);
        match result {
            Ok(()) => {
                record_write(kind.as_str(), "delete");
                MANAGED_RESOURCES.with_label_values(&[kind.as_str()]).dec();
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Per-pass bookkeeping shared by every kind
struct Pass<'a, S> {
    store: &'a S,
    namespace: String,
    selector: String,
    cluster_selector: String,
    deletes: Vec<ManagedObject>,
    created: usize,
    updated: usize,
}

impl<S: ObjectStore> Pass<'_, S> {
    /// Create and update one kind, queueing its deletes; returns the applied objects
    async fn converge<K>(&mut self, kind: ManagedKind, desired: Vec<K>) -> Result<Vec<K>>
    where
        K: Reconciled + IntoManaged,
    {
        let existing: Vec<K> = if kind.is_cluster_scoped() {
            self.store.list(None, &self.cluster_selector).await?
        } else {
            self.store
                .list(Some(&self.namespace), &self.selector)
                .await?
        };

        let inventory = diff(existing, desired);
        if !inventory.is_empty() {
            debug!(
                %kind,
                create = inventory.create.len(),
                update = inventory.update.len(),
                delete = inventory.delete.len(),
                "Inventory"
            );
        }

        let mut applied = Vec::with_capacity(inventory.create.len() + inventory.update.len());
        for obj in inventory.create {
            match self.store.create(&obj).await {
                Ok(created) => {
                    record_write(kind.as_str(), "create");
                    MANAGED_RESOURCES.with_label_values(&[kind.as_str()]).inc();
                    self.created += 1;
                    applied.push(created);
                }
                Err(e) if e.is_already_exists() => {
                    warn!(%kind, key = %object_key(&obj), "Object exists but is not owned by this instance");
                    applied.push(obj);
                }
                Err(e) => return Err(e),
            }
        }
        for obj in inventory.update {
            let updated = self.store.update(&obj).await?;
            record_write(kind.as_str(), "update");
            self.updated += 1;
            applied.push(updated);
        }

        self.deletes
            .extend(inventory.delete.into_iter().map(IntoManaged::into_managed));
        Ok(applied)
    }
}

fn record_write(kind: &str, operation: &str) {
    APPLIED_OBJECTS.with_label_values(&[kind, operation]).inc();
}
