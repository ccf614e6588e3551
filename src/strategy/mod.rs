//! Strategy selection and desired-state construction
//!
//! [`build`] is a pure function of the CR, a capability snapshot and the
//! operator configuration. It normalizes a copy of the CR, picks exactly one
//! strategy builder and returns the normalized CR (to be persisted) together
//! with the [`DesiredState`] the orchestrator converges the cluster to.

mod all_in_one;
mod desired;
mod normalize;
mod production;
mod streaming;

pub(crate) use desired::with_object;
pub use desired::{DesiredState, IntoManaged, ManagedKind, ManagedObject};
pub use normalize::{normalize, DEFAULT_NAME};

use std::fmt;

use tracing::{debug, instrument};

use crate::builders::{
    account, agent, config_maps, ingress, jobs, monitor, oauth_proxy, service, BuildContext,
};
use crate::capabilities::CapabilitySnapshot;
use crate::config::OperatorConfig;
use crate::crd::Jaeger;
use crate::error::Result;

/// How the Jaeger components are deployed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeploymentStrategy {
    /// Single pod with every component
    AllInOne,
    /// Separate collector and query backed by external storage
    Production,
    /// Production with Kafka buffering between collector and ingester
    Streaming,
}

impl DeploymentStrategy {
    /// Parse a strategy name; the flag reports whether the input was not canonical
    ///
    /// Unknown values fall back to `AllInOne`.
    pub fn parse(value: &str) -> (Self, bool) {
        match value.to_ascii_lowercase().as_str() {
            "allinone" => (Self::AllInOne, false),
            "production" => (Self::Production, false),
            "streaming" => (Self::Streaming, false),
            _ => (Self::AllInOne, true),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllInOne => "allInOne",
            Self::Production => "production",
            Self::Streaming => "streaming",
        }
    }
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Span storage backends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageType {
    Memory,
    Cassandra,
    Elasticsearch,
    Kafka,
    Badger,
    GrpcPlugin,
}

impl StorageType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "cassandra" => Some(Self::Cassandra),
            "elasticsearch" => Some(Self::Elasticsearch),
            "kafka" => Some(Self::Kafka),
            "badger" => Some(Self::Badger),
            "grpc-plugin" => Some(Self::GrpcPlugin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Cassandra => "cassandra",
            Self::Elasticsearch => "elasticsearch",
            Self::Kafka => "kafka",
            Self::Badger => "badger",
            Self::GrpcPlugin => "grpc-plugin",
        }
    }

    /// Storage type of a normalized CR
    pub fn of(jaeger: &Jaeger) -> Self {
        Self::parse(&jaeger.spec.storage.storage_type).unwrap_or(Self::Memory)
    }
}

/// Outcome of one strategy pass
#[derive(Clone, Debug)]
pub struct Plan {
    /// Normalized CR, including self-provisioning changes
    pub jaeger: Jaeger,
    pub strategy: DeploymentStrategy,
    pub desired: DesiredState,
}

/// Normalize `jaeger` and build its desired state
#[instrument(skip_all, fields(name = ?jaeger.metadata.name, namespace = ?jaeger.metadata.namespace))]
pub fn build(jaeger: &Jaeger, caps: CapabilitySnapshot, config: &OperatorConfig) -> Result<Plan> {
    let mut jaeger = jaeger.clone();
    let strategy = normalize(&mut jaeger, &caps, config);
    let ctx = BuildContext::new(config, caps);

    let desired = match strategy {
        DeploymentStrategy::AllInOne => all_in_one::build(&mut jaeger, &ctx)?,
        DeploymentStrategy::Production => production::build(&mut jaeger, &ctx)?,
        DeploymentStrategy::Streaming => streaming::build(&mut jaeger, &ctx)?,
    };

    debug!(%strategy, objects = desired.len(), "Built desired state");
    Ok(Plan {
        jaeger,
        strategy,
        desired,
    })
}

/// Objects every strategy produces around its workloads
///
/// `ui_deployment` names the deployment serving the UI; it receives the OAuth
/// proxy sidecar when the UI is secured.
fn add_common(
    jaeger: &Jaeger,
    ctx: &BuildContext,
    desired: &mut DesiredState,
    ui_deployment: &str,
) -> Result<()> {
    let proxied = ingress::oauth_proxy_enabled(jaeger);

    desired.service_accounts.extend(account::workload(jaeger, ctx));
    desired.config_maps.push(config_maps::ui(jaeger, ctx)?);
    desired.config_maps.push(config_maps::sampling(jaeger, ctx)?);

    if proxied {
        desired.service_accounts.push(account::oauth_proxy(jaeger, ctx));
        if let Some(deployment) = desired
            .deployments
            .iter_mut()
            .find(|d| d.metadata.name.as_deref() == Some(ui_deployment))
        {
            oauth_proxy::wrap_deployment(deployment, jaeger, ctx);
        }
        if let Some(svc) = service::find_mut(&mut desired.services, &service::query_service_name(jaeger)) {
            oauth_proxy::wrap_service(svc, jaeger);
        }
        if ctx.caps.auth_delegator_available {
            desired
                .cluster_role_bindings
                .push(account::auth_delegator(jaeger, ctx));
        }
    }

    if agent::is_daemonset(jaeger) {
        desired.daemon_sets.push(agent::daemonset(jaeger, ctx));
    }

    if ingress::enabled(jaeger) {
        if ctx.caps.is_openshift() {
            let route = ingress::route(jaeger, ctx);
            desired
                .console_links
                .push(ingress::console_link(jaeger, ctx, &route));
            desired.routes.push(route);
        } else {
            desired.ingresses.push(ingress::ingress(jaeger, ctx));
        }
    }

    add_jobs(jaeger, ctx, desired);

    if ctx.config.service_monitors {
        let monitors = monitor::for_services(jaeger, ctx, &desired.services);
        desired.service_monitors.extend(monitors);
    }
    Ok(())
}

fn add_jobs(jaeger: &Jaeger, ctx: &BuildContext, desired: &mut DesiredState) {
    let storage = &jaeger.spec.storage;
    match StorageType::of(jaeger) {
        StorageType::Elasticsearch => {
            if jobs::uses_es_aliases(jaeger) {
                desired.dependencies.push(jobs::es_rollover_init(jaeger, ctx));
                desired.cron_jobs.extend(jobs::es_rollover(jaeger, ctx));
            }
            if storage.dependencies.enabled == Some(true) {
                desired.cron_jobs.push(jobs::spark_dependencies(jaeger, ctx));
            }
            if storage.es_index_cleaner.enabled == Some(true) {
                desired.cron_jobs.push(jobs::es_index_cleaner(jaeger, ctx));
            }
        }
        StorageType::Cassandra => {
            if storage.cassandra_create_schema.enabled == Some(true) {
                desired.dependencies.push(jobs::cassandra_schema(jaeger, ctx));
            }
            if storage.dependencies.enabled == Some(true) {
                desired.cron_jobs.push(jobs::spark_dependencies(jaeger, ctx));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parsing() {
        assert_eq!(
            DeploymentStrategy::parse("Production"),
            (DeploymentStrategy::Production, false)
        );
        assert_eq!(
            DeploymentStrategy::parse("allinone"),
            (DeploymentStrategy::AllInOne, false)
        );
        assert_eq!(
            DeploymentStrategy::parse("all-in-one"),
            (DeploymentStrategy::AllInOne, true)
        );
        assert_eq!(
            DeploymentStrategy::parse("bogus"),
            (DeploymentStrategy::AllInOne, true)
        );
    }

    #[test]
    fn storage_parsing() {
        assert_eq!(StorageType::parse("Elasticsearch"), Some(StorageType::Elasticsearch));
        assert_eq!(StorageType::parse("grpc-plugin"), Some(StorageType::GrpcPlugin));
        assert_eq!(StorageType::parse("mysql"), None);
    }
}
