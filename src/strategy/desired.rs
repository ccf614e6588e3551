//! The desired-state aggregate

use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, Role, RoleBinding};

use crate::crd::{ConsoleLink, Elasticsearch, Kafka, KafkaUser, Route, ServiceMonitor};
use crate::store::object_key;

/// Every object one instance should own, one ordered list per kind
///
/// Rebuilt from the CR on every reconcile.
#[derive(Clone, Debug, Default)]
pub struct DesiredState {
    pub service_accounts: Vec<ServiceAccount>,
    pub config_maps: Vec<ConfigMap>,
    pub secrets: Vec<Secret>,
    pub roles: Vec<Role>,
    pub role_bindings: Vec<RoleBinding>,
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
    pub elasticsearches: Vec<Elasticsearch>,
    pub kafkas: Vec<Kafka>,
    pub kafka_users: Vec<KafkaUser>,
    pub services: Vec<Service>,
    pub deployments: Vec<Deployment>,
    pub daemon_sets: Vec<DaemonSet>,
    pub autoscalers: Vec<HorizontalPodAutoscaler>,
    pub ingresses: Vec<Ingress>,
    pub routes: Vec<Route>,
    pub console_links: Vec<ConsoleLink>,
    pub cron_jobs: Vec<CronJob>,
    pub service_monitors: Vec<ServiceMonitor>,
    /// Jobs that must succeed before anything else is applied
    pub dependencies: Vec<Job>,
}

impl DesiredState {
    /// Number of desired objects of a kind
    pub fn count(&self, kind: ManagedKind) -> usize {
        match kind {
            ManagedKind::ServiceAccount => self.service_accounts.len(),
            ManagedKind::ConfigMap => self.config_maps.len(),
            ManagedKind::Secret => self.secrets.len(),
            ManagedKind::Role => self.roles.len(),
            ManagedKind::RoleBinding => self.role_bindings.len(),
            ManagedKind::ClusterRoleBinding => self.cluster_role_bindings.len(),
            ManagedKind::Elasticsearch => self.elasticsearches.len(),
            ManagedKind::Kafka => self.kafkas.len(),
            ManagedKind::KafkaUser => self.kafka_users.len(),
            ManagedKind::Service => self.services.len(),
            ManagedKind::Deployment => self.deployments.len(),
            ManagedKind::DaemonSet => self.daemon_sets.len(),
            ManagedKind::HorizontalPodAutoscaler => self.autoscalers.len(),
            ManagedKind::Ingress => self.ingresses.len(),
            ManagedKind::Route => self.routes.len(),
            ManagedKind::ConsoleLink => self.console_links.len(),
            ManagedKind::CronJob => self.cron_jobs.len(),
            ManagedKind::ServiceMonitor => self.service_monitors.len(),
        }
    }

    /// Total number of managed objects, excluding dependency jobs
    pub fn len(&self) -> usize {
        ManagedKind::APPLY_ORDER.iter().map(|k| self.count(*k)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.dependencies.is_empty()
    }
}

/// Kinds the orchestrator converges, in apply order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagedKind {
    ServiceAccount,
    ConfigMap,
    Secret,
    Role,
    RoleBinding,
    ClusterRoleBinding,
    Elasticsearch,
    Kafka,
    KafkaUser,
    Service,
    Deployment,
    DaemonSet,
    HorizontalPodAutoscaler,
    Ingress,
    Route,
    ConsoleLink,
    CronJob,
    ServiceMonitor,
}

impl ManagedKind {
    pub const APPLY_ORDER: [ManagedKind; 18] = [
        ManagedKind::ServiceAccount,
        ManagedKind::ConfigMap,
        ManagedKind::Secret,
        ManagedKind::Role,
        ManagedKind::RoleBinding,
        ManagedKind::ClusterRoleBinding,
        ManagedKind::Elasticsearch,
        ManagedKind::Kafka,
        ManagedKind::KafkaUser,
        ManagedKind::Service,
        ManagedKind::Deployment,
        ManagedKind::DaemonSet,
        ManagedKind::HorizontalPodAutoscaler,
        ManagedKind::Ingress,
        ManagedKind::Route,
        ManagedKind::ConsoleLink,
        ManagedKind::CronJob,
        ManagedKind::ServiceMonitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ManagedKind::ServiceAccount => "ServiceAccount",
            ManagedKind::ConfigMap => "ConfigMap",
            ManagedKind::Secret => "Secret",
            ManagedKind::Role => "Role",
            ManagedKind::RoleBinding => "RoleBinding",
            ManagedKind::ClusterRoleBinding => "ClusterRoleBinding",
            ManagedKind::Elasticsearch => "Elasticsearch",
            ManagedKind::Kafka => "Kafka",
            ManagedKind::KafkaUser => "KafkaUser",
            ManagedKind::Service => "Service",
            ManagedKind::Deployment => "Deployment",
            ManagedKind::DaemonSet => "DaemonSet",
            ManagedKind::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            ManagedKind::Ingress => "Ingress",
            ManagedKind::Route => "Route",
            ManagedKind::ConsoleLink => "ConsoleLink",
            ManagedKind::CronJob => "CronJob",
            ManagedKind::ServiceMonitor => "ServiceMonitor",
        }
    }

    /// Cluster-scoped kinds carry no namespace and no owner reference
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, ManagedKind::ClusterRoleBinding | ManagedKind::ConsoleLink)
    }
}

impl fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One managed object of any kind
#[derive(Clone, Debug)]
pub enum ManagedObject {
    ServiceAccount(ServiceAccount),
    ConfigMap(ConfigMap),
    Secret(Secret),
    Role(Role),
    RoleBinding(RoleBinding),
    ClusterRoleBinding(ClusterRoleBinding),
    Elasticsearch(Elasticsearch),
    Kafka(Kafka),
    KafkaUser(KafkaUser),
    Service(Service),
    Deployment(Deployment),
    DaemonSet(DaemonSet),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
    Ingress(Ingress),
    Route(Route),
    ConsoleLink(ConsoleLink),
    CronJob(CronJob),
    ServiceMonitor(ServiceMonitor),
}

/// Apply `$body` to the object inside any variant
macro_rules! with_object {
    ($value:expr, $obj:ident => $body:expr) => {
        match $value {
            ManagedObject::ServiceAccount($obj) => $body,
            ManagedObject::ConfigMap($obj) => $body,
            ManagedObject::Secret($obj) => $body,
            ManagedObject::Role($obj) => $body,
            ManagedObject::RoleBinding($obj) => $body,
            ManagedObject::ClusterRoleBinding($obj) => $body,
            ManagedObject::Elasticsearch($obj) => $body,
            ManagedObject::Kafka($obj) => $body,
            ManagedObject::KafkaUser($obj) => $body,
            ManagedObject::Service($obj) => $body,
            ManagedObject::Deployment($obj) => $body,
            ManagedObject::DaemonSet($obj) => $body,
            ManagedObject::HorizontalPodAutoscaler($obj) => $body,
            ManagedObject::Ingress($obj) => $body,
            ManagedObject::Route($obj) => $body,
            ManagedObject::ConsoleLink($obj) => $body,
            ManagedObject::CronJob($obj) => $body,
            ManagedObject::ServiceMonitor($obj) => $body,
        }
    };
}
pub(crate) use with_object;

impl ManagedObject {
    pub fn kind(&self) -> ManagedKind {
        match self {
            ManagedObject::ServiceAccount(_) => ManagedKind::ServiceAccount,
            ManagedObject::ConfigMap(_) => ManagedKind::ConfigMap,
            ManagedObject::Secret(_) => ManagedKind::Secret,
            ManagedObject::Role(_) => ManagedKind::Role,
            ManagedObject::RoleBinding(_) => ManagedKind::RoleBinding,
            ManagedObject::ClusterRoleBinding(_) => ManagedKind::ClusterRoleBinding,
            ManagedObject::Elasticsearch(_) => ManagedKind::Elasticsearch,
            ManagedObject::Kafka(_) => ManagedKind::Kafka,
            ManagedObject::KafkaUser(_) => ManagedKind::KafkaUser,
            ManagedObject::Service(_) => ManagedKind::Service,
            ManagedObject::Deployment(_) => ManagedKind::Deployment,
            ManagedObject::DaemonSet(_) => ManagedKind::DaemonSet,
            ManagedObject::HorizontalPodAutoscaler(_) => ManagedKind::HorizontalPodAutoscaler,
            ManagedObject::Ingress(_) => ManagedKind::Ingress,
            ManagedObject::Route(_) => ManagedKind::Route,
            ManagedObject::ConsoleLink(_) => ManagedKind::ConsoleLink,
            ManagedObject::CronJob(_) => ManagedKind::CronJob,
            ManagedObject::ServiceMonitor(_) => ManagedKind::ServiceMonitor,
        }
    }

    /// `namespace.name` of the wrapped object
    pub fn key(&self) -> String {
        with_object!(self, obj => object_key(obj))
    }
}

impl fmt::Display for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.key())
    }
}

/// Wrap typed objects into [`ManagedObject`]s
pub trait IntoManaged: Sized {
    fn into_managed(self) -> ManagedObject;
}

macro_rules! into_managed {
    ($($kind:ident),+ $(,)?) => {
        $(
            impl IntoManaged for $kind {
                fn into_managed(self) -> ManagedObject {
                    ManagedObject::$kind(self)
                }
            }
        )+
    };
}

into_managed!(
    ServiceAccount,
    ConfigMap,
    Secret,
    Role,
    RoleBinding,
    ClusterRoleBinding,
    Elasticsearch,
    Kafka,
    KafkaUser,
    Service,
    Deployment,
    DaemonSet,
    HorizontalPodAutoscaler,
    Ingress,
    Route,
    ConsoleLink,
    CronJob,
    ServiceMonitor,
);

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    #[test]
    fn apply_order_covers_every_kind_once() {
        let mut seen = std::collections::HashSet::new();
        for kind in ManagedKind::APPLY_ORDER {
            assert!(seen.insert(kind), "{} listed twice", kind);
        }
        assert_eq!(seen.len(), 18);
        let services = ManagedKind::APPLY_ORDER
            .iter()
            .position(|k| *k == ManagedKind::Service);
        let kafka = ManagedKind::APPLY_ORDER
            .iter()
            .position(|k| *k == ManagedKind::Kafka);
        assert!(kafka < services);
    }

    #[test]
    fn managed_object_reports_kind_and_key() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("demo-ui-configuration".to_string()),
                namespace: Some("obs".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let managed = cm.into_managed();
        assert_eq!(managed.kind(), ManagedKind::ConfigMap);
        assert_eq!(managed.to_string(), "ConfigMap obs.demo-ui-configuration");
    }
}
