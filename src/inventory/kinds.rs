//! Per-kind field ownership for the differ

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, Role, RoleBinding};

use super::Reconciled;
use crate::crd::{ConsoleLink, Elasticsearch, Kafka, KafkaUser, Route, ServiceMonitor};

/// Kinds whose whole `spec` belongs to the operator
macro_rules! owns_spec {
    ($($kind:ty),+ $(,)?) => {
        $(
            impl Reconciled for $kind {
                fn merge_from(&mut self, desired: &Self) {
                    self.spec = desired.spec.clone();
                }
            }
        )+
    };
}

owns_spec!(
    Deployment,
    DaemonSet,
    CronJob,
    Ingress,
    HorizontalPodAutoscaler,
    Kafka,
    KafkaUser,
    Elasticsearch,
    ConsoleLink,
    ServiceMonitor,
);

impl Reconciled for Service {
    fn merge_from(&mut self, desired: &Self) {
        let assigned = self
            .spec
            .as_ref()
            .map(|s| (s.cluster_ip.clone(), s.cluster_ips.clone()));

        self.spec = desired.spec.clone();

        if let (Some(spec), Some((cluster_ip, cluster_ips))) = (self.spec.as_mut(), assigned) {
            if spec.cluster_ip.is_none() {
                spec.cluster_ip = cluster_ip;
            }
            if spec.cluster_ips.is_none() {
                spec.cluster_ips = cluster_ips;
            }
        }
    }
}

impl Reconciled for Route {
    fn merge_from(&mut self, desired: &Self) {
        let host = self.spec.host.take();
        self.spec = desired.spec.clone();
        if self.spec.host.is_none() {
            self.spec.host = host;
        }
    }
}

impl Reconciled for ConfigMap {
    fn merge_from(&mut self, desired: &Self) {
        self.data = desired.data.clone();
        self.binary_data = desired.binary_data.clone();
    }
}

impl Reconciled for Secret {
    fn merge_from(&mut self, desired: &Self) {
        self.data = desired.data.clone();
        self.string_data = desired.string_data.clone();
        self.type_ = desired.type_.clone();
    }
}

impl Reconciled for ServiceAccount {
    // token secrets are maintained by the control plane
    fn merge_from(&mut self, desired: &Self) {
        self.image_pull_secrets = desired.image_pull_secrets.clone();
    }
}

impl Reconciled for Role {
    fn merge_from(&mut self, desired: &Self) {
        self.rules = desired.rules.clone();
    }
}

impl Reconciled for RoleBinding {
    fn merge_from(&mut self, desired: &Self) {
        self.role_ref = desired.role_ref.clone();
        self.subjects = desired.subjects.clone();
    }
}

impl Reconciled for ClusterRoleBinding {
    fn merge_from(&mut self, desired: &Self) {
        self.role_ref = desired.role_ref.clone();
        self.subjects = desired.subjects.clone();
    }
}
