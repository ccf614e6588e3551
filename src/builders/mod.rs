//! Object builders used by the strategies
//!
//! Builders are pure: they read the (normalized) Jaeger spec, the operator
//! configuration and the capability snapshot, and return objects. The only
//! builders that mutate the spec are the self-provisioning injectors, whose
//! changes are persisted with the CR.

pub mod account;
pub mod agent;
pub mod autoscale;
pub mod config_maps;
pub mod deployment;
pub mod elasticsearch;
pub mod ingress;
pub mod jobs;
pub mod kafka;
pub mod monitor;
pub mod oauth_proxy;
pub mod service;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::capabilities::CapabilitySnapshot;
use crate::config::OperatorConfig;
use crate::crd::{Jaeger, JaegerSpec};
use crate::labels;

pub const COMPONENT_ALL_IN_ONE: &str = "all-in-one";
pub const COMPONENT_COLLECTOR: &str = "collector";
pub const COMPONENT_QUERY: &str = "query";
pub const COMPONENT_INGESTER: &str = "ingester";
pub const COMPONENT_AGENT: &str = "agent";

/// Everything a builder may consult besides the CR itself
#[derive(Clone, Copy, Debug)]
pub struct BuildContext<'a> {
    pub config: &'a OperatorConfig,
    pub caps: CapabilitySnapshot,
}

impl<'a> BuildContext<'a> {
    pub fn new(config: &'a OperatorConfig, caps: CapabilitySnapshot) -> Self {
        Self { config, caps }
    }

    /// Metadata for a namespaced object owned by `jaeger`
    pub fn meta(&self, jaeger: &Jaeger, name: &str, component: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: jaeger.namespace(),
            labels: Some(labels::component_labels(
                jaeger,
                &self.config.identity,
                name,
                component,
            )),
            owner_references: jaeger.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        }
    }

    /// Metadata for a cluster-scoped object; these cannot carry owner references
    pub fn cluster_meta(&self, jaeger: &Jaeger, name: &str, component: &str) -> ObjectMeta {
        let mut labels = labels::component_labels(jaeger, &self.config.identity, name, component);
        labels.insert(
            labels::INSTANCE_NAMESPACE.to_string(),
            jaeger.namespace().unwrap_or_default(),
        );
        ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        }
    }
}

/// Name of a derived object, e.g. `demo-collector`
pub fn child_name(jaeger: &Jaeger, suffix: &str) -> String {
    format!("{}-{}", jaeger.name_any(), suffix)
}

/// Service account the Jaeger pods run as
pub fn service_account_name(jaeger: &Jaeger) -> String {
    jaeger
        .spec
        .service_account
        .clone()
        .unwrap_or_else(|| jaeger.name_any())
}

/// Add a volume unless one with the same name is already present
pub fn ensure_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    if !volumes.iter().any(|v| v.name == volume.name) {
        volumes.push(volume);
    }
}

/// Add a mount unless one with the same name is already present
pub fn ensure_volume_mount(mounts: &mut Vec<VolumeMount>, mount: VolumeMount) {
    if !mounts.iter().any(|m| m.name == mount.name) {
        mounts.push(mount);
    }
}

/// Drop the volume `name` backed by `secret_name`, together with its mount
pub fn remove_secret_volume(spec: &mut JaegerSpec, name: &str, secret_name: &str) {
    let before = spec.volumes.len();
    spec.volumes.retain(|v| {
        let secret = v.secret.as_ref().and_then(|s| s.secret_name.as_deref());
        !(v.name == name && secret == Some(secret_name))
    });
    if spec.volumes.len() != before {
        spec.volume_mounts.retain(|m| m.name != name);
    }
}

/// Secret-backed volume
pub fn secret_volume(name: &str, secret_name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(k8s_openapi::api::core::v1::SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Read-only mount
pub fn read_only_mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

/// Pod annotations common to every Jaeger workload
pub fn pod_annotations(jaeger: &Jaeger, admin_port: i32) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([
        ("prometheus.io/scrape".to_string(), "true".to_string()),
        ("prometheus.io/port".to_string(), admin_port.to_string()),
        ("sidecar.istio.io/inject".to_string(), "false".to_string()),
        ("linkerd.io/inject".to_string(), "disabled".to_string()),
    ]);
    annotations.extend(jaeger.spec.annotations.clone());
    annotations
}
