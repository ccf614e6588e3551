//! Cluster capability detection
//!
//! The reconciler never caches capabilities: it takes a fresh
//! [`CapabilitySnapshot`] per reconcile. [`Capabilities`] holds the latest
//! snapshot behind a read/write lock and a background task refreshes it, since
//! RBAC grants or installed operators can change after startup.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::{api::PostParams, discovery::Discovery, Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{OperatorConfig, PlatformOverride};
use crate::error::Result;

/// Platform the operator runs on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Platform {
    #[default]
    Kubernetes,
    OpenShift,
}

/// Point-in-time view of the cluster's capabilities
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySnapshot {
    pub platform: Platform,
    /// Whether the operator can bind `system:auth-delegator`
    pub auth_delegator_available: bool,
    /// Whether the OpenShift Elasticsearch operator is installed
    pub es_provisioning_enabled: bool,
    /// Whether the Strimzi operator is installed
    pub kafka_provisioning_enabled: bool,
}

impl CapabilitySnapshot {
    pub fn is_openshift(&self) -> bool {
        self.platform == Platform::OpenShift
    }
}

/// Process-wide capability store
#[derive(Debug, Default)]
pub struct Capabilities {
    current: RwLock<CapabilitySnapshot>,
}

impl Capabilities {
    pub fn new(initial: CapabilitySnapshot) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// Copy of the latest snapshot
    pub fn snapshot(&self) -> CapabilitySnapshot {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn replace(&self, snapshot: CapabilitySnapshot) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard != snapshot {
            info!(?snapshot, "Cluster capabilities changed");
        }
        *guard = snapshot;
    }

    /// Refresh the snapshot until `shutdown` is cancelled
    pub async fn run_refresh(
        self: Arc<Self>,
        client: Client,
        config: Arc<OperatorConfig>,
        shutdown: CancellationToken,
    ) {
        let interval = config.capability_refresh_interval();
        loop {
            match detect(&client, &config).await {
                Ok(snapshot) => self.replace(snapshot),
                Err(e) => warn!(error = %e, "Capability detection failed, keeping previous snapshot"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Capability refresh stopped");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

/// Probe the API server for the capabilities the strategies depend on
pub async fn detect(client: &Client, config: &OperatorConfig) -> Result<CapabilitySnapshot> {
    let discovery = Discovery::new(client.clone()).run().await?;

    let served_kind = |group: &str, kind: &str| {
        discovery
            .get(group)
            .map(|g| g.recommended_resources().iter().any(|(ar, _)| ar.kind == kind))
            .unwrap_or(false)
    };

    let platform = match config.platform {
        PlatformOverride::Kubernetes => Platform::Kubernetes,
        PlatformOverride::Openshift => Platform::OpenShift,
        PlatformOverride::Auto if discovery.has_group("route.openshift.io") => Platform::OpenShift,
        PlatformOverride::Auto => Platform::Kubernetes,
    };

    let snapshot = CapabilitySnapshot {
        platform,
        auth_delegator_available: can_delegate_auth(client).await?,
        es_provisioning_enabled: served_kind("logging.openshift.io", "Elasticsearch"),
        kafka_provisioning_enabled: served_kind("kafka.strimzi.io", "Kafka"),
    };
    debug!(?snapshot, "Detected cluster capabilities");
    Ok(snapshot)
}

/// Binding `system:auth-delegator` requires holding its permissions ourselves
async fn can_delegate_auth(client: &Client) -> Result<bool> {
    let api: Api<SelfSubjectAccessReview> = Api::all(client.clone());
    let review = SelfSubjectAccessReview {
        spec: SelfSubjectAccessReviewSpec {
            resource_attributes: Some(ResourceAttributes {
                group: Some("authentication.k8s.io".to_string()),
                resource: Some("tokenreviews".to_string()),
                verb: Some("create".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    };

    let response = api.create(&PostParams::default(), &review).await?;
    Ok(response.status.map(|s| s.allowed).unwrap_or(false))
}

/// Wait briefly for the first detection so the first reconciles see real values
pub async fn initial(client: &Client, config: &OperatorConfig) -> CapabilitySnapshot {
    match tokio::time::timeout(Duration::from_secs(30), detect(client, config)).await {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(e)) => {
            warn!(error = %e, "Initial capability detection failed, assuming plain Kubernetes");
            CapabilitySnapshot::default()
        }
        Err(_) => {
            warn!("Initial capability detection timed out, assuming plain Kubernetes");
            CapabilitySnapshot::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_is_visible_to_later_snapshots() {
        let caps = Capabilities::default();
        assert_eq!(caps.snapshot().platform, Platform::Kubernetes);

        caps.replace(CapabilitySnapshot {
            platform: Platform::OpenShift,
            auth_delegator_available: true,
            ..Default::default()
        });

        let snapshot = caps.snapshot();
        assert!(snapshot.is_openshift());
        assert!(snapshot.auth_delegator_available);
        assert!(!snapshot.kafka_provisioning_enabled);
    }
}
