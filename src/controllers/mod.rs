//! Kubernetes controller for the Jaeger CRD
//!
//! Watches Jaeger resources and hands each change to the orchestrator.

mod jaeger_controller;

pub use jaeger_controller::{error_policy_delay, run as run_jaeger_controller};

use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::capabilities::Capabilities;
use crate::config::OperatorConfig;
use crate::store::KubeStore;

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub store: KubeStore,
    pub config: Arc<OperatorConfig>,
    pub capabilities: Arc<Capabilities>,
    /// Cancelled on shutdown; aborts in-flight waits
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(
        client: Client,
        config: Arc<OperatorConfig>,
        capabilities: Arc<Capabilities>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store: KubeStore::new(client.clone()),
            client,
            config,
            capabilities,
            cancel,
        }
    }
}
