//! Jaeger status reporting

use chrono::Utc;
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::crd::{Jaeger, JaegerStatus};
use crate::error::Result;

pub const PHASE_RUNNING: &str = "Running";
pub const PHASE_FAILED: &str = "Failed";

const FIELD_MANAGER: &str = "jaeger-operator";

/// Status a reconcile outcome should leave on the CR
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub phase: &'static str,
    pub version: Option<String>,
    pub message: String,
    pub reason: &'static str,
}

impl StatusReport {
    pub fn running(version: &str, strategy: &str) -> Self {
        Self {
            phase: PHASE_RUNNING,
            version: Some(version.to_string()),
            message: format!("Jaeger is running with the {} strategy", strategy),
            reason: "Reconciled",
        }
    }

    pub fn failed(message: &str, reason: &'static str) -> Self {
        Self {
            phase: PHASE_FAILED,
            version: None,
            message: message.to_string(),
            reason,
        }
    }

    /// Whether `current` already reports this outcome for `generation`
    pub fn is_reported(&self, current: Option<&JaegerStatus>, generation: Option<i64>) -> bool {
        current.is_some_and(|status| {
            status.phase.as_deref() == Some(self.phase)
                && status.message.as_deref() == Some(self.message.as_str())
                && (self.version.is_none() || status.version == self.version)
                && status.observed_generation == generation
        })
    }

    /// JSON merge patch for the status subresource
    pub fn patch(&self, generation: Option<i64>) -> Value {
        let ready = self.phase == PHASE_RUNNING;
        let mut status = json!({
            "phase": self.phase,
            "message": self.message,
            "observedGeneration": generation,
            "conditions": [{
                "type": "Ready",
                "status": if ready { "True" } else { "False" },
                "lastTransitionTime": Utc::now(),
                "reason": self.reason,
                "message": self.message
            }]
        });
        if let Some(version) = &self.version {
            status["version"] = json!(version);
        }
        json!({ "status": status })
    }
}

/// Write `report` to the status subresource unless it is already there
pub async fn update_status(jaeger: &Jaeger, client: &Client, report: &StatusReport) -> Result<()> {
    let generation = jaeger.metadata.generation;
    if report.is_reported(jaeger.status.as_ref(), generation) {
        debug!(phase = report.phase, "Status unchanged");
        return Ok(());
    }

    let namespace = jaeger.namespace().unwrap_or_default();
    let api: Api<Jaeger> = Api::namespaced(client.clone(), &namespace);
    api.patch_status(
        &jaeger.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(report.patch(generation)),
    )
    .await?;

    Ok(())
}
