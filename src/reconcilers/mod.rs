//! Reconcilers for the Jaeger CRD
//!
//! This module contains the business logic behind the controller:
//! - converging the managed objects of an instance ([`jaeger`])
//! - waiting for jobs, deployments and provisioned backends ([`waiters`])
//! - reporting the outcome in the CR status ([`status`])

pub mod jaeger;
pub mod status;
pub mod waiters;

pub use jaeger::{Orchestrator, Outcome};
