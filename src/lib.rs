//! Jaeger Kubernetes Operator
//!
//! Turns Jaeger custom resources into the Deployments, Services, Jobs and
//! platform objects that run a Jaeger tracing backend, and keeps them
//! converged with the resource's spec.

pub mod builders;
pub mod capabilities;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod inventory;
pub mod labels;
pub mod metrics;
pub mod poll;
pub mod reconcilers;
pub mod store;
pub mod strategy;

pub use error::{Error, Result};
