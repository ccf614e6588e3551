//! Operator configuration
//!
//! Built once at startup from flags and environment variables, then passed
//! explicitly to the strategy builders and the reconciler.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Platform override for capability detection
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PlatformOverride {
    /// Detect the platform from the served API groups
    Auto,
    Kubernetes,
    Openshift,
}

/// Immutable operator configuration
#[derive(Clone, Debug, Parser)]
#[command(name = "jaeger-operator", version, about = "Kubernetes operator for Jaeger")]
pub struct OperatorConfig {
    /// Value of the `app.kubernetes.io/managed-by` label on every managed object
    #[arg(long, env = "JAEGER_OPERATOR_IDENTITY", default_value = "jaeger-operator")]
    pub identity: String,

    /// Jaeger version reported in the CR status
    #[arg(long, env = "JAEGER_VERSION", default_value = "1.62.0")]
    pub jaeger_version: String,

    #[arg(long, env = "JAEGER_ALL_IN_ONE_IMAGE", default_value = "jaegertracing/all-in-one")]
    pub all_in_one_image: String,

    #[arg(long, env = "JAEGER_COLLECTOR_IMAGE", default_value = "jaegertracing/jaeger-collector")]
    pub collector_image: String,

    #[arg(long, env = "JAEGER_QUERY_IMAGE", default_value = "jaegertracing/jaeger-query")]
    pub query_image: String,

    #[arg(long, env = "JAEGER_INGESTER_IMAGE", default_value = "jaegertracing/jaeger-ingester")]
    pub ingester_image: String,

    #[arg(long, env = "JAEGER_AGENT_IMAGE", default_value = "jaegertracing/jaeger-agent")]
    pub agent_image: String,

    #[arg(
        long,
        env = "JAEGER_OAUTH_PROXY_IMAGE",
        default_value = "quay.io/openshift/origin-oauth-proxy:4.14"
    )]
    pub oauth_proxy_image: String,

    #[arg(
        long,
        env = "JAEGER_SPARK_DEPENDENCIES_IMAGE",
        default_value = "ghcr.io/jaegertracing/spark-dependencies/spark-dependencies"
    )]
    pub spark_dependencies_image: String,

    #[arg(
        long,
        env = "JAEGER_ES_INDEX_CLEANER_IMAGE",
        default_value = "jaegertracing/jaeger-es-index-cleaner"
    )]
    pub es_index_cleaner_image: String,

    #[arg(long, env = "JAEGER_ES_ROLLOVER_IMAGE", default_value = "jaegertracing/jaeger-es-rollover")]
    pub es_rollover_image: String,

    #[arg(
        long,
        env = "JAEGER_CASSANDRA_SCHEMA_IMAGE",
        default_value = "jaegertracing/jaeger-cassandra-schema"
    )]
    pub cassandra_schema_image: String,

    /// Force the platform instead of detecting it
    #[arg(long, env = "JAEGER_PLATFORM", value_enum, default_value_t = PlatformOverride::Auto)]
    pub platform: PlatformOverride,

    /// Produce ServiceMonitor objects for the Prometheus operator
    #[arg(long, env = "JAEGER_SERVICE_MONITORS", default_value_t = false)]
    pub service_monitors: bool,

    /// Metrics and health port
    #[arg(long, env = "JAEGER_OPERATOR_METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,

    /// Seconds between capability detection runs
    #[arg(long, env = "JAEGER_CAPABILITY_REFRESH_SECONDS", default_value_t = 300)]
    pub capability_refresh_seconds: u64,
}

impl OperatorConfig {
    /// Image for a component, tagged with the configured Jaeger version
    pub fn versioned(&self, image: &str) -> String {
        if image.rsplit('/').next().is_some_and(|last| last.contains(':')) {
            image.to_string()
        } else {
            format!("{}:{}", image, self.jaeger_version)
        }
    }

    pub fn capability_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.capability_refresh_seconds.max(1))
    }
}

impl Default for OperatorConfig {
    /// Configuration with every flag at its default, ignoring the process arguments
    fn default() -> Self {
        Self::parse_from(["jaeger-operator"])
    }
}
