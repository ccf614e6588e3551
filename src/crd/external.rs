//! Typed views of resources owned by other operators or platform APIs
//!
//! Only the fields the operator produces or reads are modelled; everything
//! else is carried as free-form JSON.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Condition;

/// Status exposed by externally provisioned objects
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Strimzi Kafka cluster request
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta2",
    kind = "Kafka",
    plural = "kafkas",
    namespaced,
    status = "ProvisionedStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaSpec {
    pub kafka: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zookeeper: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_operator: Option<serde_json::Value>,
}

/// Strimzi Kafka user request
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kafka.strimzi.io",
    version = "v1beta2",
    kind = "KafkaUser",
    plural = "kafkausers",
    namespaced,
    status = "ProvisionedStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct KafkaUserSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<serde_json::Value>,
}

/// OpenShift Elasticsearch cluster request
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "logging.openshift.io",
    version = "v1",
    kind = "Elasticsearch",
    plural = "elasticsearches",
    namespaced,
    status = "ProvisionedStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchClusterSpec {
    pub management_state: String,

    pub redundancy_policy: String,

    #[serde(default)]
    pub node_spec: serde_json::Value,

    #[serde(default)]
    pub nodes: Vec<serde_json::Value>,
}

/// OpenShift route
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    plural = "routes",
    namespaced,
    status = "RouteStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Host name; assigned by the router when empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    pub to: RouteTargetReference,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<RouteTls>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTls {
    pub termination: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct RouteStatus {
    #[serde(default)]
    pub ingress: Vec<serde_json::Value>,
}

/// OpenShift console link (cluster scoped)
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "console.openshift.io",
    version = "v1",
    kind = "ConsoleLink",
    plural = "consolelinks"
)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLinkSpec {
    pub href: String,
    pub text: String,
    pub location: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_dashboard: Option<NamespaceDashboard>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct NamespaceDashboard {
    pub namespaces: Vec<String>,
}

/// Prometheus operator service monitor
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "ServiceMonitor",
    plural = "servicemonitors",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMonitorSpec {
    pub selector: LabelSelector,

    #[serde(default)]
    pub endpoints: Vec<MonitorEndpoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEndpoint {
    pub port: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}
