//! Jaeger Custom Resource Definition

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Condition;

/// Jaeger resource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "jaegertracing.io",
    version = "v1",
    kind = "Jaeger",
    plural = "jaegers",
    singular = "jaeger",
    namespaced,
    status = "JaegerStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Status", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Version", "type": "string", "jsonPath": ".status.version"}"#,
    printcolumn = r#"{"name": "Strategy", "type": "string", "jsonPath": ".spec.strategy"}"#,
    printcolumn = r#"{"name": "Storage", "type": "string", "jsonPath": ".spec.storage.type"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JaegerSpec {
    /// Deployment strategy (allInOne, production, streaming)
    #[serde(default)]
    pub strategy: String,

    /// All-in-one deployment settings
    #[serde(default)]
    pub all_in_one: AllInOneSpec,

    /// Query (UI) deployment settings
    #[serde(default)]
    pub query: QuerySpec,

    /// Collector deployment settings
    #[serde(default)]
    pub collector: CollectorSpec,

    /// Ingester deployment settings (streaming only)
    #[serde(default)]
    pub ingester: IngesterSpec,

    /// Agent settings
    #[serde(default)]
    pub agent: AgentSpec,

    /// UI configuration
    #[serde(default)]
    pub ui: UiSpec,

    /// Sampling configuration
    #[serde(default)]
    pub sampling: SamplingSpec,

    /// Span storage configuration
    #[serde(default)]
    pub storage: StorageSpec,

    /// Ingress/Route configuration for the query service
    #[serde(default)]
    pub ingress: IngressSpec,

    /// Volumes added to every Jaeger pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    /// Volume mounts added to every Jaeger container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,

    /// Annotations added to every managed pod template
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Labels added to every managed object
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Service account used by the Jaeger pods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

/// Flat command-line options keyed by flag name, e.g. `es.server-urls`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Options(pub BTreeMap<String, String>);

impl Options {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Remove `key` if it still holds `value`; returns whether it was removed
    pub fn remove_matching(&mut self, key: &str, value: &str) -> bool {
        if self.get(key) == Some(value) {
            self.0.remove(key);
            true
        } else {
            false
        }
    }

    /// Whether any option starts with the given prefix
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.keys().any(|k| k.starts_with(prefix))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as `--key=value` arguments, sorted by key
    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("--{}={}", k, v)).collect()
    }

    /// Options whose key starts with `prefix`
    pub fn filter_prefix(&self, prefix: &str) -> Options {
        Options(
            self.0
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Options(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// All-in-one deployment specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllInOneSpec {
    /// Container image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Command-line options
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,
}

/// Query deployment specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Service type for the query service (ClusterIP, NodePort, LoadBalancer)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

/// Collector deployment specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectorSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(flatten)]
    pub autoscale: AutoscaleSpec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

/// Ingester deployment specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngesterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(flatten)]
    pub autoscale: AutoscaleSpec,
}

/// Autoscaling bounds shared by the collector and ingester
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscaleSpec {
    /// Enable the horizontal pod autoscaler (defaults to true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscale: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,
}

/// Agent specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    /// Agent strategy: empty/Sidecar or DaemonSet
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub strategy: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,
}

/// UI specification, rendered verbatim into the UI configuration map
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UiSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Sampling specification, rendered into the sampling configuration map
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SamplingSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Storage specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage type (memory, cassandra, elasticsearch, kafka, badger, grpc-plugin)
    #[serde(rename = "type", default)]
    pub storage_type: String,

    /// Secret holding storage credentials, exposed to pods as environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub options: Options,

    /// Spark dependency-linker cron job
    #[serde(default)]
    pub dependencies: DependenciesSpec,

    /// Elasticsearch index cleaner cron job
    #[serde(default)]
    pub es_index_cleaner: EsIndexCleanerSpec,

    /// Elasticsearch rollover jobs
    #[serde(default)]
    pub es_rollover: EsRolloverSpec,

    /// Cassandra schema creation job
    #[serde(default)]
    pub cassandra_create_schema: CassandraCreateSchemaSpec,

    /// Self-provisioned Elasticsearch cluster
    #[serde(default)]
    pub elasticsearch: ElasticsearchSpec,
}

/// Spark dependencies job specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DependenciesSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_opts: Option<String>,
}

/// Elasticsearch index cleaner job specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EsIndexCleanerSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_days: Option<i32>,
}

/// Elasticsearch rollover job specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EsRolloverSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    /// Rollover conditions, e.g. `{"max_age": "2d"}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,

    /// How long to keep old read aliases, e.g. `48h`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_ttl: Option<String>,
}

/// Cassandra schema creation job specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CassandraCreateSchemaSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,

    /// Replication mode (prod or test)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Job deadline in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}

/// Self-provisioned Elasticsearch specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElasticsearchSpec {
    /// Name of the Elasticsearch object (defaults to `elasticsearch`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<i32>,

    /// FullRedundancy, MultipleRedundancy, SingleRedundancy or ZeroRedundancy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redundancy_policy: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
}

/// Ingress specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Expose the query service (defaults to true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Security mode: empty, `none` or `oauth-proxy`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub security: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls: Vec<IngressTlsSpec>,

    #[serde(default)]
    pub openshift: IngressOpenShiftSpec,
}

/// Ingress TLS entry
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressTlsSpec {
    #[serde(default)]
    pub hosts: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// OpenShift OAuth proxy settings
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressOpenShiftSpec {
    /// Subject access review the OAuth proxy performs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sar: Option<String>,

    /// Delegate URLs; requires the auth-delegator binding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate_urls: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub htpasswd_file: Option<String>,
}

/// Jaeger status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JaegerStatus {
    /// Current phase (Running, Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Jaeger version being run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_render_sorted_args() {
        let options: Options = [("es.server-urls", "http://es:9200"), ("es.num-shards", "1")]
            .into_iter()
            .collect();
        assert_eq!(
            options.to_args(),
            vec!["--es.num-shards=1", "--es.server-urls=http://es:9200"]
        );
    }

    #[test]
    fn remove_matching_keeps_changed_values() {
        let mut options: Options = [("es.timeout", "15s"), ("es.tls.ca", "/mine/ca")]
            .into_iter()
            .collect();
        assert!(options.remove_matching("es.timeout", "15s"));
        assert!(!options.remove_matching("es.tls.ca", "/certs/ca"));
        assert!(!options.remove_matching("es.num-shards", "0"));
        assert_eq!(options.get("es.tls.ca"), Some("/mine/ca"));
        assert!(!options.contains("es.timeout"));
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: JaegerSpec = serde_json::from_value(serde_json::json!({
            "strategy": "production",
            "storage": {
                "type": "elasticsearch",
                "options": { "es.server-urls": "http://es:9200" }
            },
            "collector": { "maxReplicas": 5 }
        }))
        .unwrap();

        assert_eq!(spec.strategy, "production");
        assert_eq!(spec.storage.storage_type, "elasticsearch");
        assert_eq!(spec.storage.options.get("es.server-urls"), Some("http://es:9200"));
        assert_eq!(spec.collector.autoscale.max_replicas, Some(5));
        assert!(spec.storage.dependencies.enabled.is_none());
    }
}
