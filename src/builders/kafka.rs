//! Self-provisioned Kafka through the Strimzi operator

use std::collections::BTreeMap;

use kube::ResourceExt;
use serde_json::json;

use super::{
    ensure_volume, ensure_volume_mount, read_only_mount, remove_secret_volume, secret_volume,
    BuildContext,
};
use crate::capabilities::CapabilitySnapshot;
use crate::crd::{Jaeger, Kafka, KafkaSpec, KafkaUser, KafkaUserSpec};

/// Annotation on the CR naming the Kafka cluster the operator provisioned
pub const PROVISIONED_ANNOTATION: &str = "jaegertracing.io/provisioned-kafka";

const STRIMZI_CLUSTER_LABEL: &str = "strimzi.io/cluster";
const DEFAULT_TOPIC: &str = "jaeger-spans";
const USER_DIR: &str = "/var/run/secrets/kafkauser";
const CLUSTER_CA_DIR: &str = "/var/run/secrets/cluster-ca";

/// Bootstrap address of the provisioned cluster's TLS listener
pub fn broker(jaeger: &Jaeger) -> String {
    broker_for(&jaeger.name_any(), &jaeger.namespace().unwrap_or_default())
}

fn broker_for(name: &str, namespace: &str) -> String {
    format!("{}-kafka-bootstrap.{}.svc.cluster.local:9093", name, namespace)
}

/// Whether the operator provisions (or keeps provisioning) Kafka for a streaming instance
pub fn should_provision(jaeger: &Jaeger, caps: &CapabilitySnapshot) -> bool {
    if !caps.kafka_provisioning_enabled {
        return false;
    }
    let options = &jaeger.spec.storage.options;
    let producer = options.get("kafka.producer.brokers");
    let consumer = options.get("kafka.consumer.brokers");
    if producer.is_none() && consumer.is_none() {
        return true;
    }
    let ours = broker(jaeger);
    jaeger.annotations().contains_key(PROVISIONED_ANNOTATION)
        && producer.map_or(true, |b| b == ours)
        && consumer.map_or(true, |b| b == ours)
}

/// Forget an earlier provisioning and drop what [`inject`] added
///
/// Options the user changed since the injection are kept.
pub fn release(jaeger: &mut Jaeger) {
    let Some(name) = jaeger.annotations().get(PROVISIONED_ANNOTATION).cloned() else {
        return;
    };
    jaeger.annotations_mut().remove(PROVISIONED_ANNOTATION);
    let broker = broker_for(&name, &jaeger.namespace().unwrap_or_default());

    let options = &mut jaeger.spec.storage.options;
    for side in ["producer", "consumer"] {
        options.remove_matching(&format!("kafka.{}.brokers", side), &broker);
        for (key, value) in injected_options(side) {
            options.remove_matching(&key, &value);
        }
    }

    let (user_volume, ca_volume) = volume_names(&name);
    remove_secret_volume(&mut jaeger.spec, &user_volume, &name);
    remove_secret_volume(&mut jaeger.spec, &ca_volume, &cluster_ca_secret(&name));
}

/// Point producer and consumer at the provisioned cluster; repeated calls change nothing
pub fn inject(jaeger: &mut Jaeger) {
    let name = jaeger.name_any();
    let broker = broker(jaeger);
    let (user_volume, ca_volume) = volume_names(&name);

    let options = &mut jaeger.spec.storage.options;
    for side in ["producer", "consumer"] {
        options.set(format!("kafka.{}.brokers", side), broker.clone());
        for (key, value) in injected_options(side) {
            if !options.contains(&key) {
                options.set(key, value);
            }
        }
    }

    let spec = &mut jaeger.spec;
    ensure_volume(&mut spec.volumes, secret_volume(&user_volume, &name));
    ensure_volume(
        &mut spec.volumes,
        secret_volume(&ca_volume, &cluster_ca_secret(&name)),
    );
    ensure_volume_mount(&mut spec.volume_mounts, read_only_mount(&user_volume, USER_DIR));
    ensure_volume_mount(&mut spec.volume_mounts, read_only_mount(&ca_volume, CLUSTER_CA_DIR));

    jaeger
        .annotations_mut()
        .insert(PROVISIONED_ANNOTATION.to_string(), name);
}

fn injected_options(side: &str) -> Vec<(String, String)> {
    [
        ("topic", DEFAULT_TOPIC.to_string()),
        ("authentication", "tls".to_string()),
        ("tls.ca", format!("{}/ca.crt", CLUSTER_CA_DIR)),
        ("tls.cert", format!("{}/user.crt", USER_DIR)),
        ("tls.key", format!("{}/user.key", USER_DIR)),
    ]
    .into_iter()
    .map(|(key, value)| (format!("kafka.{}.{}", side, key), value))
    .collect()
}

/// Names of the client certificate and cluster CA volumes
fn volume_names(name: &str) -> (String, String) {
    (
        format!("kafkauser-{}", name),
        format!("kafkauser-{}-cluster-ca", name),
    )
}

fn cluster_ca_secret(name: &str) -> String {
    format!("{}-cluster-ca-cert", name)
}

/// Kafka cluster request with a TLS listener and simple authorization
pub fn cluster(jaeger: &Jaeger, ctx: &BuildContext) -> Kafka {
    let name = jaeger.name_any();
    let mut kafka = Kafka::new(
        &name,
        KafkaSpec {
            kafka: json!({
                "replicas": 3,
                "listeners": [{
                    "name": "tls",
                    "port": 9093,
                    "type": "internal",
                    "tls": true,
                    "authentication": { "type": "tls" }
                }],
                "authorization": { "type": "simple" },
                "config": {
                    "offsets.topic.replication.factor": 3,
                    "transaction.state.log.replication.factor": 3,
                    "transaction.state.log.min.isr": 2
                },
                "storage": { "type": "ephemeral" }
            }),
            zookeeper: Some(json!({
                "replicas": 3,
                "storage": { "type": "ephemeral" }
            })),
            entity_operator: Some(json!({
                "topicOperator": {},
                "userOperator": {}
            })),
        },
    );
    kafka.metadata = ctx.meta(jaeger, &name, "kafka");
    kafka
}

/// User the collector and ingester authenticate as; its secret carries the client certificate
pub fn user(jaeger: &Jaeger, ctx: &BuildContext) -> KafkaUser {
    let name = jaeger.name_any();
    let topic = jaeger
        .spec
        .storage
        .options
        .get("kafka.producer.topic")
        .unwrap_or(DEFAULT_TOPIC)
        .to_string();

    let mut user = KafkaUser::new(
        &name,
        KafkaUserSpec {
            authentication: Some(json!({ "type": "tls" })),
            authorization: Some(json!({
                "type": "simple",
                "acls": [
                    {
                        "resource": { "type": "topic", "name": topic },
                        "operation": "All"
                    },
                    {
                        "resource": { "type": "group", "name": "*", "patternType": "literal" },
                        "operation": "All"
                    }
                ]
            })),
        },
    );
    user.metadata = ctx.meta(jaeger, &name, "kafka-user");
    user.labels_mut()
        .extend(BTreeMap::from([(STRIMZI_CLUSTER_LABEL.to_string(), name)]));
    user
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;

    fn jaeger() -> Jaeger {
        let mut jaeger = Jaeger::new("demo", Default::default());
        jaeger.metadata.namespace = Some("obs".to_string());
        jaeger.spec.strategy = "streaming".to_string();
        jaeger
    }

    fn caps() -> CapabilitySnapshot {
        CapabilitySnapshot {
            kafka_provisioning_enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn injection_is_idempotent_and_keeps_provisioning() {
        let mut jaeger = jaeger();
        assert!(should_provision(&jaeger, &caps()));

        inject(&mut jaeger);
        let once = jaeger.clone();
        inject(&mut jaeger);
        assert_eq!(once, jaeger);

        assert!(should_provision(&jaeger, &caps()));
        assert_eq!(
            jaeger.spec.storage.options.get("kafka.consumer.brokers"),
            Some("demo-kafka-bootstrap.obs.svc.cluster.local:9093")
        );
        let secrets: Vec<String> = jaeger
            .spec
            .volumes
            .iter()
            .filter_map(|v| v.secret.as_ref()?.secret_name.clone())
            .collect();
        assert_eq!(secrets, vec!["demo", "demo-cluster-ca-cert"]);
    }

    #[test]
    fn external_brokers_disable_provisioning() {
        let mut jaeger = jaeger();
        jaeger
            .spec
            .storage
            .options
            .set("kafka.producer.brokers", "my-kafka:9092");
        assert!(!should_provision(&jaeger, &caps()));
    }

    #[test]
    fn release_drops_injected_volumes_and_options() {
        let mut jaeger = jaeger();
        jaeger.spec.storage.options.set("kafka.producer.topic", "traces");
        inject(&mut jaeger);

        let options = &mut jaeger.spec.storage.options;
        options.set("kafka.producer.brokers", "my-kafka:9092");
        options.set("kafka.consumer.brokers", "my-kafka:9092");
        release(&mut jaeger);

        let options = &jaeger.spec.storage.options;
        assert_eq!(options.get("kafka.producer.brokers"), Some("my-kafka:9092"));
        assert_eq!(options.get("kafka.producer.topic"), Some("traces"));
        assert!(!options.contains("kafka.consumer.topic"));
        assert!(!options.has_prefix("kafka.producer.tls"));
        assert!(!options.contains("kafka.consumer.authentication"));
        assert!(jaeger.spec.volumes.is_empty());
        assert!(jaeger.spec.volume_mounts.is_empty());
        assert!(!jaeger.annotations().contains_key(PROVISIONED_ANNOTATION));
    }

    #[test]
    fn release_without_provisioning_changes_nothing() {
        let mut jaeger = jaeger();
        let before = jaeger.clone();
        release(&mut jaeger);
        assert_eq!(jaeger, before);
    }

    #[test]
    fn user_belongs_to_cluster() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, caps());
        let user = user(&jaeger(), &ctx);
        assert_eq!(user.labels()[STRIMZI_CLUSTER_LABEL], "demo");
        assert_eq!(user.namespace().as_deref(), Some("obs"));
    }
}
