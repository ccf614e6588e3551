//! Integration tests for the apply orchestrator
//!
//! These tests run full reconcile passes against the in-memory store, with
//! tokio's clock paused so five-minute waits finish instantly.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use jaeger_operator::capabilities::CapabilitySnapshot;
use jaeger_operator::config::OperatorConfig;
use jaeger_operator::crd::{Elasticsearch, Jaeger, JaegerSpec, Kafka, KafkaUser};
use jaeger_operator::error::Error;
use jaeger_operator::labels;
use jaeger_operator::reconcilers::Orchestrator;
use jaeger_operator::store::{MemoryStore, OperationKind};

// ============================================================================
// Test Helpers
// ============================================================================

fn jaeger(strategy: &str, storage: &str) -> Jaeger {
    let mut spec = JaegerSpec {
        strategy: strategy.to_string(),
        ..Default::default()
    };
    spec.storage.storage_type = storage.to_string();
    let mut jaeger = Jaeger::new("demo", spec);
    jaeger.metadata.namespace = Some("obs".to_string());
    jaeger
}

/// Config map labelled as owned by `demo` but no longer part of its desired state
fn stale_config_map(cr: &Jaeger, config: &OperatorConfig) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some("demo-leftover".to_string()),
            namespace: Some("obs".to_string()),
            labels: Some(labels::ownership(cr, &config.identity)),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn mounted_secrets(cr: &Jaeger) -> Vec<String> {
    cr.spec
        .volumes
        .iter()
        .filter_map(|v| v.secret.as_ref()?.secret_name.clone())
        .collect()
}

fn deletes(store: &MemoryStore) -> Vec<String> {
    store
        .operations()
        .into_iter()
        .filter(|op| op.op == OperationKind::Delete)
        .map(|op| format!("{} {}", op.kind, op.key))
        .collect()
}

// ============================================================================
// Elasticsearch Self-Provisioning
// ============================================================================

#[tokio::test(start_paused = true)]
async fn provisioned_elasticsearch_is_created_then_removed() {
    let store = MemoryStore::new().simulate_controllers();
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(&store, &config, &cancel);
    let caps = CapabilitySnapshot {
        es_provisioning_enabled: true,
        ..Default::default()
    };

    let cr = store.insert(&jaeger("production", "elasticsearch"));
    let first = orchestrator.reconcile(&cr, caps).await.unwrap();

    assert!(first.persisted);
    assert_eq!(store.all::<Elasticsearch>().len(), 1);
    let owned = labels::ownership_selector("demo", &config.identity);
    let deployments: Vec<String> = store
        .all::<Deployment>()
        .into_iter()
        .filter(|d| labels::matches_selector(d.labels(), &owned))
        .map(|d| d.name_any())
        .collect();
    assert_eq!(deployments, vec!["demo-collector", "demo-query"]);

    let stored: Jaeger = store.fetch(Some("obs"), "demo").unwrap();
    assert_eq!(
        stored.spec.storage.options.get("es.server-urls"),
        Some("https://elasticsearch.obs.svc.cluster.local:9200")
    );

    let mut repointed = first.jaeger.clone();
    repointed
        .spec
        .storage
        .options
        .set("es.server-urls", "http://external-es:9200");
    store.clear_operations();
    let second = orchestrator.reconcile(&repointed, caps).await.unwrap();

    assert!(store.all::<Elasticsearch>().is_empty());
    assert!(deletes(&store).contains(&"Elasticsearch obs.elasticsearch".to_string()));
    assert!(second.deleted >= 1);

    // nothing may keep mounting the secret that left with the cluster
    assert!(mounted_secrets(&second.jaeger).is_empty());
    assert!(second.jaeger.spec.volume_mounts.is_empty());
    let options = &second.jaeger.spec.storage.options;
    assert_eq!(options.get("es.server-urls"), Some("http://external-es:9200"));
    assert!(!options.contains("es.tls.ca"));
}

#[tokio::test(start_paused = true)]
async fn rollover_init_runs_after_provisioned_elasticsearch_is_ready() {
    let store = MemoryStore::new().simulate_controllers();
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let caps = CapabilitySnapshot {
        es_provisioning_enabled: true,
        ..Default::default()
    };
    let mut cr = jaeger("production", "elasticsearch");
    cr.spec.storage.options.set("es.use-aliases", "true");
    let cr = store.insert(&cr);

    assert_ok!(Orchestrator::new(&store, &config, &cancel).reconcile(&cr, caps).await);

    let created: Vec<String> = store
        .operations()
        .into_iter()
        .filter(|op| op.op == OperationKind::Create)
        .map(|op| op.kind)
        .collect();
    let position = |kind: &str| created.iter().position(|k| k == kind).unwrap();
    assert!(position("Secret") < position("Job"));
    assert!(position("Elasticsearch") < position("Job"));
    assert!(position("Job") < position("Deployment"));
}

// ============================================================================
// Kafka Self-Provisioning
// ============================================================================

#[tokio::test(start_paused = true)]
async fn provisioned_kafka_is_released_for_external_brokers() {
    let store = MemoryStore::new().simulate_controllers();
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(&store, &config, &cancel);
    let caps = CapabilitySnapshot {
        kafka_provisioning_enabled: true,
        ..Default::default()
    };

    let cr = store.insert(&jaeger("streaming", "badger"));
    let first = assert_ok!(orchestrator.reconcile(&cr, caps).await);
    assert_eq!(store.all::<Kafka>().len(), 1);
    assert_eq!(
        mounted_secrets(&first.jaeger),
        vec!["demo", "demo-cluster-ca-cert"]
    );

    let mut repointed = first.jaeger.clone();
    let options = &mut repointed.spec.storage.options;
    options.set("kafka.producer.brokers", "external-kafka:9092");
    options.set("kafka.consumer.brokers", "external-kafka:9092");
    let second = assert_ok!(orchestrator.reconcile(&repointed, caps).await);

    assert!(store.all::<Kafka>().is_empty());
    assert!(store.all::<KafkaUser>().is_empty());
    assert!(mounted_secrets(&second.jaeger).is_empty());
    assert!(second.jaeger.spec.volume_mounts.is_empty());
    let options = &second.jaeger.spec.storage.options;
    assert_eq!(options.get("kafka.consumer.brokers"), Some("external-kafka:9092"));
    assert!(!options.contains("kafka.consumer.tls.cert"));
}

// ============================================================================
// Dependency Jobs
// ============================================================================

#[tokio::test(start_paused = true)]
async fn finished_schema_job_from_an_earlier_pass_is_reused() {
    let store = MemoryStore::new().simulate_controllers();
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let cr = store.insert(&jaeger("production", "cassandra"));
    store.insert(&Job {
        metadata: ObjectMeta {
            name: Some("demo-cassandra-schema-job".to_string()),
            namespace: Some("obs".to_string()),
            ..Default::default()
        },
        status: Some(JobStatus {
            succeeded: Some(1),
            ..Default::default()
        }),
        ..Default::default()
    });

    assert_ok!(
        Orchestrator::new(&store, &config, &cancel)
            .reconcile(&cr, CapabilitySnapshot::default())
            .await
    );
    assert!(store
        .operations()
        .iter()
        .all(|op| op.kind != "Job"));
    assert_eq!(store.all::<Deployment>().len(), 2);
}

// ============================================================================
// Delete Ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn deletes_wait_for_deployments_to_stabilize() {
    let store = Arc::new(MemoryStore::new());
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let cr = store.insert(&jaeger("allInOne", "memory"));
    store.insert(&stale_config_map(&cr, &config));

    let observer = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let leftover_present = store
                .fetch::<ConfigMap>(Some("obs"), "demo-leftover")
                .is_some();
            store.set_status::<Deployment>(
                Some("obs"),
                "demo",
                json!({ "replicas": 1, "readyReplicas": 1 }),
            );
            leftover_present
        })
    };

    let outcome = Orchestrator::new(&*store, &config, &cancel)
        .reconcile(&cr, CapabilitySnapshot::default())
        .await
        .unwrap();

    assert!(observer.await.unwrap(), "stale object deleted before stabilization");
    assert_eq!(outcome.deleted, 1);
    assert!(store
        .fetch::<ConfigMap>(Some("obs"), "demo-leftover")
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn unstable_deployment_times_out_without_deleting() {
    let store = MemoryStore::new();
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let cr = store.insert(&jaeger("allInOne", "memory"));
    store.insert(&stale_config_map(&cr, &config));

    let err = Orchestrator::new(&store, &config, &cancel)
        .reconcile(&cr, CapabilitySnapshot::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DeadlineExceeded { ref what, .. } if what == "Deployment obs.demo"));
    assert!(deletes(&store).is_empty());
    assert!(store
        .fetch::<ConfigMap>(Some("obs"), "demo-leftover")
        .is_some());
}

// ============================================================================
// Conflicts And External Removal
// ============================================================================

#[tokio::test(start_paused = true)]
async fn already_existing_objects_are_tolerated() {
    let store = MemoryStore::new().simulate_controllers();
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let cr = store.insert(&jaeger("allInOne", "memory"));

    // same name, but without ownership labels the list never returns it
    store.insert(&ServiceAccount {
        metadata: ObjectMeta {
            name: Some("demo".to_string()),
            namespace: Some("obs".to_string()),
            ..Default::default()
        },
        ..Default::default()
    });

    let outcome = assert_ok!(
        Orchestrator::new(&store, &config, &cancel)
            .reconcile(&cr, CapabilitySnapshot::default())
            .await
    );
    assert_eq!(outcome.deleted, 0);
    assert!(store
        .operations()
        .iter()
        .all(|op| !(op.kind == "ServiceAccount" && op.op == OperationKind::Create)));
}

#[tokio::test(start_paused = true)]
async fn kafka_removed_while_waiting_fails_the_pass() {
    let store = Arc::new(MemoryStore::new());
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let caps = CapabilitySnapshot {
        kafka_provisioning_enabled: true,
        ..Default::default()
    };
    let cr = store.insert(&jaeger("streaming", "badger"));

    let remover = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            store.remove::<Kafka>(Some("obs"), "demo")
        })
    };

    let err = Orchestrator::new(&*store, &config, &cancel)
        .reconcile(&cr, caps)
        .await
        .unwrap_err();

    assert!(remover.await.unwrap());
    assert!(matches!(err, Error::ExternallyRemoved { ref kind, ref key } if kind == "Kafka" && key == "obs.demo"));
    assert!(store.all::<Deployment>().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_waits() {
    let store = MemoryStore::new();
    let config = OperatorConfig::default();
    let cancel = CancellationToken::new();
    let cr = store.insert(&jaeger("allInOne", "memory"));

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        trigger.cancel();
    });

    let err = assert_err!(
        Orchestrator::new(&store, &config, &cancel)
            .reconcile(&cr, CapabilitySnapshot::default())
            .await
    );
    assert!(matches!(err, Error::Cancelled));
}
