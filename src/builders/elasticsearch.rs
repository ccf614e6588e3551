//! Self-provisioned Elasticsearch through the OpenShift Elasticsearch operator
//!
//! When a production or streaming instance stores spans in Elasticsearch but
//! names no cluster, the operator requests one and points the instance at
//! it by writing the connection options and certificate mounts into the CR.
//! The CR remembers the provisioned cluster in an annotation so the injected
//! `es.server-urls` is not mistaken for user configuration on the next pass.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use serde_json::json;

use super::{
    child_name, ensure_volume, ensure_volume_mount, read_only_mount, remove_secret_volume,
    secret_volume, BuildContext,
};
use crate::capabilities::CapabilitySnapshot;
use crate::crd::{Elasticsearch, ElasticsearchClusterSpec, Jaeger};

/// Annotation on the CR naming the Elasticsearch cluster the operator provisioned
pub const PROVISIONED_ANNOTATION: &str = "jaegertracing.io/provisioned-elasticsearch";

pub const DEFAULT_NAME: &str = "elasticsearch";

const CERTS_VOLUME: &str = "certs";
const CERTS_DIR: &str = "/certs";
const DEFAULT_NODE_COUNT: i32 = 3;

pub fn cluster_name(jaeger: &Jaeger) -> String {
    jaeger
        .spec
        .storage
        .elasticsearch
        .name
        .clone()
        .unwrap_or_else(|| DEFAULT_NAME.to_string())
}

/// Connection URL of a provisioned cluster
pub fn server_url(jaeger: &Jaeger) -> String {
    url_for(&cluster_name(jaeger), &jaeger.namespace().unwrap_or_default())
}

fn url_for(es_name: &str, namespace: &str) -> String {
    format!("https://{}.{}.svc.cluster.local:9200", es_name, namespace)
}

pub fn secret_name(jaeger: &Jaeger) -> String {
    child_name(jaeger, "jaeger-elasticsearch")
}

/// Whether the operator provisions (or keeps provisioning) the cluster
///
/// Provisioning needs the capability, Elasticsearch storage and either no
/// `es.server-urls` or the one injected on an earlier pass.
pub fn should_provision(jaeger: &Jaeger, caps: &CapabilitySnapshot) -> bool {
    if !caps.es_provisioning_enabled || jaeger.spec.storage.storage_type != "elasticsearch" {
        return false;
    }
    match jaeger.spec.storage.options.get("es.server-urls") {
        None => true,
        Some(url) => jaeger.annotations().contains_key(PROVISIONED_ANNOTATION) && url == server_url(jaeger),
    }
}

/// Forget an earlier provisioning once the user pointed the instance elsewhere
///
/// Undoes [`inject`]: the certificate mount goes away with the cluster's
/// secret, and injected options are dropped unless the user changed them.
pub fn release(jaeger: &mut Jaeger) {
    let Some(es_name) = jaeger.annotations().get(PROVISIONED_ANNOTATION).cloned() else {
        return;
    };
    jaeger.annotations_mut().remove(PROVISIONED_ANNOTATION);
    let url = url_for(&es_name, &jaeger.namespace().unwrap_or_default());
    let injected = injected_options(jaeger);

    let options = &mut jaeger.spec.storage.options;
    options.remove_matching("es.server-urls", &url);
    for (key, value) in injected {
        options.remove_matching(key, &value);
    }
    remove_secret_volume(&mut jaeger.spec, CERTS_VOLUME, &es_name);
}

/// Point the instance at the provisioned cluster; repeated calls change nothing
pub fn inject(jaeger: &mut Jaeger) {
    let url = server_url(jaeger);
    let es_name = cluster_name(jaeger);
    let injected = injected_options(jaeger);

    let options = &mut jaeger.spec.storage.options;
    options.set("es.server-urls", url);
    for (key, value) in injected {
        if !options.contains(key) {
            options.set(key, value);
        }
    }

    ensure_volume(&mut jaeger.spec.volumes, secret_volume(CERTS_VOLUME, &es_name));
    ensure_volume_mount(
        &mut jaeger.spec.volume_mounts,
        read_only_mount(CERTS_VOLUME, CERTS_DIR),
    );
    jaeger
        .annotations_mut()
        .insert(PROVISIONED_ANNOTATION.to_string(), es_name);
}

/// Options written by [`inject`] unless the user set them
fn injected_options(jaeger: &Jaeger) -> [(&'static str, String); 7] {
    [
        ("es.tls.enabled", "true".to_string()),
        ("es.tls.ca", format!("{}/ca", CERTS_DIR)),
        ("es.tls.cert", format!("{}/cert", CERTS_DIR)),
        ("es.tls.key", format!("{}/key", CERTS_DIR)),
        ("es.timeout", "15s".to_string()),
        ("es.num-shards", "0".to_string()),
        ("es.num-replicas", replicas_for(jaeger).to_string()),
    ]
}

/// Elasticsearch cluster request
pub fn cluster(jaeger: &Jaeger, ctx: &BuildContext) -> Elasticsearch {
    let spec = &jaeger.spec.storage.elasticsearch;
    let name = cluster_name(jaeger);
    let node_count = node_count(jaeger);

    let mut storage = serde_json::Map::new();
    if let Some(class) = &spec.storage_class_name {
        storage.insert("storageClassName".to_string(), json!(class));
    }
    if let Some(size) = &spec.storage_size {
        storage.insert("size".to_string(), json!(size));
    }

    let mut es = Elasticsearch::new(
        &name,
        ElasticsearchClusterSpec {
            management_state: "Managed".to_string(),
            redundancy_policy: redundancy_policy(jaeger),
            node_spec: json!({ "resources": {} }),
            nodes: vec![json!({
                "nodeCount": node_count,
                "roles": ["client", "data", "master"],
                "storage": storage,
            })],
        },
    );
    es.metadata = ctx.meta(jaeger, &name, "elasticsearch");
    es
}

/// Connection properties for the auxiliary jobs of a provisioned cluster
pub fn connection_secret(jaeger: &Jaeger, ctx: &BuildContext) -> Secret {
    let options = &jaeger.spec.storage.options;
    let mut data = BTreeMap::new();
    for (key, option) in [
        ("ES_SERVER_URLS", "es.server-urls"),
        ("ES_TLS_CA", "es.tls.ca"),
        ("ES_TLS_CERT", "es.tls.cert"),
        ("ES_TLS_KEY", "es.tls.key"),
    ] {
        if let Some(value) = options.get(option) {
            data.insert(key.to_string(), ByteString(value.as_bytes().to_vec()));
        }
    }
    data.insert("ES_TLS".to_string(), ByteString(b"true".to_vec()));

    Secret {
        metadata: ctx.meta(jaeger, &secret_name(jaeger), "elasticsearch-secret"),
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

fn node_count(jaeger: &Jaeger) -> i32 {
    jaeger
        .spec
        .storage
        .elasticsearch
        .node_count
        .unwrap_or(DEFAULT_NODE_COUNT)
        .max(1)
}

fn redundancy_policy(jaeger: &Jaeger) -> String {
    match &jaeger.spec.storage.elasticsearch.redundancy_policy {
        Some(policy) => policy.clone(),
        None if node_count(jaeger) == 1 => "ZeroRedundancy".to_string(),
        None => "SingleRedundancy".to_string(),
    }
}

fn replicas_for(jaeger: &Jaeger) -> i32 {
    let nodes = node_count(jaeger);
    match redundancy_policy(jaeger).as_str() {
        "ZeroRedundancy" => 0,
        "SingleRedundancy" => 1.min(nodes - 1),
        "MultipleRedundancy" => (nodes - 1) / 2,
        _ => nodes - 1,
    }
}
