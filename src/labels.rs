//! Label and annotation constants shared by every builder and the differ
//!
//! Ownership labels scope every list the reconciler performs, so one Jaeger
//! instance can never observe or delete objects belonging to another.

use std::collections::BTreeMap;

use kube::ResourceExt;

use crate::crd::Jaeger;

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the tool managing the object
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the object name
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for the component within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the higher-level application
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Namespace of the owning instance, carried by cluster-scoped objects
pub const INSTANCE_NAMESPACE: &str = "jaegertracing.io/instance-namespace";

/// Legacy app label kept for selectors written against older releases
pub const APP: &str = "app";

pub const APP_JAEGER: &str = "jaeger";

/// Annotation requesting agent sidecar injection
pub const SIDECAR_INJECT_ANNOTATION: &str = "sidecar.jaegertracing.io/inject";

/// Label the OpenShift Elasticsearch operator puts on its deployments
pub const ES_CLUSTER_NAME: &str = "cluster-name";

/// Ownership labels for an instance
pub fn ownership(jaeger: &Jaeger, identity: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_INSTANCE.to_string(), jaeger.name_any()),
        (K8S_MANAGED_BY.to_string(), identity.to_string()),
    ])
}

/// Selector matching namespaced objects owned by an instance
pub fn ownership_selector(instance: &str, identity: &str) -> String {
    format!("{}={},{}={}", K8S_INSTANCE, instance, K8S_MANAGED_BY, identity)
}

/// Selector matching cluster-scoped objects owned by an instance
pub fn cluster_ownership_selector(instance: &str, namespace: &str, identity: &str) -> String {
    format!(
        "{},{}={}",
        ownership_selector(instance, identity),
        INSTANCE_NAMESPACE,
        namespace
    )
}

/// Full label set for an object built for `jaeger`
pub fn component_labels(
    jaeger: &Jaeger,
    identity: &str,
    name: &str,
    component: &str,
) -> BTreeMap<String, String> {
    let mut labels = jaeger.spec.labels.clone();
    labels.extend(ownership(jaeger, identity));
    labels.insert(APP.to_string(), APP_JAEGER.to_string());
    labels.insert(K8S_NAME.to_string(), name.to_string());
    labels.insert(K8S_COMPONENT.to_string(), component.to_string());
    labels.insert(K8S_PART_OF.to_string(), APP_JAEGER.to_string());
    labels
}

/// Pod selector labels for a component; a stable subset of `component_labels`
pub fn selector_labels(jaeger: &Jaeger, name: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP.to_string(), APP_JAEGER.to_string()),
        (K8S_INSTANCE.to_string(), jaeger.name_any()),
        (K8S_NAME.to_string(), name.to_string()),
        (K8S_COMPONENT.to_string(), component.to_string()),
    ])
}

/// Whether `labels` satisfies an equality-only selector such as `a=b,c=d`
pub fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matching() {
        let labels = BTreeMap::from([
            (K8S_INSTANCE.to_string(), "demo".to_string()),
            (K8S_MANAGED_BY.to_string(), "jaeger-operator".to_string()),
        ]);
        assert!(matches_selector(
            &labels,
            &ownership_selector("demo", "jaeger-operator")
        ));
        assert!(!matches_selector(
            &labels,
            &ownership_selector("other", "jaeger-operator")
        ));
        assert!(!matches_selector(
            &labels,
            &cluster_ownership_selector("demo", "ns", "jaeger-operator")
        ));
        assert!(matches_selector(&labels, ""));
    }

    #[test]
    fn component_labels_cannot_be_overridden_by_user_labels() {
        let mut jaeger = Jaeger::new("demo", Default::default());
        jaeger
            .spec
            .labels
            .insert(K8S_INSTANCE.to_string(), "hijack".to_string());
        jaeger.spec.labels.insert("team".to_string(), "obs".to_string());

        let labels = component_labels(&jaeger, "jaeger-operator", "demo-query", "query");
        assert_eq!(labels[K8S_INSTANCE], "demo");
        assert_eq!(labels["team"], "obs");
        assert_eq!(labels[K8S_COMPONENT], "query");
    }
}
