//! Create/update/delete classification of managed objects
//!
//! [`diff`] compares the objects found in the cluster with the objects a
//! strategy wants and partitions them into an [`Inventory`]. Updates start
//! from the existing object so server-managed fields and metadata written by
//! other controllers survive; only the fields the operator owns are replaced.

mod kinds;

use std::collections::{BTreeMap, HashMap, HashSet};

use kube::ResourceExt;
use tracing::warn;

use crate::store::{object_key, StoredObject};

/// A kind the differ can reconcile
pub trait Reconciled: StoredObject {
    /// Replace the mutable spec/data fields of `self` with those of `desired`
    ///
    /// Fields the server assigns (cluster IPs, generated hosts) must be left
    /// untouched unless `desired` sets them explicitly.
    fn merge_from(&mut self, desired: &Self);
}

/// Partition of one kind's objects
#[derive(Clone, Debug)]
pub struct Inventory<K> {
    pub create: Vec<K>,
    pub update: Vec<K>,
    pub delete: Vec<K>,
}

impl<K> Default for Inventory<K> {
    fn default() -> Self {
        Self {
            create: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<K> Inventory<K> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }
}

/// Classify `existing` and `desired` objects by `namespace.name`
///
/// Keys present on both sides become updates, desired-only keys creates and
/// existing-only keys deletes. Every key lands in exactly one list. A key
/// repeated in `desired` is classified once, first occurrence wins.
pub fn diff<K: Reconciled>(existing: Vec<K>, desired: Vec<K>) -> Inventory<K> {
    let mut existing_by_key: HashMap<String, K> = HashMap::with_capacity(existing.len());
    let mut existing_order = Vec::with_capacity(existing.len());
    for obj in existing {
        let key = object_key(&obj);
        if existing_by_key.insert(key.clone(), obj).is_none() {
            existing_order.push(key);
        }
    }

    let mut inventory = Inventory::default();
    let mut seen = HashSet::with_capacity(desired.len());
    for want in desired {
        let key = object_key(&want);
        if !seen.insert(key.clone()) {
            warn!(kind = %K::kind(&()), key = %key, "Duplicate desired object ignored");
            continue;
        }
        match existing_by_key.remove(&key) {
            Some(have) => inventory.update.push(merge(have, &want)),
            None => inventory.create.push(want),
        }
    }

    inventory.delete = existing_order
        .into_iter()
        .filter_map(|key| existing_by_key.remove(&key))
        .collect();

    inventory
}

/// Existing object carrying the desired object's owned fields
fn merge<K: Reconciled>(existing: K, desired: &K) -> K {
    let mut updated = existing;
    updated.merge_from(desired);

    let desired_meta = desired.meta();
    updated.meta_mut().owner_references = desired_meta.owner_references.clone();
    merge_map(updated.labels_mut(), desired_meta.labels.as_ref());
    merge_map(updated.annotations_mut(), desired_meta.annotations.as_ref());
    updated
}

fn merge_map(target: &mut BTreeMap<String, String>, desired: Option<&BTreeMap<String, String>>) {
    if let Some(desired) = desired {
        for (k, v) in desired {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    use super::*;

    fn meta(ns: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        }
    }

    fn config_map(ns: &str, name: &str, value: &str) -> ConfigMap {
        ConfigMap {
            metadata: meta(ns, name),
            data: Some(BTreeMap::from([("key".to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    fn names<K: Reconciled>(objs: &[K]) -> Vec<String> {
        objs.iter().map(|o| object_key(o)).collect()
    }

    #[test]
    fn every_key_is_classified_exactly_once() {
        let existing = vec![
            config_map("ns", "a", "1"),
            config_map("ns", "b", "1"),
            config_map("ns", "c", "1"),
        ];
        let desired = vec![
            config_map("ns", "b", "2"),
            config_map("ns", "d", "2"),
            config_map("ns", "a", "2"),
        ];

        let inv = diff(existing, desired);

        assert_eq!(names(&inv.create), vec!["ns.d"]);
        assert_eq!(names(&inv.update), vec!["ns.b", "ns.a"]);
        assert_eq!(names(&inv.delete), vec!["ns.c"]);
        assert_eq!(inv.len(), 4);

        let mut all: Vec<String> = names(&inv.create);
        all.extend(names(&inv.update));
        all.extend(names(&inv.delete));
        all.sort();
        all.dedup();
        assert_eq!(all.len(), inv.len());
    }

    #[test]
    fn same_name_in_other_namespace_is_never_merged() {
        let inv = diff(vec![config_map("a", "x", "1")], vec![config_map("b", "x", "1")]);

        assert_eq!(names(&inv.create), vec!["b.x"]);
        assert_eq!(names(&inv.delete), vec!["a.x"]);
        assert!(inv.update.is_empty());
    }

    #[test]
    fn update_merges_metadata_and_keeps_server_fields() {
        let mut existing = config_map("ns", "a", "old");
        existing.metadata.resource_version = Some("42".to_string());
        existing.metadata.uid = Some("uid-1".to_string());
        existing.metadata.labels = Some(BTreeMap::from([
            ("shared".to_string(), "old".to_string()),
            ("foreign".to_string(), "kept".to_string()),
        ]));
        existing.metadata.annotations = Some(BTreeMap::from([(
            "kubectl.kubernetes.io/last-applied".to_string(),
            "{}".to_string(),
        )]));
        existing.metadata.owner_references = Some(vec![OwnerReference {
            name: "stale".to_string(),
            ..Default::default()
        }]);

        let mut desired = config_map("ns", "a", "new");
        desired.metadata.labels = Some(BTreeMap::from([
            ("shared".to_string(), "new".to_string()),
            ("added".to_string(), "yes".to_string()),
        ]));
        desired.metadata.annotations =
            Some(BTreeMap::from([("ours".to_string(), "1".to_string())]));
        desired.metadata.owner_references = Some(vec![OwnerReference {
            name: "demo".to_string(),
            ..Default::default()
        }]);

        let inv = diff(vec![existing], vec![desired]);
        let updated = &inv.update[0];

        assert_eq!(updated.data.as_ref().unwrap()["key"], "new");
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(updated.metadata.uid.as_deref(), Some("uid-1"));

        let labels = updated.metadata.labels.as_ref().unwrap();
        assert_eq!(labels["shared"], "new");
        assert_eq!(labels["foreign"], "kept");
        assert_eq!(labels["added"], "yes");

        let annotations = updated.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations["kubectl.kubernetes.io/last-applied"], "{}");
        assert_eq!(annotations["ours"], "1");

        let owners = updated.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].name, "demo");
    }

    #[test]
    fn service_update_keeps_cluster_ip() {
        let existing = Service {
            metadata: meta("ns", "demo-query"),
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.0.0.7".to_string()),
                cluster_ips: Some(vec!["10.0.0.7".to_string()]),
                type_: Some("ClusterIP".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let desired = Service {
            metadata: meta("ns", "demo-query"),
            spec: Some(ServiceSpec {
                type_: Some("NodePort".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let inv = diff(vec![existing], vec![desired]);
        let spec = inv.update[0].spec.as_ref().unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(spec.cluster_ips.as_ref().unwrap(), &vec!["10.0.0.7".to_string()]);
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
    }

    #[test]
    fn deployment_update_replaces_spec_and_keeps_status() {
        let mut existing = Deployment {
            metadata: meta("ns", "demo-query"),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        existing.status = Some(Default::default());
        let desired = Deployment {
            metadata: meta("ns", "demo-query"),
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };

        let inv = diff(vec![existing], vec![desired]);
        assert_eq!(inv.update[0].spec.as_ref().unwrap().replicas, Some(3));
        assert!(inv.update[0].status.is_some());
    }

    #[test]
    fn rediff_after_apply_has_nothing_to_create_or_delete() {
        let desired = vec![config_map("ns", "a", "1"), config_map("ns", "b", "1")];
        let first = diff(vec![config_map("ns", "stale", "1")], desired.clone());

        let mut cluster: Vec<ConfigMap> = first.create.clone();
        cluster.extend(first.update.clone());

        let second = diff(cluster, desired);
        assert!(second.create.is_empty());
        assert!(second.delete.is_empty());
        assert_eq!(second.update.len(), 2);
    }

    #[test]
    fn duplicate_desired_keys_are_classified_once() {
        let inv = diff(
            Vec::<ConfigMap>::new(),
            vec![config_map("ns", "a", "first"), config_map("ns", "a", "second")],
        );
        assert_eq!(inv.create.len(), 1);
        assert_eq!(inv.create[0].data.as_ref().unwrap()["key"], "first");
    }
}
