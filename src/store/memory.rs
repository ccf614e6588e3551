//! In-memory object store
//!
//! Behaves like a tiny API server: it stamps uids and resource versions,
//! rejects duplicate creates, and records every write. With
//! [`MemoryStore::simulate_controllers`] it also plays the part of the
//! workload controllers and external operators, so objects become ready
//! as soon as they are written.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use kube::Resource;
use serde_json::{json, Value};

use super::{kind_of, object_key, ObjectStore, StoredObject};
use crate::error::{Error, Result};
use crate::labels;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectId {
    kind: String,
    namespace: String,
    name: String,
}

/// Write operation kinds recorded by the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

/// One recorded write
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub op: OperationKind,
    pub kind: String,
    pub key: String,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        };
        write!(f, "{} {} {}", op, self.kind, self.key)
    }
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectId, Value>,
    version: u64,
    log: Vec<Operation>,
    simulate: bool,
}

/// Object store kept entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make written objects report readiness the way their controllers would
    pub fn simulate_controllers(self) -> Self {
        self.lock().simulate = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seed an object without recording an operation
    pub fn insert<K: StoredObject>(&self, obj: &K) -> K {
        let Ok(value) = with_type_meta(obj) else {
            return obj.clone();
        };
        let mut inner = self.lock();
        let value = inner.stamp(value, true);
        inner.objects.insert(id_of(obj), value.clone());
        serde_json::from_value(value).unwrap_or_else(|_| obj.clone())
    }

    /// Current copy of an object
    pub fn fetch<K: StoredObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let id = id_for::<K>(namespace, name);
        self.lock()
            .objects
            .get(&id)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Remove an object as if another actor deleted it
    pub fn remove<K: StoredObject>(&self, namespace: Option<&str>, name: &str) -> bool {
        self.lock()
            .objects
            .remove(&id_for::<K>(namespace, name))
            .is_some()
    }

    /// Overwrite the status of a stored object
    pub fn set_status<K: StoredObject>(&self, namespace: Option<&str>, name: &str, status: Value) {
        let id = id_for::<K>(namespace, name);
        if let Some(obj) = self.lock().objects.get_mut(&id) {
            obj["status"] = status;
        }
    }

    /// Every object of kind `K`
    pub fn all<K: StoredObject>(&self) -> Vec<K> {
        let kind = kind_of::<K>();
        self.lock()
            .objects
            .iter()
            .filter(|(id, _)| id.kind == kind)
            .filter_map(|(_, v)| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    /// Recorded writes, oldest first
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().log.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().log.clear();
    }
}

impl Inner {
    fn stamp(&mut self, mut value: Value, fresh: bool) -> Value {
        self.version += 1;
        let version = self.version;
        let meta = &mut value["metadata"];
        meta["resourceVersion"] = json!(version.to_string());
        if fresh || meta.get("uid").map_or(true, Value::is_null) {
            meta["uid"] = json!(format!("uid-{}", version));
            meta["creationTimestamp"] = json!("2024-01-01T00:00:00Z");
        }
        value
    }

    fn record(&mut self, op: OperationKind, kind: &str, key: String) {
        self.log.push(Operation {
            op,
            kind: kind.to_string(),
            key,
        });
    }

    /// Stand-in for workload controllers and external operators
    fn settle(&mut self, id: &ObjectId) {
        if id.kind == "Elasticsearch" {
            self.add_es_node(id);
        }
        let Some(obj) = self.objects.get_mut(id) else {
            return;
        };
        match id.kind.as_str() {
            "Deployment" => {
                let replicas = obj["spec"]["replicas"].as_i64().unwrap_or(1);
                obj["status"] = json!({ "replicas": replicas, "readyReplicas": replicas });
            }
            "Job" => {
                obj["status"] = json!({ "succeeded": 1 });
            }
            "Kafka" | "KafkaUser" => {
                obj["status"] = json!({ "conditions": [{ "type": "Ready", "status": "True" }] });
            }
            _ => {}
        }
    }

    /// The Elasticsearch operator runs its nodes as ready deployments
    fn add_es_node(&mut self, es: &ObjectId) {
        let name = format!("{}-cdm-1", es.name);
        let cluster_label = labels::ES_CLUSTER_NAME;
        let node = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": name,
                "namespace": es.namespace,
                "labels": { cluster_label: es.name },
            },
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": { cluster_label: es.name } },
                "template": {},
            },
            "status": { "replicas": 1, "readyReplicas": 1 },
        });
        let node = self.stamp(node, true);
        self.objects.insert(
            ObjectId {
                kind: "Deployment".to_string(),
                namespace: es.namespace.clone(),
                name,
            },
            node,
        );
    }
}

fn id_for<K: StoredObject>(namespace: Option<&str>, name: &str) -> ObjectId {
    ObjectId {
        kind: kind_of::<K>(),
        namespace: namespace.unwrap_or_default().to_string(),
        name: name.to_string(),
    }
}

fn id_of<K: StoredObject>(obj: &K) -> ObjectId {
    let meta = obj.meta();
    id_for::<K>(meta.namespace.as_deref(), meta.name.as_deref().unwrap_or_default())
}

fn not_found(kind: &str, key: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} '{}' not found", kind, key),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

fn with_type_meta<K: StoredObject>(obj: &K) -> Result<Value> {
    let mut value = serde_json::to_value(obj)?;
    value["apiVersion"] = json!(K::api_version(&()));
    value["kind"] = json!(K::kind(&()));
    Ok(value)
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list<K: StoredObject>(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<K>> {
        let kind = kind_of::<K>();
        let inner = self.lock();
        let mut items = Vec::new();
        for (id, value) in &inner.objects {
            if id.kind != kind || namespace.is_some_and(|ns| ns != id.namespace) {
                continue;
            }
            let obj: K = serde_json::from_value(value.clone())?;
            let obj_labels = obj.meta().labels.clone().unwrap_or_default();
            if labels::matches_selector(&obj_labels, selector) {
                items.push(obj);
            }
        }
        Ok(items)
    }

    async fn get<K: StoredObject>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>> {
        let inner = self.lock();
        inner
            .objects
            .get(&id_for::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).map_err(Error::from))
            .transpose()
    }

    async fn create<K: StoredObject>(&self, obj: &K) -> Result<K> {
        let kind = kind_of::<K>();
        let id = id_of(obj);
        let mut inner = self.lock();
        if inner.objects.contains_key(&id) {
            return Err(Error::AlreadyExists {
                kind,
                key: object_key(obj),
            });
        }
        let value = inner.stamp(with_type_meta(obj)?, true);
        inner.objects.insert(id.clone(), value);
        inner.record(OperationKind::Create, &kind, object_key(obj));
        if inner.simulate {
            inner.settle(&id);
        }
        Ok(serde_json::from_value(inner.objects[&id].clone())?)
    }

    async fn update<K: StoredObject>(&self, obj: &K) -> Result<K> {
        let kind = kind_of::<K>();
        let id = id_of(obj);
        let mut inner = self.lock();
        let Some(current) = inner.objects.get(&id) else {
            return Err(not_found(&kind, &object_key(obj)));
        };
        let status = current.get("status").cloned();

        let mut value = with_type_meta(obj)?;
        // status is a subresource; a plain update never changes it
        match status {
            Some(status) => value["status"] = status,
            None => {
                if let Some(map) = value.as_object_mut() {
                    map.remove("status");
                }
            }
        }
        let value = inner.stamp(value, false);
        inner.objects.insert(id.clone(), value);
        inner.record(OperationKind::Update, &kind, object_key(obj));
        if inner.simulate {
            inner.settle(&id);
        }
        Ok(serde_json::from_value(inner.objects[&id].clone())?)
    }

    async fn delete<K: StoredObject>(&self, obj: &K) -> Result<()> {
        let kind = kind_of::<K>();
        let mut inner = self.lock();
        inner.objects.remove(&id_of(obj));
        inner.record(OperationKind::Delete, &kind, object_key(obj));
        Ok(())
    }
}
