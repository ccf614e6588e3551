//! Object store backed by the Kubernetes API

use async_trait::async_trait;
use kube::{
    api::{ApiResource, DeleteParams, DynamicObject, ListParams, PostParams},
    Api, Client, ResourceExt,
};
use tracing::debug;

use super::{kind_of, object_key, ObjectStore, StoredObject};
use crate::error::{Error, Result};

/// Store that reads and writes through a kube client
///
/// Objects are sent as `DynamicObject`s so one implementation serves
/// namespaced and cluster-scoped kinds alike.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoredObject>(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::erase::<K>(&());
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn api_for<K: StoredObject>(&self, obj: &K) -> Api<DynamicObject> {
        self.api::<K>(obj.meta().namespace.as_deref())
    }
}

fn to_dynamic<K: StoredObject>(obj: &K) -> Result<DynamicObject> {
    let mut value = serde_json::to_value(obj)?;
    // k8s-openapi types omit apiVersion/kind when serialized through some paths
    if let Some(map) = value.as_object_mut() {
        map.entry("apiVersion")
            .or_insert_with(|| K::api_version(&()).into_owned().into());
        map.entry("kind")
            .or_insert_with(|| K::kind(&()).into_owned().into());
    }
    Ok(serde_json::from_value(value)?)
}

fn from_dynamic<K: StoredObject>(obj: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn list<K: StoredObject>(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<K>> {
        let list = self
            .api::<K>(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        list.items.into_iter().map(from_dynamic).collect()
    }

    async fn get<K: StoredObject>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>> {
        self.api::<K>(namespace)
            .get_opt(name)
            .await?
            .map(from_dynamic)
            .transpose()
    }

    async fn create<K: StoredObject>(&self, obj: &K) -> Result<K> {
        debug!(kind = %kind_of::<K>(), key = %object_key(obj), "Creating object");
        match self
            .api_for(obj)
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await
        {
            Ok(created) => from_dynamic(created),
            Err(kube::Error::Api(e)) if e.code == 409 && e.reason == "AlreadyExists" => {
                Err(Error::AlreadyExists {
                    kind: kind_of::<K>(),
                    key: object_key(obj),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update<K: StoredObject>(&self, obj: &K) -> Result<K> {
        debug!(kind = %kind_of::<K>(), key = %object_key(obj), "Updating object");
        let replaced = self
            .api_for(obj)
            .replace(&obj.name_any(), &PostParams::default(), &to_dynamic(obj)?)
            .await?;
        from_dynamic(replaced)
    }

    async fn delete<K: StoredObject>(&self, obj: &K) -> Result<()> {
        debug!(kind = %kind_of::<K>(), key = %object_key(obj), "Deleting object");
        match self
            .api_for(obj)
            .delete(&obj.name_any(), &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
