//! Object store contract consumed by the reconciler
//!
//! The reconciler only ever lists, gets, creates, updates and deletes typed
//! objects. [`KubeStore`] talks to the API server; [`MemoryStore`] keeps
//! objects in memory and can stand in for cluster controllers in tests.

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::{MemoryStore, Operation, OperationKind};

use std::fmt::Debug;

use async_trait::async_trait;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Bounds every stored object type satisfies
pub trait StoredObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Typed access to cluster objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List objects matching an equality label selector, optionally within a namespace
    async fn list<K: StoredObject>(&self, namespace: Option<&str>, selector: &str)
        -> Result<Vec<K>>;

    /// Fetch one object; `None` when it does not exist
    async fn get<K: StoredObject>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>>;

    /// Create an object; fails with `Error::AlreadyExists` on a name clash
    async fn create<K: StoredObject>(&self, obj: &K) -> Result<K>;

    /// Replace an object
    async fn update<K: StoredObject>(&self, obj: &K) -> Result<K>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete<K: StoredObject>(&self, obj: &K) -> Result<()>;
}

/// `namespace.name` key identifying an object within its kind
pub fn object_key<K: Resource>(obj: &K) -> String {
    let meta = obj.meta();
    format!(
        "{}.{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}

/// Kind name for logs and errors
pub fn kind_of<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).into_owned()
}
