//! Read and write access to the cluster for the controller helpers.
//!
//! Reads used by the watch mappers go through [CacheReader], which is implemented for the
//! kube-runtime reflector [Store] so that mapping an event never calls the API server.
//! Writes go through namespaced [Api] handles obtained from a [ProvideApi] implementation.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::RwLock;

use k8s_openapi::NamespaceResourceScope;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::reflector::Store;
use kube::Api;
use kube::Client;
use kube::Resource;
use kube::ResourceExt;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::error::Result;

/// Synchronous lookups against a local object cache.
///
/// A miss is reported as [Error::NotFound]; callers decide whether that is fatal.
pub trait CacheReader<K>: Send + Sync + 'static {
    /// Gets the object with the given namespace and name.
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<K>>;

    /// Lists the objects in `namespace` carrying every one of `labels`.
    fn list(&self, namespace: &str, labels: &[(&str, &str)]) -> Vec<Arc<K>>;
}

impl<K> CacheReader<K> for Store<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        let key = ObjectRef::<K>::new(name).within(namespace);
        Store::get(self, &key).ok_or_else(|| Error::not_found(K::kind(&()), namespace, name))
    }

    fn list(&self, namespace: &str, labels: &[(&str, &str)]) -> Vec<Arc<K>> {
        self.state()
            .into_iter()
            .filter(|object| object.namespace().as_deref() == Some(namespace))
            .filter(|object| {
                let object_labels = object.labels();
                labels
                    .iter()
                    .all(|(key, value)| object_labels.get(*key).map(String::as_str) == Some(*value))
            })
            .collect()
    }
}

/// Abstraction for obtaining [Api] instances, allowing different caching strategies.
///
/// # Implementations
///
/// - [StaticApiProvider] - pre-populated for a known set of namespaces, no locking
/// - [CachedApiProvider] - lazily populated behind an [RwLock], for dynamic namespaces
pub trait ProvideApi<R>
where
    R: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default,
{
    /// Gets an [Arc<Api>] instance for the given namespace.
    fn get(&self, namespace: &str) -> Result<Arc<Api<R>>>;
}

/// Caches [Arc<Api>] instances per namespace, creating them on first use.
pub struct CachedApiProvider<R>
where
    R: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default,
{
    client: Client,
    cache: RwLock<HashMap<String, Arc<Api<R>>>>,
}

impl<R> CachedApiProvider<R>
where
    R: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default,
{
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> ProvideApi<R> for CachedApiProvider<R>
where
    R: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default,
{
    fn get(&self, namespace: &str) -> Result<Arc<Api<R>>> {
        if let Some(api) = self.cache.read()?.get(namespace) {
            return Ok(Arc::clone(api));
        }

        let mut cache = self.cache.write()?;
        let api = cache
            .entry(namespace.to_owned())
            .or_insert_with(|| Arc::new(Api::namespaced(self.client.clone(), namespace)));
        Ok(Arc::clone(api))
    }
}

/// An immutable provider holding an [Api] per namespace given at construction.
pub struct StaticApiProvider<R>
where
    R: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default,
{
    cache: HashMap<String, Arc<Api<R>>>,
}

impl<R> StaticApiProvider<R>
where
    R: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default,
{
    pub fn new<I, S>(client: Client, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cache = namespaces
            .into_iter()
            .map(|namespace| {
                let api = Arc::new(Api::<R>::namespaced(client.clone(), namespace.as_ref()));
                (namespace.as_ref().to_string(), api)
            })
            .collect();

        Self { cache }
    }

    fn namespaces(&self) -> Vec<&str> {
        let mut namespaces: Vec<&str> = self.cache.keys().map(String::as_str).collect();
        namespaces.sort_unstable();
        namespaces
    }
}

impl<R> ProvideApi<R> for StaticApiProvider<R>
where
    R: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R::DynamicType: Default,
{
    fn get(&self, namespace: &str) -> Result<Arc<Api<R>>> {
        self.cache.get(namespace).map(Arc::clone).ok_or_else(|| {
            Error::UserInput(format!("no Api configured for namespace {namespace}, the provider only serves {:?}", self.namespaces()))
        })
    }
}

/// A client pointing at an address nothing listens on; building `Api`s never connects.
#[cfg(test)]
pub(crate) fn offline_client() -> Client {
    let config = kube::Config::new("http://127.0.0.1:6443".parse().unwrap());
    Client::try_from(config).unwrap()
}

/// Builds a reflector [Store] holding `objects`, for seeding mapper tests.
#[cfg(test)]
pub(crate) fn store_of<K>(objects: Vec<K>) -> Store<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    use kube::runtime::reflector::store::Writer;
    use kube::runtime::watcher::Event;

    let mut writer = Writer::<K>::default();
    for object in objects {
        writer.apply_watcher_event(&Event::Apply(object));
    }
    writer.as_reader()
}
