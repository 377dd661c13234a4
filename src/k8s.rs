//! Kubernetes-backed persistence for the Secrets the controller renders.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::PostParams;

use crate::cache::ProvideApi;
use crate::error::Result;
use crate::TryResource;

/// The Secret operations [crate::secret::reconcile_azure_secret] needs.
///
/// [K8sRepository] talks to the API server; tests use in-memory or mocked doubles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretRepository: Send + Sync {
    /// Gets a Secret, `None` when it does not exist.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn create_secret(&self, secret: &Secret) -> Result<()>;

    /// Replaces a Secret; the resource version it carries guards against lost updates.
    async fn replace_secret(&self, secret: &Secret) -> Result<()>;
}

/// A [SecretRepository] that reads and writes through namespaced [kube::Api] handles.
///
/// # Example
///
/// ```rust,ignore
/// use capz_controllers::cache::CachedApiProvider;
/// use capz_controllers::k8s::K8sRepository;
///
/// let repo = K8sRepository::new(Arc::new(CachedApiProvider::new(client)));
/// reconcile_azure_secret(&repo, &owner, &secret, "my-cluster").await?;
/// ```
pub struct K8sRepository<P>
where
    P: ProvideApi<Secret>,
{
    api_provider: Arc<P>,
}

impl<P> K8sRepository<P>
where
    P: ProvideApi<Secret> + Send + Sync,
{
    pub fn new(api_provider: Arc<P>) -> Self {
        K8sRepository { api_provider }
    }
}

#[async_trait]
impl<P> SecretRepository for K8sRepository<P>
where
    P: ProvideApi<Secret> + Send + Sync,
{
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api = self.api_provider.get(namespace)?;
        Ok(api.get_opt(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        let api = self.api_provider.get(&secret.try_namespace()?)?;
        api.create(&PostParams::default(), secret).await?;
        Ok(())
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<()> {
        let api = self.api_provider.get(&secret.try_namespace()?)?;
        let name = secret.try_name()?;
        api.replace(name, &PostParams::default(), secret).await?;
        Ok(())
    }
}
