//! Azure Service Operator resources: the contract the Azure services use to have an ASO
//! resource created, updated or deleted, and its implementation over the Kubernetes API.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::DeleteParams;
use kube::api::DynamicObject;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::core::ApiResource;
use kube::core::GroupVersionKind;
use kube::Api;
use kube::Client;

use crate::error::Error;
use crate::error::Result;
use crate::TryResource;

mod service;

pub use service::Service;

/// Field manager owning the fields written by server-side apply.
pub const FIELD_MANAGER: &str = "capz-manager";

/// Describes one ASO resource a service wants to exist.
pub trait ResourceSpecGetter: Send + Sync {
    /// Identity of the resource: apiVersion, kind, namespace and name.
    fn resource_ref(&self) -> DynamicObject;

    /// Desired state, given the resource as it currently exists in the cluster.
    fn parameters(&self, existing: Option<&DynamicObject>) -> Result<DynamicObject>;

    /// Whether `resource` was created by this controller and may be deleted by it.
    fn was_managed(&self, resource: &DynamicObject) -> bool;
}

/// Creates, updates and deletes ASO resources on behalf of a named Azure service.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Applies the desired state of `spec` and returns the resulting object.
    async fn create_or_update_resource(&self, spec: Arc<dyn ResourceSpecGetter>, service_name: &str) -> Result<DynamicObject>;

    /// Deletes the resource of `spec` if it exists and this controller manages it.
    async fn delete_resource(&self, spec: Arc<dyn ResourceSpecGetter>, service_name: &str) -> Result<()>;
}

/// [ApiResource] of a dynamic object from its apiVersion and kind.
pub fn api_resource_of(object: &DynamicObject) -> Result<ApiResource> {
    let types = object
        .types
        .as_ref()
        .ok_or_else(|| Error::UserInput("ASO resource reference is missing apiVersion and kind".to_owned()))?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    if version.is_empty() || types.kind.is_empty() {
        return Err(Error::UserInput(format!(
            "invalid ASO resource reference {}/{}",
            types.api_version, types.kind
        )));
    }
    Ok(ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &types.kind)))
}

/// Server-side apply body: the parameters stamped with the identity of `resource_ref`,
/// without the server-populated metadata apply rejects.
fn apply_body(resource_ref: &DynamicObject, mut parameters: DynamicObject) -> DynamicObject {
    parameters.types = resource_ref.types.clone();
    parameters.metadata.name = resource_ref.metadata.name.clone();
    parameters.metadata.namespace = resource_ref.metadata.namespace.clone();
    parameters.metadata.managed_fields = None;
    parameters.metadata.resource_version = None;
    parameters.metadata.uid = None;
    parameters.metadata.creation_timestamp = None;
    parameters
}

/// A [Reconciler] talking to the API server.
#[derive(Clone)]
pub struct KubeReconciler {
    client: Client,
    field_manager: String,
}

impl KubeReconciler {
    pub fn new(client: Client) -> Self {
        KubeReconciler {
            client,
            field_manager: FIELD_MANAGER.to_owned(),
        }
    }

    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn api(&self, resource_ref: &DynamicObject) -> Result<Api<DynamicObject>> {
        let api_resource = api_resource_of(resource_ref)?;
        let namespace = resource_ref.try_namespace()?;
        Ok(Api::namespaced_with(self.client.clone(), &namespace, &api_resource))
    }
}

#[async_trait]
impl Reconciler for KubeReconciler {
    async fn create_or_update_resource(&self, spec: Arc<dyn ResourceSpecGetter>, service_name: &str) -> Result<DynamicObject> {
        let resource_ref = spec.resource_ref();
        let api = self.api(&resource_ref)?;
        let name = resource_ref.try_name()?;

        let existing = api.get_opt(name).await?;
        let body = apply_body(&resource_ref, spec.parameters(existing.as_ref())?);

        let params = PatchParams::apply(&self.field_manager).force();
        let applied = api.patch(name, &params, &Patch::Apply(&body)).await?;
        log::debug!(service = service_name, name = name, created = existing.is_none(); "applied ASO resource");
        Ok(applied)
    }

    async fn delete_resource(&self, spec: Arc<dyn ResourceSpecGetter>, service_name: &str) -> Result<()> {
        let resource_ref = spec.resource_ref();
        let api = self.api(&resource_ref)?;
        let name = resource_ref.try_name()?;

        let Some(existing) = api.get_opt(name).await? else {
            log::debug!(service = service_name, name = name; "ASO resource already deleted");
            return Ok(());
        };
        if !spec.was_managed(&existing) {
            log::info!(service = service_name, name = name; "skipping delete of unmanaged ASO resource");
            return Ok(());
        }

        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                log::info!(service = service_name, name = name; "deleting ASO resource");
                Ok(())
            }
            Err(err) => {
                let err = Error::from(err);
                if err.is_not_found() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use kube::api::TypeMeta;
    use kube::ResourceExt;

    /// Spec for an ASO resource group in the default namespace
    pub(crate) struct ResourceGroupSpec {
        pub name: String,
        pub managed: bool,
    }

    impl ResourceGroupSpec {
        pub(crate) fn arc(name: &str) -> Arc<dyn ResourceSpecGetter> {
            Arc::new(ResourceGroupSpec {
                name: name.to_string(),
                managed: true,
            })
        }
    }

    impl ResourceSpecGetter for ResourceGroupSpec {
        fn resource_ref(&self) -> DynamicObject {
            DynamicObject {
                types: Some(TypeMeta {
                    api_version: "resources.azure.com/v1api20200601".to_string(),
                    kind: "ResourceGroup".to_string(),
                }),
                metadata: ObjectMeta {
                    name: Some(self.name.clone()),
                    namespace: Some("default".to_string()),
                    ..Default::default()
                },
                data: serde_json::Value::Null,
            }
        }

        fn parameters(&self, existing: Option<&DynamicObject>) -> Result<DynamicObject> {
            let mut parameters = existing.cloned().unwrap_or_else(|| self.resource_ref());
            parameters.data = serde_json::json!({"spec": {"location": "westeurope"}});
            Ok(parameters)
        }

        fn was_managed(&self, _resource: &DynamicObject) -> bool {
            self.managed
        }
    }

    #[test]
    fn test_api_resource_of() {
        // Given: A reference to an ASO resource group
        let resource_ref = ResourceGroupSpec::arc("my-rg").resource_ref();

        // When: Resolving its API resource
        let api_resource = api_resource_of(&resource_ref).unwrap();

        // Then: Group, version and plural are derived from the type meta
        assert_eq!(api_resource.group, "resources.azure.com");
        assert_eq!(api_resource.version, "v1api20200601");
        assert_eq!(api_resource.kind, "ResourceGroup");
        assert_eq!(api_resource.plural, "resourcegroups");
    }

    #[test]
    fn test_api_resource_of_rejects_untyped_objects() {
        let mut resource_ref = ResourceGroupSpec::arc("my-rg").resource_ref();
        resource_ref.types = None;

        assert!(matches!(api_resource_of(&resource_ref), Err(Error::UserInput(_))));
    }

    #[test]
    fn test_apply_body_strips_server_fields() {
        // Given: Parameters derived from an existing object
        let spec = ResourceGroupSpec::arc("my-rg");
        let mut existing = spec.resource_ref();
        existing.types = None;
        existing.metadata.resource_version = Some("42".to_string());
        existing.metadata.uid = Some("uid".to_string());
        let parameters = spec.parameters(Some(&existing)).unwrap();

        // When: Building the apply body
        let body = apply_body(&spec.resource_ref(), parameters);

        // Then: Identity comes from the reference and server fields are dropped
        assert_eq!(body.types, spec.resource_ref().types);
        assert_eq!(body.name_any(), "my-rg");
        assert_eq!(body.metadata.resource_version, None);
        assert_eq!(body.metadata.uid, None);
        assert_eq!(body.data["spec"]["location"], "westeurope");
    }

    #[tokio::test]
    async fn test_mock_reconciler_records_calls() {
        // Given: A mock expecting one apply for the resource group service
        let mut reconciler = MockReconciler::new();
        reconciler
            .expect_create_or_update_resource()
            .withf(|spec, service_name| spec.resource_ref().name_any() == "my-rg" && service_name == "resourcegroups")
            .times(1)
            .returning(|spec, _| Ok(spec.resource_ref()));

        // When: Applying through the trait
        let applied = reconciler
            .create_or_update_resource(ResourceGroupSpec::arc("my-rg"), "resourcegroups")
            .await
            .unwrap();

        // Then: The mock's result is returned
        assert_eq!(applied.name_any(), "my-rg");
    }
}
