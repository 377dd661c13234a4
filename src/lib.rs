//! `capz-controllers` holds the controller-side building blocks of the Azure Cluster API
//! provider: the pieces the reconcilers share but that do not talk to Azure themselves.
//!
//! - [mapper]: watch mappers turning an event on one kind into reconcile requests for a
//!   related kind, for use with [kube::runtime::Controller::watches].
//! - [cloud_config] and [secret]: rendering of the `azure.json` cloud-provider config into
//!   an owned Secret, and persisting it without touching Secrets the cluster does not own.
//! - [finalizer]: deterministic, length-bounded finalizer names.
//! - [aso]: the contract for creating and deleting Azure Service Operator resources.
//!
//! ## Usage
//!
//! Mappers read related objects from reflector stores, so they are wired next to the
//! controller that owns the stores:
//!
//! ```rust,ignore
//! use capz_controllers::api::AzureCluster;
//! use capz_controllers::api::AzureMachine;
//! use capz_controllers::api::Machine;
//! use capz_controllers::mapper::azure_cluster_to_azure_machines_mapper;
//! use kube::runtime::reflector;
//! use kube::runtime::watcher;
//! use kube::runtime::Controller;
//! use kube::Api;
//!
//! let (machines, writer) = reflector::store::<Machine>();
//! let machine_watch = reflector(writer, watcher(Api::<Machine>::all(client.clone()), watcher::Config::default()));
//!
//! Controller::new(Api::<AzureMachine>::all(client.clone()), watcher::Config::default())
//!     .watches(
//!         Api::<AzureCluster>::all(client.clone()),
//!         watcher::Config::default(),
//!         azure_cluster_to_azure_machines_mapper(machines),
//!     )
//!     .run(reconcile, error_policy, context);
//! ```
//!
//! The cloud-provider config of a machine is built from a [cloud_config::ClusterScope] and
//! stored through a [k8s::SecretRepository]:
//!
//! ```rust,ignore
//! let scope = ClusterScope::new(cluster, azure_cluster, AzureCredentials::from_env(), feature_gates);
//! let owner = azure_machine.controller_owner_ref(&()).unwrap();
//! let secret = get_cloud_provider_secret(&scope, &namespace, &azure_machine.name_any(), owner.clone(), identity, identity_id)?;
//! reconcile_azure_secret(&repo, &owner, &secret, scope.cluster_name()).await?;
//! ```

pub mod api;
pub mod aso;
pub mod cache;
pub mod cloud_config;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod k8s;
#[cfg(test)]
mod log_capture;
pub mod mapper;
pub mod quantity;
pub mod secret;

use kube::Resource;
use kube::ResourceExt;

use crate::error::Error;
use crate::error::Result;

/// The TryResource trait is used to try to extract the name and the namespace of a resources
/// metadata and encapsulates the error handling.
pub trait TryResource {
    fn try_name(&self) -> Result<&str>;
    fn try_namespace(&self) -> Result<String>;
}

impl<R> TryResource for R
where
    R: Resource,
{
    fn try_name(&self) -> Result<&str> {
        self.meta().name.as_deref().ok_or(Error::UnnamedObject)
    }

    fn try_namespace(&self) -> Result<String> {
        self.namespace().ok_or_else(|| {
            Error::UserInput(format!(
                "Expected {} to be namespaced. Can't place it in an unknown namespace.",
                self.meta().name.as_deref().unwrap_or("resource")
            ))
        })
    }
}
