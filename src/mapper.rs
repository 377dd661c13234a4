//! Watch mappers translating an event on one kind into reconcile requests for a related kind.
//!
//! Every constructor returns a closure usable with [kube::runtime::Controller::watches]:
//!
//! ```rust,ignore
//! Controller::new(azure_machines, watcher::Config::default())
//!     .watches(azure_clusters, watcher::Config::default(), azure_cluster_to_azure_machines_mapper(machines))
//! ```
//!
//! Related objects are read from [CacheReader]s, usually the reflector stores the controller
//! already keeps, so mapping never blocks on the API server. Nothing is remembered between
//! events. A group-kind mismatch is not an error: it is logged at debug and yields no request.
//! A failed lookup is logged at error and, where the caller cannot tell whether the target is
//! affected, still yields a request for it.

use kube::core::GroupVersionKind;
use kube::runtime::reflector::ObjectRef;
use kube::Resource;
use kube::ResourceExt;

use crate::api::gvk_of;
use crate::api::owner_cluster_name;
use crate::api::AzureCluster;
use crate::api::AzureMachine;
use crate::api::AzureMachinePool;
use crate::api::AzureManagedCluster;
use crate::api::AzureManagedControlPlane;
use crate::api::AzureManagedMachinePool;
use crate::api::Cluster;
use crate::api::GroupKind;
use crate::api::Machine;
use crate::api::MachinePool;
use crate::api::NodePoolMode;
use crate::api::ObjectReference;
use crate::api::CLUSTER_NAME_LABEL;
use crate::cache::CacheReader;

/// Request for `reference` if it points at `target`. The reference namespace wins over
/// `namespace` when it is set.
fn infrastructure_request<T>(reference: &ObjectReference, namespace: &str, target: &GroupKind) -> Option<ObjectRef<T>>
where
    T: Resource<DynamicType = ()>,
{
    let gk = reference.group_kind();
    if gk != *target {
        log::debug!(gk:% = target, infraGK:% = gk; "gk does not match");
        return None;
    }
    Some(request_for(reference, namespace))
}

fn request_for<T>(reference: &ObjectReference, namespace: &str) -> ObjectRef<T>
where
    T: Resource<DynamicType = ()>,
{
    let namespace = if reference.namespace.is_empty() {
        namespace
    } else {
        reference.namespace.as_str()
    };
    ObjectRef::new(&reference.name).within(namespace)
}

/// Maps a Machine to its infrastructure machine when the ref is of the group-kind of `gvk`.
pub fn machine_to_infrastructure_map_func<T>(
    gvk: GroupVersionKind,
) -> impl Fn(Machine) -> Vec<ObjectRef<T>> + Send + Sync + 'static
where
    T: Resource<DynamicType = ()> + 'static,
{
    let target = GroupKind::from(&gvk);
    move |machine| {
        let namespace = machine.namespace().unwrap_or_default();
        infrastructure_request(&machine.spec.infrastructure_ref, &namespace, &target)
            .into_iter()
            .collect()
    }
}

/// Maps a MachinePool to its infrastructure machine pool when the template's ref is of the
/// group-kind of `gvk`.
pub fn machine_pool_to_infrastructure_map_func<T>(
    gvk: GroupVersionKind,
) -> impl Fn(MachinePool) -> Vec<ObjectRef<T>> + Send + Sync + 'static
where
    T: Resource<DynamicType = ()> + 'static,
{
    let target = GroupKind::from(&gvk);
    move |pool| {
        let namespace = pool.namespace().unwrap_or_default();
        infrastructure_request(pool.infrastructure_ref(), &namespace, &target)
            .into_iter()
            .collect()
    }
}

/// Name of the owning Cluster unless the object is being deleted.
fn live_owner_cluster<K>(object: &K) -> Option<(String, String)>
where
    K: Resource,
{
    if object.meta().deletion_timestamp.is_some() {
        return None;
    }
    let namespace = object.meta().namespace.clone().unwrap_or_default();
    match owner_cluster_name(object.meta()) {
        Some(name) => Some((namespace, name.to_owned())),
        None => {
            log::debug!(name = object.meta().name.as_deref().unwrap_or_default(); "object has no owning Cluster yet");
            None
        }
    }
}

/// Maps an AzureCluster to the AzureMachines of the Machines in its cluster.
pub fn azure_cluster_to_azure_machines_mapper<M>(
    machines: M,
) -> impl Fn(AzureCluster) -> Vec<ObjectRef<AzureMachine>> + Send + Sync + 'static
where
    M: CacheReader<Machine>,
{
    let to_infra = machine_to_infrastructure_map_func::<AzureMachine>(gvk_of::<AzureMachine>());
    move |azure_cluster| {
        let Some((namespace, cluster_name)) = live_owner_cluster(&azure_cluster) else {
            return Vec::new();
        };
        machines
            .list(&namespace, &[(CLUSTER_NAME_LABEL, cluster_name.as_str())])
            .into_iter()
            .flat_map(|machine| to_infra(Machine::clone(&machine)))
            .collect()
    }
}

/// Maps an AzureCluster to the AzureMachinePools of the MachinePools in its cluster.
pub fn azure_cluster_to_azure_machine_pools_mapper<P>(
    machine_pools: P,
) -> impl Fn(AzureCluster) -> Vec<ObjectRef<AzureMachinePool>> + Send + Sync + 'static
where
    P: CacheReader<MachinePool>,
{
    let to_infra = machine_pool_to_infrastructure_map_func::<AzureMachinePool>(gvk_of::<AzureMachinePool>());
    move |azure_cluster| {
        let Some((namespace, cluster_name)) = live_owner_cluster(&azure_cluster) else {
            return Vec::new();
        };
        pools_in_cluster(&machine_pools, &namespace, &cluster_name, &to_infra)
    }
}

fn pools_in_cluster<P, T>(
    machine_pools: &P,
    namespace: &str,
    cluster_name: &str,
    to_infra: &impl Fn(MachinePool) -> Vec<ObjectRef<T>>,
) -> Vec<ObjectRef<T>>
where
    P: CacheReader<MachinePool>,
    T: Resource<DynamicType = ()>,
{
    machine_pools
        .list(namespace, &[(CLUSTER_NAME_LABEL, cluster_name)])
        .into_iter()
        .flat_map(|pool| to_infra(MachinePool::clone(&pool)))
        .collect()
}

/// Maps an AzureManagedCluster to the AzureManagedMachinePools of its cluster.
pub fn azure_managed_cluster_to_azure_managed_machine_pools_mapper<P>(
    machine_pools: P,
) -> impl Fn(AzureManagedCluster) -> Vec<ObjectRef<AzureManagedMachinePool>> + Send + Sync + 'static
where
    P: CacheReader<MachinePool>,
{
    let to_infra = machine_pool_to_infrastructure_map_func::<AzureManagedMachinePool>(gvk_of::<AzureManagedMachinePool>());
    move |managed_cluster| {
        let Some((namespace, cluster_name)) = live_owner_cluster(&managed_cluster) else {
            return Vec::new();
        };
        pools_in_cluster(&machine_pools, &namespace, &cluster_name, &to_infra)
    }
}

/// Maps an AzureManagedControlPlane to the AzureManagedMachinePools of its cluster.
pub fn azure_managed_control_plane_to_azure_managed_machine_pools_mapper<P>(
    machine_pools: P,
) -> impl Fn(AzureManagedControlPlane) -> Vec<ObjectRef<AzureManagedMachinePool>> + Send + Sync + 'static
where
    P: CacheReader<MachinePool>,
{
    let to_infra = machine_pool_to_infrastructure_map_func::<AzureManagedMachinePool>(gvk_of::<AzureManagedMachinePool>());
    move |control_plane| {
        let Some((namespace, cluster_name)) = live_owner_cluster(&control_plane) else {
            return Vec::new();
        };
        pools_in_cluster(&machine_pools, &namespace, &cluster_name, &to_infra)
    }
}

/// Owning Cluster of `object`, looked up in `clusters`.
fn owner_cluster<K, C>(object: &K, clusters: &C) -> Option<std::sync::Arc<Cluster>>
where
    K: Resource,
    C: CacheReader<Cluster>,
{
    let (namespace, name) = live_owner_cluster(object)?;
    match clusters.get(&namespace, &name) {
        Ok(cluster) => Some(cluster),
        Err(err) => {
            log::error!(namespace = namespace.as_str(), cluster = name.as_str(), error:% = err; "failed to get the owner Cluster");
            None
        }
    }
}

/// Maps an AzureManagedCluster to the control plane its Cluster references.
pub fn azure_managed_cluster_to_azure_managed_control_plane_mapper<C>(
    clusters: C,
) -> impl Fn(AzureManagedCluster) -> Vec<ObjectRef<AzureManagedControlPlane>> + Send + Sync + 'static
where
    C: CacheReader<Cluster>,
{
    let target = GroupKind::of::<AzureManagedControlPlane>();
    move |managed_cluster| {
        let Some(cluster) = owner_cluster(&managed_cluster, &clusters) else {
            return Vec::new();
        };
        let namespace = cluster.namespace().unwrap_or_default();
        cluster
            .spec
            .control_plane_ref
            .as_ref()
            .and_then(|reference| infrastructure_request(reference, &namespace, &target))
            .into_iter()
            .collect()
    }
}

/// Maps an AzureManagedControlPlane to the AzureManagedCluster its Cluster references.
pub fn azure_managed_control_plane_to_azure_managed_cluster_mapper<C>(
    clusters: C,
) -> impl Fn(AzureManagedControlPlane) -> Vec<ObjectRef<AzureManagedCluster>> + Send + Sync + 'static
where
    C: CacheReader<Cluster>,
{
    let target = GroupKind::of::<AzureManagedCluster>();
    move |control_plane| {
        let Some(cluster) = owner_cluster(&control_plane, &clusters) else {
            return Vec::new();
        };
        let namespace = cluster.namespace().unwrap_or_default();
        cluster
            .spec
            .infrastructure_ref
            .as_ref()
            .and_then(|reference| infrastructure_request(reference, &namespace, &target))
            .into_iter()
            .collect()
    }
}

/// Maps a MachinePool to its cluster's managed control plane when the pool is a System pool.
///
/// When the control plane or the AzureManagedMachinePool cannot be read the control plane is
/// requested anyway.
pub fn machine_pool_to_azure_managed_control_plane_map_func<C, P, A>(
    gvk: GroupVersionKind,
    clusters: C,
    control_planes: P,
    managed_pools: A,
) -> impl Fn(MachinePool) -> Vec<ObjectRef<AzureManagedControlPlane>> + Send + Sync + 'static
where
    C: CacheReader<Cluster>,
    P: CacheReader<AzureManagedControlPlane>,
    A: CacheReader<AzureManagedMachinePool>,
{
    let control_plane_gk = GroupKind::from(&gvk);
    let managed_pool_kind = AzureManagedMachinePool::kind(&()).into_owned();

    move |pool| {
        let namespace = pool.namespace().unwrap_or_default();
        let cluster = match clusters.get(&namespace, &pool.spec.cluster_name) {
            Ok(cluster) => cluster,
            Err(err) => {
                log::error!(namespace = namespace.as_str(), cluster = pool.spec.cluster_name.as_str(), error:% = err; "failed to get the Cluster of the MachinePool");
                return Vec::new();
            }
        };

        let Some(control_plane_ref) = cluster.spec.control_plane_ref.as_ref() else {
            return Vec::new();
        };
        let gk = control_plane_ref.group_kind();
        if gk != control_plane_gk {
            log::debug!(gk:% = control_plane_gk, infraGK:% = gk; "gk does not match");
            return Vec::new();
        }

        let request = request_for::<AzureManagedControlPlane>(control_plane_ref, &namespace);
        let cp_namespace = request.namespace.clone().unwrap_or_default();
        if let Err(err) = control_planes.get(&cp_namespace, &request.name) {
            log::error!(error:% = err; "failed to fetch default pool reference");
            return vec![request];
        }

        let infra_ref = pool.infrastructure_ref();
        let kind_matches = infra_ref.kind == managed_pool_kind;
        let group_matches = infra_ref.group_kind().group == control_plane_gk.group;

        let managed_pool_ref = request_for::<AzureManagedMachinePool>(infra_ref, &namespace);
        let managed_pool = match managed_pools.get(managed_pool_ref.namespace.as_deref().unwrap_or_default(), &managed_pool_ref.name) {
            Ok(managed_pool) => managed_pool,
            Err(err) => {
                log::error!(machinePool = infra_ref.name.as_str(), error:% = err; "failed to fetch azure managed machine pool for MachinePool");
                return vec![request];
            }
        };

        if kind_matches && group_matches && managed_pool.spec.mode == NodePoolMode::System {
            vec![request]
        } else {
            Vec::new()
        }
    }
}
