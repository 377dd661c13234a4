//! The subset of the Azure infrastructure kinds (`infrastructure.cluster.x-k8s.io`) the
//! controllers read, with the defaulting the cloud-provider config relies on.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::quantity::Quantity;

/// Label value marking a resource as created and owned by the controller.
pub const RESOURCE_LIFECYCLE_OWNED: &str = "owned";

/// Azure environment assumed when a cluster does not name one.
pub const DEFAULT_AZURE_CLOUD: &str = "AzurePublicCloud";

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureCluster",
    plural = "azureclusters",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterSpec {
    #[serde(default)]
    pub location: String,
    #[serde(rename = "subscriptionID", default)]
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_environment: Option<String>,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub network_spec: NetworkSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_config_overrides: Option<CloudProviderConfigOverrides>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    #[serde(default)]
    pub vnet: VnetSpec,
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_outbound_lb: Option<LoadBalancerSpec>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VnetSpec {
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    pub role: SubnetRole,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub security_group: NamedResource,
    #[serde(default)]
    pub route_table: NamedResource,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubnetRole {
    #[default]
    Node,
    #[serde(rename = "control-plane")]
    ControlPlane,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
pub struct NamedResource {
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
pub struct LoadBalancerSpec {
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudProviderConfigOverrides {
    #[serde(default)]
    pub rate_limits: Vec<RateLimitSpec>,
    #[serde(default)]
    pub back_offs: BackOffConfig,
}

/// A named rate limit; `defaultRateLimit` applies to the whole cloud provider, other
/// names to a single Azure resource type.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
pub struct RateLimitSpec {
    pub name: String,
    #[serde(default)]
    pub config: RateLimitConfig,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default)]
    pub cloud_provider_rate_limit: bool,
    #[serde(rename = "cloudProviderRateLimitQPS", default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_rate_limit_qps: Option<Quantity>,
    #[serde(default)]
    pub cloud_provider_rate_limit_bucket: i32,
    #[serde(rename = "cloudProviderRateLimitQPSWrite", default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_rate_limit_qps_write: Option<Quantity>,
    #[serde(default)]
    pub cloud_provider_rate_limit_bucket_write: i32,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackOffConfig {
    #[serde(default)]
    pub cloud_provider_backoff: bool,
    #[serde(default)]
    pub cloud_provider_backoff_retries: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_backoff_exponent: Option<Quantity>,
    #[serde(default)]
    pub cloud_provider_backoff_duration: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_provider_backoff_jitter: Option<Quantity>,
}

impl AzureCluster {
    /// Fills in the network names the webhook would default: the vnet, a control plane
    /// and a node subnet, and their security groups and route table.
    pub fn set_defaults(&mut self) {
        let name = self.metadata.name.clone().unwrap_or_default();
        let spec = &mut self.spec;

        if spec.azure_environment.as_deref().map_or(true, str::is_empty) {
            spec.azure_environment = Some(DEFAULT_AZURE_CLOUD.to_owned());
        }
        if spec.resource_group.is_empty() {
            spec.resource_group = name.clone();
        }

        let vnet = &mut spec.network_spec.vnet;
        if vnet.resource_group.is_empty() {
            vnet.resource_group = spec.resource_group.clone();
        }
        if vnet.name.is_empty() {
            vnet.name = format!("{name}-vnet");
        }

        let subnets = &mut spec.network_spec.subnets;
        for role in [SubnetRole::ControlPlane, SubnetRole::Node] {
            if !subnets.iter().any(|subnet| subnet.role == role) {
                subnets.push(SubnetSpec {
                    role,
                    ..Default::default()
                });
            }
        }
        for subnet in subnets.iter_mut() {
            let prefix = match subnet.role {
                SubnetRole::ControlPlane => format!("{name}-controlplane"),
                SubnetRole::Node => format!("{name}-node"),
            };
            if subnet.name.is_empty() {
                subnet.name = format!("{prefix}-subnet");
            }
            if subnet.security_group.name.is_empty() {
                subnet.security_group.name = format!("{prefix}-nsg");
            }
            if subnet.role == SubnetRole::Node && subnet.route_table.name.is_empty() {
                subnet.route_table.name = format!("{prefix}-routetable");
            }
        }
    }

    /// First subnet with the node role.
    pub fn node_subnet(&self) -> Option<&SubnetSpec> {
        self.spec
            .network_spec
            .subnets
            .iter()
            .find(|subnet| subnet.role == SubnetRole::Node)
    }
}

/// Identity assigned to a virtual machine.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum VmIdentity {
    #[default]
    None,
    SystemAssigned,
    UserAssigned,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAssignedIdentity {
    #[serde(rename = "providerID")]
    pub provider_id: String,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureMachine",
    plural = "azuremachines",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AzureMachineSpec {
    #[serde(default)]
    pub vm_size: String,
    #[serde(default)]
    pub identity: VmIdentity,
    #[serde(default)]
    pub user_assigned_identities: Vec<UserAssignedIdentity>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureMachinePool",
    plural = "azuremachinepools",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AzureMachinePoolSpec {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub identity: VmIdentity,
    #[serde(default)]
    pub user_assigned_identities: Vec<UserAssignedIdentity>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureManagedCluster",
    plural = "azuremanagedclusters",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedClusterSpec {
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
pub struct ApiEndpoint {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: i32,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureManagedControlPlane",
    plural = "azuremanagedcontrolplanes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedControlPlaneSpec {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub resource_group_name: String,
    #[serde(rename = "subscriptionID", default)]
    pub subscription_id: String,
    #[serde(default)]
    pub location: String,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Default, Clone, PartialEq, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureManagedMachinePool",
    plural = "azuremanagedmachinepools",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AzureManagedMachinePoolSpec {
    pub mode: NodePoolMode,
    #[serde(default)]
    pub sku: String,
    #[serde(rename = "osDiskSizeGB", default, skip_serializing_if = "Option::is_none")]
    pub os_disk_size_gb: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, JsonSchema)]
pub enum NodePoolMode {
    System,
    #[default]
    User,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn azure_cluster(spec: AzureClusterSpec) -> AzureCluster {
        let mut cluster = AzureCluster::new("foo", spec);
        cluster.metadata.namespace = Some("default".to_string());
        cluster
    }

    #[test]
    fn test_defaults_fill_network_names() {
        // Given: An AzureCluster with only a location, subscription and resource group
        let mut cluster = azure_cluster(AzureClusterSpec {
            location: "bar".to_string(),
            subscription_id: "baz".to_string(),
            resource_group: "bar".to_string(),
            ..Default::default()
        });

        // When: Applying defaults
        cluster.set_defaults();

        // Then: Vnet, subnets, security groups and route table follow the cluster name
        let network = &cluster.spec.network_spec;
        assert_eq!(cluster.spec.azure_environment.as_deref(), Some("AzurePublicCloud"));
        assert_eq!(network.vnet.name, "foo-vnet");
        assert_eq!(network.vnet.resource_group, "bar");
        assert_eq!(network.subnets.len(), 2);

        let node = cluster.node_subnet().unwrap();
        assert_eq!(node.name, "foo-node-subnet");
        assert_eq!(node.security_group.name, "foo-node-nsg");
        assert_eq!(node.route_table.name, "foo-node-routetable");

        let control_plane = &network.subnets[0];
        assert_eq!(control_plane.role, SubnetRole::ControlPlane);
        assert_eq!(control_plane.name, "foo-controlplane-subnet");
        assert_eq!(control_plane.security_group.name, "foo-controlplane-nsg");
    }

    #[test]
    fn test_defaults_keep_custom_vnet() {
        // Given: A custom vnet with named subnets
        let mut cluster = azure_cluster(AzureClusterSpec {
            resource_group: "bar".to_string(),
            network_spec: NetworkSpec {
                vnet: VnetSpec {
                    name: "custom-vnet".to_string(),
                    resource_group: "custom-vnet-resource-group".to_string(),
                },
                subnets: vec![SubnetSpec {
                    role: SubnetRole::Node,
                    name: "my-nodes".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        });

        // When: Applying defaults twice
        cluster.set_defaults();
        let once = cluster.clone();
        cluster.set_defaults();

        // Then: Custom names survive, missing ones are filled and defaulting is idempotent
        assert_eq!(cluster, once);
        assert_eq!(cluster.spec.network_spec.vnet.name, "custom-vnet");
        let node = cluster.node_subnet().unwrap();
        assert_eq!(node.name, "my-nodes");
        assert_eq!(node.security_group.name, "foo-node-nsg");
    }

    #[test]
    fn test_overrides_deserialize_from_manifest() {
        // Given: Overrides as they appear in an AzureCluster manifest
        let overrides: CloudProviderConfigOverrides = serde_json::from_value(serde_json::json!({
            "rateLimits": [{
                "name": "defaultRateLimit",
                "config": {"cloudProviderRateLimit": true, "cloudProviderRateLimitQPS": "1.2"}
            }],
            "backOffs": {"cloudProviderBackoff": true, "cloudProviderBackoffRetries": 1}
        }))
        .unwrap();

        // Then: Field names match the CRD
        let config = &overrides.rate_limits[0].config;
        assert!(config.cloud_provider_rate_limit);
        assert_eq!(config.cloud_provider_rate_limit_qps, Some(Quantity::from("1.2")));
        assert!(overrides.back_offs.cloud_provider_backoff);
        assert_eq!(overrides.back_offs.cloud_provider_backoff_retries, 1);
    }
}
