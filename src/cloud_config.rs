//! Renders the Azure cloud-provider configuration (`azure.json`) for a cluster and wraps it
//! in the Secret mounted by the control plane and worker nodes.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::api::AzureCluster;
use crate::api::BackOffConfig;
use crate::api::Cluster;
use crate::api::CloudProviderConfigOverrides;
use crate::api::RateLimitConfig;
use crate::api::SubnetSpec;
use crate::api::VmIdentity;
use crate::api::VnetSpec;
use crate::api::RESOURCE_LIFECYCLE_OWNED;
use crate::config::AzureCredentials;
use crate::config::CloudEnvironment;
use crate::config::FeatureGates;
use crate::error::Error;
use crate::error::Result;

pub const CONTROL_PLANE_CONFIG_KEY: &str = "control-plane-azure.json";
pub const WORKER_NODE_CONFIG_KEY: &str = "worker-node-azure.json";
/// Kept for nodes reading the legacy key; holds the control plane document.
pub const LEGACY_CONFIG_KEY: &str = "azure.json";

const VM_TYPE_VMSS: &str = "vmss";
const LOAD_BALANCER_SKU: &str = "Standard";
const MAXIMUM_LOAD_BALANCER_RULE_COUNT: i32 = 250;
const DEFAULT_RATE_LIMIT: &str = "defaultRateLimit";

/// Read access to the cluster-wide settings the cloud-provider config is derived from.
pub trait ClusterScoper {
    fn cluster_name(&self) -> &str;
    fn cloud_environment(&self) -> &str;
    fn tenant_id(&self) -> &str;
    fn client_id(&self) -> &str;
    fn client_secret(&self) -> &str;
    fn subscription_id(&self) -> &str;
    fn resource_group(&self) -> &str;
    fn location(&self) -> &str;
    fn vnet(&self) -> &VnetSpec;
    /// First subnet with the node role.
    fn node_subnet(&self) -> Option<&SubnetSpec>;
    /// Name of the node outbound load balancer, empty when there is none.
    fn outbound_lb_name(&self) -> &str;
    fn cloud_provider_config_overrides(&self) -> Option<&CloudProviderConfigOverrides>;
    fn machine_pools_enabled(&self) -> bool;
}

/// A [ClusterScoper] over a Cluster and its AzureCluster.
pub struct ClusterScope {
    cluster: Cluster,
    azure_cluster: AzureCluster,
    credentials: AzureCredentials,
    feature_gates: FeatureGates,
    cloud: CloudEnvironment,
}

impl ClusterScope {
    /// The AzureCluster is defaulted on construction.
    pub fn new(cluster: Cluster, mut azure_cluster: AzureCluster, credentials: AzureCredentials, feature_gates: FeatureGates) -> Self {
        azure_cluster.set_defaults();
        let cloud = CloudEnvironment::from_name(azure_cluster.spec.azure_environment.as_deref());
        ClusterScope {
            cluster,
            azure_cluster,
            credentials,
            feature_gates,
            cloud,
        }
    }
}

impl ClusterScoper for ClusterScope {
    fn cluster_name(&self) -> &str {
        self.cluster.metadata.name.as_deref().unwrap_or_default()
    }

    fn cloud_environment(&self) -> &str {
        self.cloud.as_str()
    }

    fn tenant_id(&self) -> &str {
        &self.credentials.tenant_id
    }

    fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    fn client_secret(&self) -> &str {
        &self.credentials.client_secret
    }

    fn subscription_id(&self) -> &str {
        &self.azure_cluster.spec.subscription_id
    }

    fn resource_group(&self) -> &str {
        &self.azure_cluster.spec.resource_group
    }

    fn location(&self) -> &str {
        &self.azure_cluster.spec.location
    }

    fn vnet(&self) -> &VnetSpec {
        &self.azure_cluster.spec.network_spec.vnet
    }

    fn node_subnet(&self) -> Option<&SubnetSpec> {
        self.azure_cluster.node_subnet()
    }

    fn outbound_lb_name(&self) -> &str {
        self.azure_cluster
            .spec
            .network_spec
            .node_outbound_lb
            .as_ref()
            .map_or("", |lb| lb.name.as_str())
    }

    fn cloud_provider_config_overrides(&self) -> Option<&CloudProviderConfigOverrides> {
        self.azure_cluster.spec.cloud_provider_config_overrides.as_ref()
    }

    fn machine_pools_enabled(&self) -> bool {
        self.feature_gates.machine_pool()
    }
}

/// The `azure.json` document read by the Azure cloud provider. Field order is the
/// rendered order.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudProviderConfig {
    pub cloud: String,
    pub tenant_id: String,
    pub subscription_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub aad_client_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub aad_client_secret: String,
    pub resource_group: String,
    pub security_group_name: String,
    pub security_group_resource_group: String,
    pub location: String,
    pub vm_type: String,
    pub vnet_name: String,
    pub vnet_resource_group: String,
    pub subnet_name: String,
    pub route_table_name: String,
    pub load_balancer_sku: String,
    pub load_balancer_name: String,
    pub maximum_load_balancer_rule_count: i32,
    pub use_managed_identity_extension: bool,
    pub use_instance_metadata: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub enable_vmss_flex_nodes: bool,
    #[serde(rename = "userAssignedIdentityID", skip_serializing_if = "String::is_empty")]
    pub user_assigned_identity_id: String,
    #[serde(flatten)]
    pub rate_limits: RateLimits,
    #[serde(flatten)]
    pub back_off: BackOff,
}

/// Cloud-provider wide rate limit followed by the per-resource overrides.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    #[serde(flatten)]
    pub default: RateLimitValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnets_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_table_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer_rate_limit: Option<RateLimitValues>,
    #[serde(rename = "publicIPAddressRateLimit", skip_serializing_if = "Option::is_none")]
    pub public_ip_address_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_machine_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_account_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_machine_scale_set_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_machine_sizes_rate_limit: Option<RateLimitValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_set_rate_limit: Option<RateLimitValues>,
}

impl RateLimits {
    /// Slot of a per-resource rate limit, `None` for names the cloud provider does not know.
    fn resource_slot(&mut self, name: &str) -> Option<&mut Option<RateLimitValues>> {
        let slot = match name {
            "routeRateLimit" => &mut self.route_rate_limit,
            "subnetsRateLimit" => &mut self.subnets_rate_limit,
            "interfaceRateLimit" => &mut self.interface_rate_limit,
            "routeTableRateLimit" => &mut self.route_table_rate_limit,
            "loadBalancerRateLimit" => &mut self.load_balancer_rate_limit,
            "publicIPAddressRateLimit" => &mut self.public_ip_address_rate_limit,
            "securityGroupRateLimit" => &mut self.security_group_rate_limit,
            "virtualMachineRateLimit" => &mut self.virtual_machine_rate_limit,
            "storageAccountRateLimit" => &mut self.storage_account_rate_limit,
            "diskRateLimit" => &mut self.disk_rate_limit,
            "snapshotRateLimit" => &mut self.snapshot_rate_limit,
            "virtualMachineScaleSetRateLimit" => &mut self.virtual_machine_scale_set_rate_limit,
            "virtualMachineSizesRateLimit" => &mut self.virtual_machine_sizes_rate_limit,
            "availabilitySetRateLimit" => &mut self.availability_set_rate_limit,
            _ => return None,
        };
        Some(slot)
    }
}

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitValues {
    #[serde(skip_serializing_if = "is_false")]
    pub cloud_provider_rate_limit: bool,
    #[serde(rename = "cloudProviderRateLimitQPS", skip_serializing_if = "is_zero_f32")]
    pub cloud_provider_rate_limit_qps: f32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub cloud_provider_rate_limit_bucket: i32,
    #[serde(rename = "cloudProviderRateLimitQPSWrite", skip_serializing_if = "is_zero_f32")]
    pub cloud_provider_rate_limit_qps_write: f32,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub cloud_provider_rate_limit_bucket_write: i32,
}

impl TryFrom<&RateLimitConfig> for RateLimitValues {
    type Error = Error;

    fn try_from(config: &RateLimitConfig) -> Result<Self> {
        Ok(RateLimitValues {
            cloud_provider_rate_limit: config.cloud_provider_rate_limit,
            cloud_provider_rate_limit_qps: config
                .cloud_provider_rate_limit_qps
                .as_ref()
                .map(|qps| qps.approximate_f32())
                .transpose()?
                .unwrap_or_default(),
            cloud_provider_rate_limit_bucket: config.cloud_provider_rate_limit_bucket,
            cloud_provider_rate_limit_qps_write: config
                .cloud_provider_rate_limit_qps_write
                .as_ref()
                .map(|qps| qps.approximate_f32())
                .transpose()?
                .unwrap_or_default(),
            cloud_provider_rate_limit_bucket_write: config.cloud_provider_rate_limit_bucket_write,
        })
    }
}

#[derive(Serialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackOff {
    #[serde(skip_serializing_if = "is_false")]
    pub cloud_provider_backoff: bool,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub cloud_provider_backoff_retries: i32,
    #[serde(skip_serializing_if = "is_zero_f64")]
    pub cloud_provider_backoff_exponent: f64,
    #[serde(skip_serializing_if = "is_zero_i32")]
    pub cloud_provider_backoff_duration: i32,
    #[serde(skip_serializing_if = "is_zero_f64")]
    pub cloud_provider_backoff_jitter: f64,
}

impl TryFrom<&BackOffConfig> for BackOff {
    type Error = Error;

    fn try_from(config: &BackOffConfig) -> Result<Self> {
        Ok(BackOff {
            cloud_provider_backoff: config.cloud_provider_backoff,
            cloud_provider_backoff_retries: config.cloud_provider_backoff_retries,
            cloud_provider_backoff_exponent: config
                .cloud_provider_backoff_exponent
                .as_ref()
                .map(|exponent| exponent.approximate_f64())
                .transpose()?
                .unwrap_or_default(),
            cloud_provider_backoff_duration: config.cloud_provider_backoff_duration,
            cloud_provider_backoff_jitter: config
                .cloud_provider_backoff_jitter
                .as_ref()
                .map(|jitter| jitter.approximate_f64())
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

fn is_zero_f32(value: &f32) -> bool {
    *value == 0.0
}

fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}

impl CloudProviderConfig {
    /// Service principal configuration derived from the cluster scope.
    pub fn from_scope(scope: &impl ClusterScoper) -> Self {
        let vnet = scope.vnet();
        let subnet = scope.node_subnet().cloned().unwrap_or_default();
        CloudProviderConfig {
            cloud: scope.cloud_environment().to_owned(),
            tenant_id: scope.tenant_id().to_owned(),
            subscription_id: scope.subscription_id().to_owned(),
            aad_client_id: scope.client_id().to_owned(),
            aad_client_secret: scope.client_secret().to_owned(),
            resource_group: scope.resource_group().to_owned(),
            security_group_name: subnet.security_group.name,
            security_group_resource_group: vnet.resource_group.clone(),
            location: scope.location().to_owned(),
            vm_type: VM_TYPE_VMSS.to_owned(),
            vnet_name: vnet.name.clone(),
            vnet_resource_group: vnet.resource_group.clone(),
            subnet_name: subnet.name,
            route_table_name: subnet.route_table.name,
            load_balancer_sku: LOAD_BALANCER_SKU.to_owned(),
            load_balancer_name: scope.outbound_lb_name().to_owned(),
            maximum_load_balancer_rule_count: MAXIMUM_LOAD_BALANCER_RULE_COUNT,
            use_managed_identity_extension: false,
            use_instance_metadata: true,
            ..Default::default()
        }
    }

    /// Switches to the VM's managed identity; the user-assigned identity is used when
    /// `identity_id` is not empty.
    fn use_managed_identity(&mut self, identity_id: &str) {
        self.aad_client_id.clear();
        self.aad_client_secret.clear();
        self.use_managed_identity_extension = true;
        self.user_assigned_identity_id = identity_id.to_owned();
    }

    /// Applies the rate limits and back-offs configured on the AzureCluster.
    pub fn apply_overrides(&mut self, overrides: &CloudProviderConfigOverrides) -> Result<()> {
        for rate_limit in &overrides.rate_limits {
            let values = RateLimitValues::try_from(&rate_limit.config)?;
            if rate_limit.name == DEFAULT_RATE_LIMIT {
                self.rate_limits.default = values;
            } else if let Some(slot) = self.rate_limits.resource_slot(&rate_limit.name) {
                *slot = Some(values);
            } else {
                log::warn!(name = rate_limit.name.as_str(); "skipping unknown rate limit");
            }
        }
        self.back_off = BackOff::try_from(&overrides.back_offs)?;
        Ok(())
    }

    /// Renders the document with four-space indentation.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut serializer)?;
        Ok(buf)
    }
}

/// Control plane and worker node configs for the given identity.
fn new_cloud_provider_configs(
    scope: &impl ClusterScoper,
    identity_type: VmIdentity,
    identity_id: &str,
) -> Result<(CloudProviderConfig, CloudProviderConfig)> {
    let mut config = CloudProviderConfig::from_scope(scope);
    match identity_type {
        VmIdentity::None => {}
        VmIdentity::SystemAssigned => config.use_managed_identity(""),
        VmIdentity::UserAssigned => {
            if identity_id.is_empty() {
                return Err(Error::UserAssignedIdentityMissing);
            }
            config.use_managed_identity(identity_id);
        }
    }

    if let Some(overrides) = scope.cloud_provider_config_overrides() {
        config.apply_overrides(overrides)?;
    }
    if scope.machine_pools_enabled() && config.vm_type == VM_TYPE_VMSS {
        config.enable_vmss_flex_nodes = true;
    }

    Ok((config.clone(), config))
}

/// Builds the `<owner_name>-azure-json` Secret holding the cloud-provider config of the
/// owner's nodes. The Secret is labelled as owned by the cluster and is not persisted here.
pub fn get_cloud_provider_secret(
    scope: &impl ClusterScoper,
    namespace: &str,
    owner_name: &str,
    owner_ref: OwnerReference,
    identity_type: VmIdentity,
    identity_id: &str,
) -> Result<Secret> {
    let (control_plane_config, worker_node_config) = new_cloud_provider_configs(scope, identity_type, identity_id)?;
    let control_plane_json = control_plane_config.to_pretty_json()?;
    let worker_node_json = worker_node_config.to_pretty_json()?;

    Ok(Secret {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_owned()),
            name: Some(format!("{owner_name}-azure-json")),
            labels: Some(BTreeMap::from([(
                scope.cluster_name().to_owned(),
                RESOURCE_LIFECYCLE_OWNED.to_owned(),
            )])),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (CONTROL_PLANE_CONFIG_KEY.to_owned(), ByteString(control_plane_json.clone())),
            (WORKER_NODE_CONFIG_KEY.to_owned(), ByteString(worker_node_json)),
            (LEGACY_CONFIG_KEY.to_owned(), ByteString(control_plane_json)),
        ])),
        ..Default::default()
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::AzureClusterSpec;
    use crate::api::ClusterSpec;
    use crate::api::NetworkSpec;
    use crate::api::RateLimitSpec;
    use crate::api::SubnetRole;
    use crate::config::MACHINE_POOL_GATE;
    use crate::quantity::Quantity;
    use kube::ResourceExt;

    pub(crate) fn new_cluster(name: &str) -> Cluster {
        let mut cluster = Cluster::new(name, ClusterSpec::default());
        cluster.metadata.namespace = Some("default".to_string());
        cluster
    }

    pub(crate) fn new_azure_cluster(location: &str) -> AzureCluster {
        let mut azure_cluster = AzureCluster::new(
            "foo",
            AzureClusterSpec {
                location: location.to_string(),
                subscription_id: "baz".to_string(),
                resource_group: "bar".to_string(),
                ..Default::default()
            },
        );
        azure_cluster.metadata.namespace = Some("default".to_string());
        azure_cluster
    }

    fn new_azure_cluster_with_custom_vnet(location: &str) -> AzureCluster {
        let mut azure_cluster = new_azure_cluster(location);
        azure_cluster.spec.network_spec = NetworkSpec {
            vnet: VnetSpec {
                name: "custom-vnet".to_string(),
                resource_group: "custom-vnet-resource-group".to_string(),
            },
            subnets: vec![
                SubnetSpec {
                    role: SubnetRole::ControlPlane,
                    name: "foo-controlplane-subnet".to_string(),
                    ..Default::default()
                },
                SubnetSpec {
                    role: SubnetRole::Node,
                    name: "foo-node-subnet".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        azure_cluster
    }

    fn with_rate_limits(mut azure_cluster: AzureCluster) -> AzureCluster {
        azure_cluster.spec.cloud_provider_config_overrides = Some(CloudProviderConfigOverrides {
            rate_limits: vec![
                RateLimitSpec {
                    name: "defaultRateLimit".to_string(),
                    config: RateLimitConfig {
                        cloud_provider_rate_limit: true,
                        cloud_provider_rate_limit_qps: Some(Quantity::from("1.2")),
                        ..Default::default()
                    },
                },
                RateLimitSpec {
                    name: "loadBalancerRateLimit".to_string(),
                    config: RateLimitConfig {
                        cloud_provider_rate_limit_bucket: 10,
                        ..Default::default()
                    },
                },
            ],
            ..Default::default()
        });
        azure_cluster
    }

    fn with_back_off_config(mut azure_cluster: AzureCluster) -> AzureCluster {
        azure_cluster.spec.cloud_provider_config_overrides = Some(CloudProviderConfigOverrides {
            back_offs: BackOffConfig {
                cloud_provider_backoff: true,
                cloud_provider_backoff_retries: 1,
                cloud_provider_backoff_exponent: Some(Quantity::from("1.2")),
                cloud_provider_backoff_duration: 60,
                cloud_provider_backoff_jitter: Some(Quantity::from("1.2")),
            },
            ..Default::default()
        });
        azure_cluster
    }

    pub(crate) fn credentials() -> AzureCredentials {
        AzureCredentials {
            tenant_id: "fooTenant".to_string(),
            client_id: "fooClient".to_string(),
            client_secret: "fooSecret".to_string(),
        }
    }

    fn cluster_scope(azure_cluster: AzureCluster, machine_pools: bool) -> ClusterScope {
        let gates = FeatureGates::default().with(MACHINE_POOL_GATE, machine_pools);
        ClusterScope::new(new_cluster("foo"), azure_cluster, credentials(), gates)
    }

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "infrastructure.cluster.x-k8s.io/v1beta1".to_string(),
            kind: "AzureMachine".to_string(),
            name: "azureMachineName".to_string(),
            ..Default::default()
        }
    }

    fn document(secret: &Secret, key: &str) -> String {
        let data = secret.data.as_ref().unwrap();
        String::from_utf8(data[key].0.clone()).unwrap()
    }

    const SP_CLOUD_CONFIG: &str = r#"{
    "cloud": "AzurePublicCloud",
    "tenantId": "fooTenant",
    "subscriptionId": "baz",
    "aadClientId": "fooClient",
    "aadClientSecret": "fooSecret",
    "resourceGroup": "bar",
    "securityGroupName": "foo-node-nsg",
    "securityGroupResourceGroup": "bar",
    "location": "bar",
    "vmType": "vmss",
    "vnetName": "foo-vnet",
    "vnetResourceGroup": "bar",
    "subnetName": "foo-node-subnet",
    "routeTableName": "foo-node-routetable",
    "loadBalancerSku": "Standard",
    "loadBalancerName": "",
    "maximumLoadBalancerRuleCount": 250,
    "useManagedIdentityExtension": false,
    "useInstanceMetadata": true
}"#;

    const SYSTEM_ASSIGNED_CLOUD_CONFIG: &str = r#"{
    "cloud": "AzurePublicCloud",
    "tenantId": "fooTenant",
    "subscriptionId": "baz",
    "resourceGroup": "bar",
    "securityGroupName": "foo-node-nsg",
    "securityGroupResourceGroup": "bar",
    "location": "bar",
    "vmType": "vmss",
    "vnetName": "foo-vnet",
    "vnetResourceGroup": "bar",
    "subnetName": "foo-node-subnet",
    "routeTableName": "foo-node-routetable",
    "loadBalancerSku": "Standard",
    "loadBalancerName": "",
    "maximumLoadBalancerRuleCount": 250,
    "useManagedIdentityExtension": true,
    "useInstanceMetadata": true
}"#;

    const USER_ASSIGNED_CLOUD_CONFIG: &str = r#"{
    "cloud": "AzurePublicCloud",
    "tenantId": "fooTenant",
    "subscriptionId": "baz",
    "resourceGroup": "bar",
    "securityGroupName": "foo-node-nsg",
    "securityGroupResourceGroup": "bar",
    "location": "bar",
    "vmType": "vmss",
    "vnetName": "foo-vnet",
    "vnetResourceGroup": "bar",
    "subnetName": "foo-node-subnet",
    "routeTableName": "foo-node-routetable",
    "loadBalancerSku": "Standard",
    "loadBalancerName": "",
    "maximumLoadBalancerRuleCount": 250,
    "useManagedIdentityExtension": true,
    "useInstanceMetadata": true,
    "userAssignedIdentityID": "foobar"
}"#;

    const SP_CUSTOM_VNET_CLOUD_CONFIG: &str = r#"{
    "cloud": "AzurePublicCloud",
    "tenantId": "fooTenant",
    "subscriptionId": "baz",
    "aadClientId": "fooClient",
    "aadClientSecret": "fooSecret",
    "resourceGroup": "bar",
    "securityGroupName": "foo-node-nsg",
    "securityGroupResourceGroup": "custom-vnet-resource-group",
    "location": "bar",
    "vmType": "vmss",
    "vnetName": "custom-vnet",
    "vnetResourceGroup": "custom-vnet-resource-group",
    "subnetName": "foo-node-subnet",
    "routeTableName": "foo-node-routetable",
    "loadBalancerSku": "Standard",
    "loadBalancerName": "",
    "maximumLoadBalancerRuleCount": 250,
    "useManagedIdentityExtension": false,
    "useInstanceMetadata": true
}"#;

    const RATE_LIMITS_CLOUD_CONFIG: &str = r#"{
    "cloud": "AzurePublicCloud",
    "tenantId": "fooTenant",
    "subscriptionId": "baz",
    "aadClientId": "fooClient",
    "aadClientSecret": "fooSecret",
    "resourceGroup": "bar",
    "securityGroupName": "foo-node-nsg",
    "securityGroupResourceGroup": "bar",
    "location": "bar",
    "vmType": "vmss",
    "vnetName": "foo-vnet",
    "vnetResourceGroup": "bar",
    "subnetName": "foo-node-subnet",
    "routeTableName": "foo-node-routetable",
    "loadBalancerSku": "Standard",
    "loadBalancerName": "",
    "maximumLoadBalancerRuleCount": 250,
    "useManagedIdentityExtension": false,
    "useInstanceMetadata": true,
    "cloudProviderRateLimit": true,
    "cloudProviderRateLimitQPS": 1.2,
    "loadBalancerRateLimit": {
        "cloudProviderRateLimitBucket": 10
    }
}"#;

    const BACK_OFF_CLOUD_CONFIG: &str = r#"{
    "cloud": "AzurePublicCloud",
    "tenantId": "fooTenant",
    "subscriptionId": "baz",
    "aadClientId": "fooClient",
    "aadClientSecret": "fooSecret",
    "resourceGroup": "bar",
    "securityGroupName": "foo-node-nsg",
    "securityGroupResourceGroup": "bar",
    "location": "bar",
    "vmType": "vmss",
    "vnetName": "foo-vnet",
    "vnetResourceGroup": "bar",
    "subnetName": "foo-node-subnet",
    "routeTableName": "foo-node-routetable",
    "loadBalancerSku": "Standard",
    "loadBalancerName": "",
    "maximumLoadBalancerRuleCount": 250,
    "useManagedIdentityExtension": false,
    "useInstanceMetadata": true,
    "cloudProviderBackoff": true,
    "cloudProviderBackoffRetries": 1,
    "cloudProviderBackoffExponent": 1.2000000000000002,
    "cloudProviderBackoffDuration": 60,
    "cloudProviderBackoffJitter": 1.2000000000000002
}"#;

    const VMSS_CLOUD_CONFIG: &str = r#"{
    "cloud": "AzurePublicCloud",
    "tenantId": "fooTenant",
    "subscriptionId": "baz",
    "aadClientId": "fooClient",
    "aadClientSecret": "fooSecret",
    "resourceGroup": "bar",
    "securityGroupName": "foo-node-nsg",
    "securityGroupResourceGroup": "bar",
    "location": "bar",
    "vmType": "vmss",
    "vnetName": "foo-vnet",
    "vnetResourceGroup": "bar",
    "subnetName": "foo-node-subnet",
    "routeTableName": "foo-node-routetable",
    "loadBalancerSku": "Standard",
    "loadBalancerName": "",
    "maximumLoadBalancerRuleCount": 250,
    "useManagedIdentityExtension": false,
    "useInstanceMetadata": true,
    "enableVmssFlexNodes": true
}"#;

    #[test]
    fn test_get_cloud_provider_secret_golden_documents() {
        let cases = [
            ("serviceprincipal", new_azure_cluster("bar"), VmIdentity::None, "", false, SP_CLOUD_CONFIG),
            (
                "system-assigned-identity",
                new_azure_cluster("bar"),
                VmIdentity::SystemAssigned,
                "",
                false,
                SYSTEM_ASSIGNED_CLOUD_CONFIG,
            ),
            (
                "user-assigned-identity",
                new_azure_cluster("bar"),
                VmIdentity::UserAssigned,
                "foobar",
                false,
                USER_ASSIGNED_CLOUD_CONFIG,
            ),
            (
                "serviceprincipal with custom vnet",
                new_azure_cluster_with_custom_vnet("bar"),
                VmIdentity::None,
                "",
                false,
                SP_CUSTOM_VNET_CLOUD_CONFIG,
            ),
            (
                "with rate limits",
                with_rate_limits(new_azure_cluster("bar")),
                VmIdentity::None,
                "",
                false,
                RATE_LIMITS_CLOUD_CONFIG,
            ),
            (
                "with back-off config",
                with_back_off_config(new_azure_cluster("bar")),
                VmIdentity::None,
                "",
                false,
                BACK_OFF_CLOUD_CONFIG,
            ),
            ("with machinepools", new_azure_cluster("bar"), VmIdentity::None, "", true, VMSS_CLOUD_CONFIG),
        ];

        for (name, azure_cluster, identity_type, identity_id, machine_pools, want) in cases {
            // Given: A defaulted cluster scope
            let scope = cluster_scope(azure_cluster, machine_pools);

            // When: Building the Secret
            let secret = get_cloud_provider_secret(&scope, "default", "azureMachineName", owner(), identity_type, identity_id)
                .unwrap_or_else(|err| panic!("{name}: {err}"));

            // Then: Both documents match and the legacy key mirrors the control plane
            assert_eq!(document(&secret, CONTROL_PLANE_CONFIG_KEY), want, "{name}: control plane");
            assert_eq!(document(&secret, WORKER_NODE_CONFIG_KEY), want, "{name}: worker node");
            assert_eq!(document(&secret, LEGACY_CONFIG_KEY), want, "{name}: azure.json");
        }
    }

    #[test]
    fn test_secret_metadata() {
        // Given: A cluster named foo
        let scope = cluster_scope(new_azure_cluster("bar"), false);

        // When: Building the Secret for an AzureMachine
        let secret = get_cloud_provider_secret(&scope, "default", "azureMachineName", owner(), VmIdentity::None, "").unwrap();

        // Then: Name, namespace, ownership label and owner reference are set
        assert_eq!(secret.name_any(), "azureMachineName-azure-json");
        assert_eq!(secret.namespace().as_deref(), Some("default"));
        assert_eq!(secret.labels().get("foo").map(String::as_str), Some("owned"));
        assert_eq!(secret.owner_references(), &[owner()]);
    }

    #[test]
    fn test_user_assigned_identity_requires_an_id() {
        let scope = cluster_scope(new_azure_cluster("bar"), false);

        let result = get_cloud_provider_secret(&scope, "default", "azureMachineName", owner(), VmIdentity::UserAssigned, "");

        assert!(matches!(result, Err(Error::UserAssignedIdentityMissing)));
    }

    #[test]
    fn test_unknown_rate_limits_are_skipped() {
        // Given: Overrides naming a rate limit the cloud provider does not have
        let mut config = CloudProviderConfig::default();
        let overrides = CloudProviderConfigOverrides {
            rate_limits: vec![RateLimitSpec {
                name: "teapotRateLimit".to_string(),
                config: RateLimitConfig {
                    cloud_provider_rate_limit: true,
                    ..Default::default()
                },
            }],
            ..Default::default()
        };

        // When: Applying them
        config.apply_overrides(&overrides).unwrap();

        // Then: Nothing changes
        assert_eq!(config.rate_limits, RateLimits::default());
    }

    #[test]
    fn test_invalid_quantity_fails_the_build() {
        // Given: A back-off exponent that is not a quantity
        let mut azure_cluster = with_back_off_config(new_azure_cluster("bar"));
        if let Some(overrides) = azure_cluster.spec.cloud_provider_config_overrides.as_mut() {
            overrides.back_offs.cloud_provider_backoff_exponent = Some(Quantity::from("one point two"));
        }
        let scope = cluster_scope(azure_cluster, false);

        // Then: No Secret is produced
        let result = get_cloud_provider_secret(&scope, "default", "azureMachineName", owner(), VmIdentity::None, "");
        assert!(matches!(result, Err(Error::InvalidQuantity(_))));
    }
}
