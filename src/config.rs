//! Process-level configuration: Azure credentials and feature gates.

use std::collections::BTreeMap;

use crate::api::DEFAULT_AZURE_CLOUD;
use crate::error::Error;
use crate::error::Result;

pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

/// Name of the Cluster API gate enabling MachinePools.
pub const MACHINE_POOL_GATE: &str = "MachinePool";

/// Service principal credentials written into the cloud-provider config.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AzureCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl AzureCredentials {
    /// Reads `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
    /// Unset variables are left empty; identity based configs do not need them.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        AzureCredentials {
            tenant_id: lookup(AZURE_TENANT_ID).unwrap_or_default(),
            client_id: lookup(AZURE_CLIENT_ID).unwrap_or_default(),
            client_secret: lookup(AZURE_CLIENT_SECRET).unwrap_or_default(),
        }
    }
}

// The secret must never end up in logs.
impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Feature gates, in the `--feature-gates` format `MachinePool=true,Other=false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureGates {
    gates: BTreeMap<String, bool>,
}

impl FeatureGates {
    pub fn parse(input: &str) -> Result<Self> {
        let mut gates = BTreeMap::new();
        for entry in input.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| Error::UserInput(format!("missing bool value for feature gate {entry}")))?;
            let value = value
                .trim()
                .parse::<bool>()
                .map_err(|_| Error::UserInput(format!("invalid value of {name}={value}")))?;
            gates.insert(name.trim().to_owned(), value);
        }
        Ok(FeatureGates { gates })
    }

    pub fn with(mut self, name: &str, enabled: bool) -> Self {
        self.gates.insert(name.to_owned(), enabled);
        self
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.gates.get(name).copied().unwrap_or(false)
    }

    pub fn machine_pool(&self) -> bool {
        self.enabled(MACHINE_POOL_GATE)
    }
}

/// Name of the Azure cloud the cluster lives in, as written into `cloud` of the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEnvironment(String);

impl CloudEnvironment {
    /// The named environment, or `AzurePublicCloud` when `name` is unset or empty.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.is_empty() => CloudEnvironment(name.to_owned()),
            _ => CloudEnvironment::default(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CloudEnvironment {
    fn default() -> Self {
        CloudEnvironment(DEFAULT_AZURE_CLOUD.to_owned())
    }
}
