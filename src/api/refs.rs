//! Object references, group-kinds and owner lookups shared by the CAPI and Azure kinds.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::GroupVersionKind;
use kube::Resource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use super::cluster::CLUSTER_API_GROUP;

/// Reference to another object, as embedded in CAPI specs (`infrastructureRef`,
/// `controlPlaneRef`). Unset fields deserialize to empty strings.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectReference {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl ObjectReference {
    pub fn new(gvk: &GroupVersionKind, namespace: &str, name: &str) -> Self {
        ObjectReference {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            name: name.to_owned(),
            namespace: namespace.to_owned(),
        }
    }

    /// Group-kind of the referenced object. A malformed apiVersion leaves only the kind.
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(api_group(&self.api_version).unwrap_or_default(), &self.kind)
    }
}

/// A (group, kind) pair identifying a resource type independent of its version.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        GroupKind {
            group: group.into(),
            kind: kind.into(),
        }
    }

    pub fn of<K>() -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        GroupKind::new(K::group(&()), K::kind(&()))
    }
}

impl From<&GroupVersionKind> for GroupKind {
    fn from(gvk: &GroupVersionKind) -> Self {
        GroupKind::new(gvk.group.as_str(), gvk.kind.as_str())
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Full group-version-kind of a statically typed resource.
pub fn gvk_of<K>() -> GroupVersionKind
where
    K: Resource<DynamicType = ()>,
{
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

/// Extracts the group from an apiVersion. `v1` is the core group, an empty
/// apiVersion yields the empty group, more than one `/` is malformed.
pub fn api_group(api_version: &str) -> Option<&str> {
    let mut parts = api_version.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), None, None) => Some(""),
        (Some(group), Some(_), None) => Some(group),
        _ => None,
    }
}

/// Name of the CAPI `Cluster` listed among the object's owner references.
pub fn owner_cluster_name(meta: &ObjectMeta) -> Option<&str> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|owner| owner.kind == "Cluster" && api_group(&owner.api_version) == Some(CLUSTER_API_GROUP))
        .map(|owner| owner.name.as_str())
}
