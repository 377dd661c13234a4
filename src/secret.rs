//! Create-or-update of the cloud-provider config Secret, never touching Secrets the
//! cluster does not own.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::api::api_group;
use crate::api::RESOURCE_LIFECYCLE_OWNED;
use crate::error::Result;
use crate::k8s::SecretRepository;
use crate::TryResource;

/// Owner references point at the same object when group, kind, name and uid agree.
/// A reference to a recreated owner carries a stale uid and does not match.
fn has_owner_ref(references: &[OwnerReference], owner: &OwnerReference) -> bool {
    references.iter().any(|reference| {
        reference.kind == owner.kind
            && reference.name == owner.name
            && reference.uid == owner.uid
            && api_group(&reference.api_version) == api_group(&owner.api_version)
    })
}

/// Persists `new`:
///
/// - absent: created. Losing a creation race to another writer is not an error.
/// - present without the `<cluster_name>: owned` label: left untouched.
/// - present and owned: `owner` is appended if missing and the data replaced if different;
///   the Secret is only written when one of them changed.
pub async fn reconcile_azure_secret(
    repo: &impl SecretRepository,
    owner: &OwnerReference,
    new: &Secret,
    cluster_name: &str,
) -> Result<()> {
    let namespace = new.try_namespace()?;
    let name = new.try_name()?;

    let Some(mut old) = repo.get_secret(&namespace, name).await? else {
        log::debug!(namespace = namespace.as_str(), name = name; "creating cloud provider config secret");
        return match repo.create_secret(new).await {
            Err(err) if err.is_already_exists() => {
                log::debug!(namespace = namespace.as_str(), name = name; "secret was created concurrently");
                Ok(())
            }
            result => result,
        };
    };

    let owned = old
        .labels()
        .get(cluster_name)
        .is_some_and(|value| value == RESOURCE_LIFECYCLE_OWNED);
    if !owned {
        log::debug!(namespace = namespace.as_str(), name = name; "returning early from secret reconcile, user provided secret already exists");
        return Ok(());
    }

    let has_owner = has_owner_ref(old.owner_references(), owner);
    let has_data = old.data == new.data;
    if has_owner && has_data {
        log::debug!(namespace = namespace.as_str(), name = name; "returning early from secret reconcile, no update needed");
        return Ok(());
    }

    if !has_owner {
        old.owner_references_mut().push(owner.clone());
    }
    if !has_data {
        old.data = new.data.clone();
    }

    log::info!(namespace = namespace.as_str(), name = name, ownerUpdated = !has_owner, dataUpdated = !has_data; "updating cloud provider config secret");
    repo.replace_secret(&old).await
}
