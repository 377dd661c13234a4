//! Finalizer names tying an identity or cluster resource to a particular cluster.
//!
//! Finalizer keys follow the label value limit of 63 characters after the `/`.
//!
//! ```rust
//! use capz_controllers::finalizer::cluster_identity_finalizer;
//! use capz_controllers::finalizer::finalizer_key;
//! use capz_controllers::finalizer::CLUSTER_FINALIZER;
//!
//! assert_eq!(
//!     finalizer_key(CLUSTER_FINALIZER, "foo", "bar"),
//!     "azurecluster.infrastructure.cluster.x-k8s.io/foo-bar"
//! );
//!
//! let long_name = "cluster-".repeat(10);
//! let finalizer = finalizer_key(CLUSTER_FINALIZER, "default", &long_name);
//! assert_eq!(finalizer, cluster_identity_finalizer(CLUSTER_FINALIZER, "default", &long_name));
//! assert_eq!(finalizer.split_once('/').map(|(_, key)| key.len()), Some(56));
//! ```

use sha2::Digest;
use sha2::Sha224;

/// Finalizer prefix for AzureCluster resources.
pub const CLUSTER_FINALIZER: &str = "azurecluster.infrastructure.cluster.x-k8s.io";

/// Finalizer prefix placed on an AzureClusterIdentity by the clusters using it.
pub const CLUSTER_IDENTITY_FINALIZER: &str = "azureclusteridentity.infrastructure.cluster.x-k8s.io";

const MAX_KEY_LEN: usize = 63;

/// `prefix/<hex sha224 of "namespace-name">`, always 56 characters after the `/`.
pub fn cluster_identity_finalizer(prefix: &str, cluster_namespace: &str, cluster_name: &str) -> String {
    let hash = Sha224::digest(format!("{cluster_namespace}-{cluster_name}").as_bytes());
    format!("{prefix}/{hash:x}")
}

/// `prefix/namespace-name`. Can exceed the key limit and is kept only to recognise
/// finalizers written before keys were hashed.
pub fn deprecated_cluster_identity_finalizer(prefix: &str, cluster_namespace: &str, cluster_name: &str) -> String {
    format!("{prefix}/{cluster_namespace}-{cluster_name}")
}

/// The readable `prefix/namespace-name` key when it fits, the hashed key otherwise.
pub fn finalizer_key(prefix: &str, namespace: &str, name: &str) -> String {
    if namespace.len() + 1 + name.len() <= MAX_KEY_LEN {
        deprecated_cluster_identity_finalizer(prefix, namespace, name)
    } else {
        cluster_identity_finalizer(prefix, namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_NAMESPACE: &str = "this-is-a-very-very-very-very-very-very-very-very-very-long-namespace-name";
    const LONG_NAME: &str = "this-is-a-very-very-very-very-very-very-very-very-very-long-cluster-name";

    fn key(finalizer: &str) -> &str {
        finalizer.split_once('/').map(|(_, key)| key).unwrap()
    }

    #[test]
    fn test_cluster_identity_finalizer_is_deterministic() {
        let cases = [
            ("foo", "bar", "azurecluster.infrastructure.cluster.x-k8s.io/48998dbcd8fb929369c78981cbfb6f26145ea0412e6e05a1423941a6"),
            (
                LONG_NAMESPACE,
                LONG_NAME,
                "azurecluster.infrastructure.cluster.x-k8s.io/557d064144d2b495db694dedc53c9a1e9bd8575bdf06b5b151972614",
            ),
        ];

        for (namespace, name, want) in cases {
            let got = cluster_identity_finalizer(CLUSTER_FINALIZER, namespace, name);
            assert_eq!(got, want);
            assert_eq!(cluster_identity_finalizer(CLUSTER_FINALIZER, namespace, name), got);
            assert!(key(&got).len() <= MAX_KEY_LEN);
        }
    }

    #[test]
    fn test_deprecated_cluster_identity_finalizer() {
        assert_eq!(
            deprecated_cluster_identity_finalizer(CLUSTER_FINALIZER, "foo", "bar"),
            "azurecluster.infrastructure.cluster.x-k8s.io/foo-bar"
        );
        assert_eq!(
            deprecated_cluster_identity_finalizer(CLUSTER_FINALIZER, LONG_NAMESPACE, LONG_NAME),
            format!("azurecluster.infrastructure.cluster.x-k8s.io/{LONG_NAMESPACE}-{LONG_NAME}")
        );
    }

    #[test]
    fn test_finalizer_key_switches_to_hash_past_the_limit() {
        // Given: A name that fills the key exactly and one that overflows it by one
        let namespace = "ns";
        let fits = "a".repeat(MAX_KEY_LEN - namespace.len() - 1);
        let overflows = "a".repeat(MAX_KEY_LEN - namespace.len());

        // When: Building keys
        let short = finalizer_key(CLUSTER_IDENTITY_FINALIZER, namespace, &fits);
        let long = finalizer_key(CLUSTER_IDENTITY_FINALIZER, namespace, &overflows);

        // Then: The readable form is kept exactly up to the limit, hashed beyond it
        assert_eq!(key(&short), format!("ns-{fits}"));
        assert_eq!(key(&short).len(), MAX_KEY_LEN);
        assert_eq!(long, cluster_identity_finalizer(CLUSTER_IDENTITY_FINALIZER, namespace, &overflows));
        assert!(key(&long).len() <= MAX_KEY_LEN);
        assert_eq!(finalizer_key(CLUSTER_FINALIZER, "foo", "bar"), "azurecluster.infrastructure.cluster.x-k8s.io/foo-bar");
    }
}
