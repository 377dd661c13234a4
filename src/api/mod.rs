//! Typed views of the Cluster API and Azure infrastructure resources.
//!
//! The controller does not own these CRDs; only the fields the mappers and the
//! cloud-provider config read are modelled, unknown fields are ignored on decode.

pub mod cluster;
pub mod infrastructure;
pub mod refs;

pub use cluster::*;
pub use infrastructure::*;
pub use refs::*;
