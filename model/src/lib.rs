/*!

This library provides the cluster specification: the declarative description of the
infrastructure that a cluster needs, along with validation and a state store that persists
specifications between reconciliation passes.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use cidr::Cidr;
pub use cluster::{
    CloudProvider, Cluster, Firewall, KubernetesApi, Network, NetworkType, Rule, ServerPool,
    ServerPoolType, Ssh, Subnet,
};
pub use error::{Error, Result};
pub use store::{ClusterStore, FileSystemStore};

mod cidr;
mod cluster;
pub mod constants;
mod error;
mod store;
mod validate;
