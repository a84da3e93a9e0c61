/*!

The `resource` module defines the contract that every infrastructure resource implements so that
the [`Reconciler`](crate::Reconciler) can converge it, without knowing what kind of resource it is.

!*/

use crate::error::Result;
use cluster_model::Cluster;
use serde::{Deserialize, Serialize};
use serde_plain::derive_display_from_serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A point-in-time value describing one resource, either as it exists in the provider (actual) or as
/// the cluster specification says it should exist (expected). Both sides of a comparison are values
/// of the same `Snapshot` type.
///
/// Snapshots must serialize to a JSON object whose keys are the comparable fields. The
/// [`compare`](crate::compare) module relies on this.
pub trait Snapshot: Serialize + Clone + Debug + PartialEq + Send + Sync + 'static {
    /// The kind of resource this snapshot describes, e.g. `droplet`. Snapshots of different kinds
    /// are never comparable.
    fn kind(&self) -> &'static str;

    fn name(&self) -> &str;

    /// The provider-assigned identifier, empty when the object does not exist yet.
    fn cloud_id(&self) -> &str;

    /// Fields that only the provider can fill in after creation. When the expected snapshot leaves
    /// one of these unset it is not compared.
    fn generated_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// The same snapshot with its provider-assigned identifier cleared. This is what gets rendered
    /// after the remote object has been deleted.
    fn detached(self) -> Self;
}

/// You implement the [`Resource`] trait for every kind of infrastructure object that a provider can
/// manage: compute instances, networks, firewalls and so on. The [`Reconciler`](crate::Reconciler)
/// drives each resource through `expected`, `actual`, `apply`, `tag` and `render`, or through
/// `actual` and `delete` when tearing down.
///
/// ## Caching
///
/// `actual` and `expected` are called more than once per pass: by the reconciler for each phase and
/// by peers that need to read this resource's state. An implementation must remember the first
/// result of each and return it again without making remote calls until [`Resource::reset`] is
/// called. [`ResourceCache`](crate::ResourceCache) provides the bookkeeping.
///
/// ## Idempotence
///
/// `apply` must not touch the provider when [`compare::is_equal`](crate::compare::is_equal) finds
/// the actual and expected snapshots equal, and must return `expected` unchanged in that case.
///
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    type State: Snapshot;

    /// The kind of this resource, matching [`Snapshot::kind`] for its states.
    fn kind(&self) -> &'static str;

    fn name(&self) -> &str;

    /// A key that is unique among the resources of a cluster.
    fn id(&self) -> String {
        format!("{}/{}", self.kind(), self.name())
    }

    /// The ids of resources that must be reconciled before this one and deleted after it.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Forget the cached actual and expected snapshots so that the next pass observes again.
    fn reset(&mut self);

    /// Observe what currently exists in the provider. When nothing exists yet, return a snapshot
    /// that carries only what is known locally.
    async fn actual(&mut self, known: &Cluster) -> Result<Self::State>;

    /// Derive what should exist from the specification alone.
    async fn expected(&mut self, known: &Cluster) -> Result<Self::State>;

    /// Converge the provider from `actual` to `expected` and return a snapshot of what the
    /// provider reports after the change. `target` is the specification rendered so far in this
    /// pass, which includes the results of resources this one depends on.
    ///
    /// An implementation that removes the object `actual` points at and then fails must cache a
    /// detached actual snapshot before returning the error, so that the reconciler stops rendering
    /// the identifier of an object that no longer exists.
    async fn apply(
        &mut self,
        actual: &Self::State,
        expected: &Self::State,
        target: &Cluster,
    ) -> Result<Self::State>;

    /// Remove the remote object that `actual` describes.
    async fn delete(&mut self, actual: &Self::State, known: &Cluster) -> Result<()>;

    /// Fold `result` into `target` and return the updated specification. Rendering the same result
    /// twice must produce the same specification.
    fn render(&self, result: &Self::State, target: Cluster) -> Result<Cluster>;

    /// Label the remote object. Providers without tagging support may do nothing.
    async fn tag(&mut self, tags: &BTreeMap<String, String>) -> Result<()>;
}

/// A `Provider` knows which resources a cluster specification calls for. It is the registry the
/// [`Reconciler`](crate::Reconciler) uses during `init`.
pub trait Provider: Send + Sync {
    type Resource: Resource;

    /// Build the resources for `cluster` in declaration order. The reconciler reorders them by
    /// their declared dependencies.
    fn resources(&self, cluster: &Cluster) -> Result<Vec<Self::Resource>>;
}

/// The operations of the [`Resource`] contract, used to describe failures.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Actual,
    Expected,
    Apply,
    Delete,
    Render,
    Tag,
}

derive_display_from_serialize!(Operation);
