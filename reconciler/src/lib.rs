/*!

The `resource-reconciler` library converges real infrastructure with a declarative cluster
specification. Each kind of infrastructure object implements the [`Resource`] trait, a
[`Provider`] says which resources a specification calls for, and the [`Reconciler`] drives them
through a pass: observe, compare, apply, and render the results back into the specification.

!*/

mod cache;
pub mod compare;
mod converge;
pub mod error;
mod reconciler;
pub mod resource;

pub use cache::{Cached, ResourceCache};
pub use converge::{converge, teardown};
pub use error::{ClientError, DeleteReason, Error, PartialApply, PartialDestroy, Result};
pub use reconciler::{ReconcileState, Reconciler, ReconcilerConfig, DEFAULT_OPERATION_TIMEOUT};
pub use resource::{Operation, Provider, Resource, Snapshot};
