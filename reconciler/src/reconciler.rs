/*!

The `reconciler` module defines the `Reconciler` object which drives a dependency-ordered collection
of resources through a convergence pass.

!*/

use crate::error::{self, PartialApply, PartialDestroy, Result};
use crate::resource::{Operation, Provider, Resource, Snapshot};
use cluster_model::Cluster;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_plain::derive_display_from_serialize;
use snafu::{ensure, OptionExt};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::future::Future;
use std::time::Duration;

/// The default time that a single resource operation may take.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(600);

/// Settings that govern a reconciliation pass.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcilerConfig {
    /// How long any one resource operation may run before it fails with `Timeout`. `None` waits
    /// indefinitely.
    pub operation_timeout: Option<Duration>,

    /// Whether a failure to tag a resource stops the pass. When `false` the failure is logged and
    /// the pass continues.
    pub tag_errors_are_fatal: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Some(DEFAULT_OPERATION_TIMEOUT),
            tag_errors_are_fatal: true,
        }
    }
}

/// Where a [`Reconciler`] is in its pass.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileState {
    /// `init` has not been called.
    Created,
    Initialized,
    ExpectedComputed,
    ActualComputed,
    /// A `reconcile` call stopped part way through.
    Applied,
    Rendered,
    Destroyed,
}

derive_display_from_serialize!(ReconcileState);

/// The `Reconciler` converges the infrastructure of one cluster with its specification. A pass runs
/// `init`, then `get_expected` and `get_actual`, then either `reconcile` or `destroy`.
///
/// Resources are handled one at a time in dependency order, because a resource may read the state
/// that earlier resources have rendered into the specification.
pub struct Reconciler<P>
where
    P: Provider,
{
    /// The registry that knows which resources the specification calls for.
    provider: P,

    config: ReconcilerConfig,

    /// The specification this pass started from.
    known: Cluster,

    /// Ordered so that every resource comes after the resources it depends on.
    resources: Vec<P::Resource>,

    state: ReconcileState,
    expected_computed: bool,
    actual_computed: bool,
}

impl<P> Reconciler<P>
where
    P: Provider,
{
    pub fn new(provider: P, known: Cluster, config: ReconcilerConfig) -> Self {
        Self {
            provider,
            config,
            known,
            resources: Vec::new(),
            state: ReconcileState::Created,
            expected_computed: false,
            actual_computed: false,
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn known(&self) -> &Cluster {
        &self.known
    }

    /// The ids of the resources in the order they are reconciled.
    pub fn resource_ids(&self) -> Vec<String> {
        self.resources.iter().map(|r| r.id()).collect()
    }

    pub fn resources(&self) -> &[P::Resource] {
        &self.resources
    }

    /// Build the resource collection from the specification and order it so that producers come
    /// before their consumers. Calling `init` again starts a fresh pass.
    pub fn init(&mut self) -> Result<()> {
        let declared = self.provider.resources(&self.known)?;
        self.resources = dependency_order(declared)?;
        for resource in &mut self.resources {
            resource.reset();
        }
        self.state = ReconcileState::Initialized;
        self.expected_computed = false;
        self.actual_computed = false;
        info!(
            "Initialized {} resource(s) for cluster '{}'",
            self.resources.len(),
            self.known.name
        );
        debug!("Resource order: {:?}", self.resource_ids());
        Ok(())
    }

    /// Derive the expected state of every resource, rendering each into the specification before
    /// the next resource reads it. Stops at the first error.
    pub async fn get_expected(&mut self) -> Result<Cluster> {
        self.ensure_initialized("compute expected state")?;
        let timeout = self.config.operation_timeout;
        let mut expected = self.known.clone();
        for resource in &mut self.resources {
            let id = resource.id();
            let state = timed(
                timeout,
                &id,
                Operation::Expected,
                resource.expected(&expected),
            )
            .await?;
            expected = resource.render(&state, expected)?;
        }
        self.expected_computed = true;
        self.state = ReconcileState::ExpectedComputed;
        Ok(expected)
    }

    /// Observe the actual state of every resource, rendering each into the specification before the
    /// next resource reads it. Stops at the first error.
    pub async fn get_actual(&mut self) -> Result<Cluster> {
        self.ensure_initialized("observe actual state")?;
        let timeout = self.config.operation_timeout;
        let mut actual = self.known.clone();
        for resource in &mut self.resources {
            let id = resource.id();
            let state =
                timed(timeout, &id, Operation::Actual, resource.actual(&actual)).await?;
            actual = resource.render(&state, actual)?;
        }
        self.actual_computed = true;
        self.state = ReconcileState::ActualComputed;
        Ok(actual)
    }

    /// Apply, tag and render every resource in order. If a resource fails, the remaining resources
    /// are skipped and the specification rendered so far is returned with the error.
    pub async fn reconcile(
        &mut self,
        actual: &Cluster,
        expected: &Cluster,
    ) -> std::result::Result<Cluster, PartialApply> {
        let mut rendered = self.known.clone();
        if let Err(error) = self.ensure_observed() {
            return Err(PartialApply { rendered, error });
        }
        let tags = self.known.tag_set();
        for resource in &mut self.resources {
            match reconcile_resource(resource, actual, expected, &rendered, &tags, &self.config)
                .await
            {
                Ok(next) => rendered = next,
                Err(partial) => {
                    error!("Unable to reconcile '{}': {}", resource.id(), partial.error);
                    self.state = ReconcileState::Applied;
                    return Err(partial);
                }
            }
        }
        self.state = ReconcileState::Rendered;
        info!("Reconciled cluster '{}'", rendered.name);
        Ok(rendered)
    }

    /// Delete every resource in reverse dependency order. A failure does not stop the teardown;
    /// every resource is attempted and all failures are reported together.
    pub async fn destroy(&mut self) -> std::result::Result<Cluster, PartialDestroy> {
        let mut rendered = self.known.clone();
        if let Err(e) = self.ensure_initialized("destroy") {
            return Err(PartialDestroy {
                rendered,
                errors: vec![e],
            });
        }
        let timeout = self.config.operation_timeout;
        let known = &self.known;
        let mut errors = Vec::new();
        for resource in self.resources.iter_mut().rev() {
            match destroy_resource(resource, known, &rendered, timeout).await {
                Ok(next) => rendered = next,
                Err(e) => {
                    error!("Unable to destroy '{}': {}", resource.id(), e);
                    errors.push(e);
                }
            }
        }
        self.state = ReconcileState::Destroyed;
        if errors.is_empty() {
            info!("Destroyed cluster '{}'", rendered.name);
            Ok(rendered)
        } else {
            Err(PartialDestroy { rendered, errors })
        }
    }

    fn ensure_initialized(&self, operation: &str) -> Result<()> {
        ensure!(
            self.state != ReconcileState::Created,
            error::InvalidStateSnafu {
                operation,
                state: self.state,
            }
        );
        Ok(())
    }

    fn ensure_observed(&self) -> Result<()> {
        ensure!(
            self.expected_computed && self.actual_computed,
            error::InvalidStateSnafu {
                operation: "reconcile",
                state: self.state,
            }
        );
        Ok(())
    }
}

/// Converge one resource and return `rendered` with its result folded in. `actual` and `expected`
/// are served from the resource's cache when the observation phases already ran.
async fn reconcile_resource<R>(
    resource: &mut R,
    actual: &Cluster,
    expected: &Cluster,
    rendered: &Cluster,
    tags: &BTreeMap<String, String>,
    config: &ReconcilerConfig,
) -> std::result::Result<Cluster, PartialApply>
where
    R: Resource,
{
    let id = resource.id();
    let timeout = config.operation_timeout;
    let stopped = |error| PartialApply {
        rendered: rendered.clone(),
        error,
    };
    let observed = timed(timeout, &id, Operation::Actual, resource.actual(actual))
        .await
        .map_err(stopped)?;
    let wanted = timed(timeout, &id, Operation::Expected, resource.expected(expected))
        .await
        .map_err(stopped)?;
    let applied = timed(
        timeout,
        &id,
        Operation::Apply,
        resource.apply(&observed, &wanted, rendered),
    )
    .await;
    let applied = match applied {
        Ok(applied) => applied,
        Err(error) => {
            let rendered = forget_removed(resource, &observed, wanted, actual, rendered).await;
            return Err(PartialApply { rendered, error });
        }
    };
    if let Err(e) = timed(timeout, &id, Operation::Tag, resource.tag(tags)).await {
        if config.tag_errors_are_fatal {
            return Err(stopped(e));
        }
        warn!("Unable to tag '{}', continuing: {}", id, e);
    }
    resource.render(&applied, rendered.clone()).map_err(stopped)
}

/// After a failed `apply`, the resource's cached actual state tells whether the object that
/// `observed` points at was removed. If so the expected state is rendered without an identifier, so
/// that the stored specification no longer names an object that is gone and the next pass creates
/// it again.
async fn forget_removed<R>(
    resource: &mut R,
    observed: &R::State,
    wanted: R::State,
    actual: &Cluster,
    rendered: &Cluster,
) -> Cluster
where
    R: Resource,
{
    if observed.cloud_id().is_empty() {
        return rendered.clone();
    }
    match resource.actual(actual).await {
        Ok(now) if now.cloud_id().is_empty() => {
            warn!(
                "'{}' [{}] was removed before the failure, forgetting its identifier",
                resource.id(),
                observed.cloud_id()
            );
            match resource.render(&wanted.detached(), rendered.clone()) {
                Ok(forgotten) => forgotten,
                Err(e) => {
                    error!("Unable to render '{}' without its identifier: {}", resource.id(), e);
                    rendered.clone()
                }
            }
        }
        _ => rendered.clone(),
    }
}

async fn destroy_resource<R>(
    resource: &mut R,
    known: &Cluster,
    rendered: &Cluster,
    timeout: Option<Duration>,
) -> Result<Cluster>
where
    R: Resource,
{
    let id = resource.id();
    let actual = timed(timeout, &id, Operation::Actual, resource.actual(known)).await?;
    timed(timeout, &id, Operation::Delete, resource.delete(&actual, known)).await?;
    resource.render(&actual.detached(), rendered.clone())
}

/// Run `future`, failing with `Timeout` if it takes longer than `timeout`.
async fn timed<F, T>(
    timeout: Option<Duration>,
    resource: &str,
    operation: Operation,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        None => future.await,
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .ok()
            .context(error::TimeoutSnafu {
                resource,
                operation,
                timeout: duration,
            })?,
    }
}

/// Order `resources` so that every resource follows its dependencies. Otherwise declaration order
/// is kept: a resource is only moved later when a producer declared after it has to come first.
pub(crate) fn dependency_order<R>(resources: Vec<R>) -> Result<Vec<R>>
where
    R: Resource,
{
    let ids: Vec<String> = resources.iter().map(|r| r.id()).collect();
    let mut index = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        if index.insert(id.as_str(), i).is_some() {
            return error::InvalidResourceSnafu {
                resource: id.as_str(),
                reason: "declared more than once",
            }
            .fail();
        }
    }

    // consumers[i] lists the resources that depend on resource i
    let mut consumers = vec![Vec::new(); resources.len()];
    let mut waiting_on = vec![0usize; resources.len()];
    for (i, resource) in resources.iter().enumerate() {
        for dependency in resource.dependencies() {
            let producer = index
                .get(dependency.as_str())
                .copied()
                .context(error::UnknownDependencySnafu {
                    resource: ids[i].as_str(),
                    dependency: dependency.as_str(),
                })?;
            consumers[producer].push(i);
            waiting_on[i] += 1;
        }
    }

    // Always place the earliest declared resource whose producers are all placed.
    let mut ready: BinaryHeap<Reverse<usize>> = (0..resources.len())
        .filter(|&i| waiting_on[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(resources.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &consumer in &consumers[i] {
            waiting_on[consumer] -= 1;
            if waiting_on[consumer] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }

    if order.len() < resources.len() {
        return error::DependencyCycleSnafu {
            resources: (0..ids.len())
                .filter(|&i| waiting_on[i] > 0)
                .map(|i| ids[i].clone())
                .collect::<Vec<_>>(),
        }
        .fail();
    }

    let mut slots: Vec<Option<R>> = resources.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

