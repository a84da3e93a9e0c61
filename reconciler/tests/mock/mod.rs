/*!

This test module provides a mock [`Provider`] whose resources keep their "remote" objects in a shared
in-memory map and record every call they make, so that reconciler behavior can be tested without a
cloud.

!*/

use cluster_model::Cluster;
use resource_reconciler::compare::is_equal;
use resource_reconciler::error::{self, ErrorMessage};
use resource_reconciler::{
    ClientError, DeleteReason, Provider, Resource, ResourceCache, Result, Snapshot,
};
use serde::Serialize;
use snafu::ResultExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The objects that exist in the mock cloud, keyed by resource id.
pub type Remote = Arc<Mutex<BTreeMap<String, MockState>>>;

/// Every remote call made by mock resources, in order, e.g. `create:compute/web`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockState {
    pub kind: String,
    pub name: String,
    pub cloud_id: String,
    pub size: String,
}

impl Snapshot for MockState {
    fn kind(&self) -> &'static str {
        match self.kind.as_str() {
            "subnet" => "subnet",
            _ => "compute",
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn cloud_id(&self) -> &str {
        &self.cloud_id
    }

    fn generated_fields(&self) -> &'static [&'static str] {
        &["cloudId"]
    }

    fn detached(self) -> Self {
        Self {
            cloud_id: String::new(),
            ..self
        }
    }
}

/// How the mock provider declares one resource.
#[derive(Clone, Debug, Default)]
pub struct Declaration {
    pub kind: &'static str,
    pub name: &'static str,
    pub depends_on: Vec<String>,
    pub fail_apply: bool,
    /// Remove a drifted object before creating its replacement, instead of creating over it.
    pub replace_on_drift: bool,
    pub fail_delete: bool,
    pub fail_tag: bool,
    pub actual_delay: Option<Duration>,
}

impl Declaration {
    pub fn compute(name: &'static str) -> Self {
        Self {
            kind: "compute",
            name,
            ..Default::default()
        }
    }

    pub fn subnet(name: &'static str) -> Self {
        Self {
            kind: "subnet",
            name,
            ..Default::default()
        }
    }

    pub fn depends_on(mut self, id: &str) -> Self {
        self.depends_on.push(id.to_string());
        self
    }
}

pub struct MockProvider {
    pub declarations: Vec<Declaration>,
    pub remote: Remote,
    pub log: CallLog,
}

impl MockProvider {
    pub fn new(declarations: Vec<Declaration>) -> Self {
        Self {
            declarations,
            remote: Remote::default(),
            log: CallLog::default(),
        }
    }

    /// A provider that shares the mock cloud and call log of `self`, for a second pass.
    pub fn again(&self) -> Self {
        Self {
            declarations: self.declarations.clone(),
            remote: Arc::clone(&self.remote),
            log: Arc::clone(&self.log),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    /// Put an object in the mock cloud as if an earlier pass had created it.
    pub fn seed(&self, kind: &str, name: &str, size: &str) {
        self.remote.lock().unwrap().insert(
            format!("{}/{}", kind, name),
            MockState {
                kind: kind.into(),
                name: name.into(),
                cloud_id: format!("id-{}", name),
                size: size.into(),
            },
        );
    }
}

impl Provider for MockProvider {
    type Resource = MockResource;

    fn resources(&self, _cluster: &Cluster) -> Result<Vec<Self::Resource>> {
        Ok(self
            .declarations
            .iter()
            .map(|declaration| MockResource {
                declaration: declaration.clone(),
                remote: Arc::clone(&self.remote),
                log: Arc::clone(&self.log),
                cache: ResourceCache::new(),
            })
            .collect())
    }
}

/// A resource that renders into the server pool named after it.
pub struct MockResource {
    declaration: Declaration,
    remote: Remote,
    log: CallLog,
    cache: ResourceCache<MockState>,
}

impl MockResource {
    fn record(&self, operation: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", operation, self.id()));
    }
}

#[async_trait::async_trait]
impl Resource for MockResource {
    type State = MockState;

    fn kind(&self) -> &'static str {
        self.declaration.kind
    }

    fn name(&self) -> &str {
        self.declaration.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.declaration.depends_on.clone()
    }

    fn reset(&mut self) {
        self.cache.clear();
    }

    async fn actual(&mut self, _known: &Cluster) -> Result<Self::State> {
        if let Some(actual) = self.cache.actual().value() {
            return Ok(actual.clone());
        }
        if let Some(delay) = self.declaration.actual_delay {
            tokio::time::sleep(delay).await;
        }
        self.record("lookup");
        let found = self.remote.lock().unwrap().get(&self.id()).cloned();
        Ok(match found {
            Some(state) => self.cache.cache_actual(state, true),
            None => self.cache.cache_actual(
                MockState {
                    kind: self.kind().into(),
                    name: self.name().into(),
                    ..Default::default()
                },
                false,
            ),
        })
    }

    async fn expected(&mut self, known: &Cluster) -> Result<Self::State> {
        if let Some(expected) = self.cache.expected().value() {
            return Ok(expected.clone());
        }
        let pool = known.pool(self.name()).cloned().unwrap_or_default();
        Ok(self.cache.cache_expected(MockState {
            kind: self.kind().into(),
            name: self.name().into(),
            cloud_id: pool.identifier,
            size: pool.size,
        }))
    }

    async fn apply(
        &mut self,
        actual: &Self::State,
        expected: &Self::State,
        _target: &Cluster,
    ) -> Result<Self::State> {
        if is_equal(actual, expected)? {
            return Ok(expected.clone());
        }
        if self.declaration.replace_on_drift && !actual.cloud_id.is_empty() {
            self.record("delete");
            self.remote.lock().unwrap().remove(&self.id());
            self.cache.cache_actual(actual.clone().detached(), false);
        }
        if self.declaration.fail_apply {
            return Err(ClientError::request(ErrorMessage::from("apply refused")))
                .context(error::ApplyFailedSnafu {
                    resource: self.id(),
                });
        }
        self.record("create");
        let created = MockState {
            cloud_id: format!("id-{}", self.name()),
            ..expected.clone()
        };
        self.remote
            .lock()
            .unwrap()
            .insert(self.id(), created.clone());
        Ok(created)
    }

    async fn delete(&mut self, _actual: &Self::State, _known: &Cluster) -> Result<()> {
        self.record("delete");
        if self.declaration.fail_delete {
            return Err(DeleteReason::Request {
                source: ClientError::request(ErrorMessage::from("delete refused")),
            })
            .context(error::DeleteFailedSnafu {
                resource: self.id(),
            });
        }
        self.remote.lock().unwrap().remove(&self.id());
        Ok(())
    }

    fn render(&self, result: &Self::State, mut target: Cluster) -> Result<Cluster> {
        let pool = target.pool_entry(self.name());
        pool.size = result.size.clone();
        pool.identifier = result.cloud_id.clone();
        Ok(target)
    }

    async fn tag(&mut self, _tags: &BTreeMap<String, String>) -> Result<()> {
        self.record("tag");
        if self.declaration.fail_tag {
            return Err(ClientError::Status {
                code: 403,
                body: "tagging is not allowed".into(),
            })
            .context(error::TagFailedSnafu {
                resource: self.id(),
            });
        }
        Ok(())
    }
}

/// A cluster with one pool per name, each expecting size `s-1`.
pub fn cluster(pools: &[&str]) -> Cluster {
    Cluster {
        name: "mock".into(),
        server_pools: pools
            .iter()
            .map(|name| cluster_model::ServerPool {
                name: name.to_string(),
                min_count: 1,
                max_count: 1,
                size: "s-1".into(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

/// The ids in `calls`, with the operation prefix removed.
pub fn ids(calls: &[String]) -> Vec<&str> {
    calls
        .iter()
        .filter_map(|call| call.split_once(':').map(|(_, id)| id))
        .collect()
}

/// Whether any id was looked up more than once.
pub fn repeated_lookups(calls: &[String]) -> bool {
    let lookups: Vec<&String> = calls.iter().filter(|c| c.starts_with("lookup:")).collect();
    let unique: HashSet<&String> = lookups.iter().copied().collect();
    unique.len() != lookups.len()
}
