use crate::client::DigitalOceanClient;
use crate::droplet::{DropletResource, DropletState};
use crate::firewall::{FirewallResource, FirewallState};
use crate::subnet::{SubnetResource, SubnetState};
use cluster_model::{CloudProvider, Cluster};
use log::debug;
use resource_reconciler::error;
use resource_reconciler::{Provider, Resource, Result, Snapshot};
use serde::Serialize;
use snafu::ensure;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds the DigitalOcean resources that a cluster specification calls for: for every server
/// pool, a VPC per subnet, one droplet, and a cloud firewall per firewall.
#[derive(Clone)]
pub struct DigitalOceanProvider {
    client: Arc<dyn DigitalOceanClient>,
}

impl DigitalOceanProvider {
    pub fn new(client: Arc<dyn DigitalOceanClient>) -> Self {
        Self { client }
    }
}

impl Provider for DigitalOceanProvider {
    type Resource = DigitalOceanResource;

    fn resources(&self, cluster: &Cluster) -> Result<Vec<DigitalOceanResource>> {
        ensure!(
            cluster.cloud == CloudProvider::DigitalOcean,
            error::InvalidResourceSnafu {
                resource: format!("cluster/{}", cluster.name),
                reason: format!("cloud '{}' is not DigitalOcean", cluster.cloud),
            }
        );
        ensure!(
            !cluster.location.is_empty(),
            error::InvalidResourceSnafu {
                resource: format!("cluster/{}", cluster.name),
                reason: "a DigitalOcean region is required as the location",
            }
        );

        let mut resources = Vec::new();
        for pool in &cluster.server_pools {
            ensure!(
                !pool.name.is_empty(),
                error::InvalidResourceSnafu {
                    resource: format!("cluster/{}", cluster.name),
                    reason: "a server pool has an empty name",
                }
            );
            for subnet in &pool.subnets {
                resources.push(DigitalOceanResource::Subnet(SubnetResource::new(
                    &pool.name,
                    subnet,
                    Arc::clone(&self.client),
                )));
            }
            resources.push(DigitalOceanResource::Droplet(DropletResource::new(
                pool,
                Arc::clone(&self.client),
            )));
            for firewall in &pool.firewalls {
                resources.push(DigitalOceanResource::Firewall(FirewallResource::new(
                    &pool.name,
                    firewall,
                    Arc::clone(&self.client),
                )));
            }
        }
        debug!(
            "Cluster '{}' calls for {} DigitalOcean resource(s)",
            cluster.name,
            resources.len()
        );
        Ok(resources)
    }
}

/// A snapshot of any DigitalOcean resource kind.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DigitalOceanState {
    Subnet(SubnetState),
    Droplet(DropletState),
    Firewall(FirewallState),
}

impl Snapshot for DigitalOceanState {
    fn kind(&self) -> &'static str {
        match self {
            DigitalOceanState::Subnet(s) => s.kind(),
            DigitalOceanState::Droplet(s) => s.kind(),
            DigitalOceanState::Firewall(s) => s.kind(),
        }
    }

    fn name(&self) -> &str {
        match self {
            DigitalOceanState::Subnet(s) => s.name(),
            DigitalOceanState::Droplet(s) => s.name(),
            DigitalOceanState::Firewall(s) => s.name(),
        }
    }

    fn cloud_id(&self) -> &str {
        match self {
            DigitalOceanState::Subnet(s) => s.cloud_id(),
            DigitalOceanState::Droplet(s) => s.cloud_id(),
            DigitalOceanState::Firewall(s) => s.cloud_id(),
        }
    }

    fn generated_fields(&self) -> &'static [&'static str] {
        match self {
            DigitalOceanState::Subnet(s) => s.generated_fields(),
            DigitalOceanState::Droplet(s) => s.generated_fields(),
            DigitalOceanState::Firewall(s) => s.generated_fields(),
        }
    }

    fn detached(self) -> Self {
        match self {
            DigitalOceanState::Subnet(s) => DigitalOceanState::Subnet(s.detached()),
            DigitalOceanState::Droplet(s) => DigitalOceanState::Droplet(s.detached()),
            DigitalOceanState::Firewall(s) => DigitalOceanState::Firewall(s.detached()),
        }
    }
}

/// The closed set of DigitalOcean resource kinds. Each variant pairs with the
/// [`DigitalOceanState`] variant of the same name; handing a variant a snapshot of another kind
/// fails with `ComparisonFailed` (or `Render` when rendering).
pub enum DigitalOceanResource {
    Subnet(SubnetResource),
    Droplet(DropletResource),
    Firewall(FirewallResource),
}

/// The error for a resource of kind `expected` that was handed a snapshot of another kind.
fn mismatch<T>(resource: String, expected: &str, state: &DigitalOceanState) -> Result<T> {
    error::ComparisonFailedSnafu {
        resource,
        actual: state.kind(),
        expected,
    }
    .fail()
}

#[async_trait::async_trait]
impl Resource for DigitalOceanResource {
    type State = DigitalOceanState;

    fn kind(&self) -> &'static str {
        match self {
            DigitalOceanResource::Subnet(r) => r.kind(),
            DigitalOceanResource::Droplet(r) => r.kind(),
            DigitalOceanResource::Firewall(r) => r.kind(),
        }
    }

    fn name(&self) -> &str {
        match self {
            DigitalOceanResource::Subnet(r) => r.name(),
            DigitalOceanResource::Droplet(r) => r.name(),
            DigitalOceanResource::Firewall(r) => r.name(),
        }
    }

    fn dependencies(&self) -> Vec<String> {
        match self {
            DigitalOceanResource::Subnet(r) => r.dependencies(),
            DigitalOceanResource::Droplet(r) => r.dependencies(),
            DigitalOceanResource::Firewall(r) => r.dependencies(),
        }
    }

    fn reset(&mut self) {
        match self {
            DigitalOceanResource::Subnet(r) => r.reset(),
            DigitalOceanResource::Droplet(r) => r.reset(),
            DigitalOceanResource::Firewall(r) => r.reset(),
        }
    }

    async fn actual(&mut self, known: &Cluster) -> Result<DigitalOceanState> {
        Ok(match self {
            DigitalOceanResource::Subnet(r) => DigitalOceanState::Subnet(r.actual(known).await?),
            DigitalOceanResource::Droplet(r) => DigitalOceanState::Droplet(r.actual(known).await?),
            DigitalOceanResource::Firewall(r) => {
                DigitalOceanState::Firewall(r.actual(known).await?)
            }
        })
    }

    async fn expected(&mut self, known: &Cluster) -> Result<DigitalOceanState> {
        Ok(match self {
            DigitalOceanResource::Subnet(r) => DigitalOceanState::Subnet(r.expected(known).await?),
            DigitalOceanResource::Droplet(r) => {
                DigitalOceanState::Droplet(r.expected(known).await?)
            }
            DigitalOceanResource::Firewall(r) => {
                DigitalOceanState::Firewall(r.expected(known).await?)
            }
        })
    }

    async fn apply(
        &mut self,
        actual: &DigitalOceanState,
        expected: &DigitalOceanState,
        target: &Cluster,
    ) -> Result<DigitalOceanState> {
        let (id, kind) = (self.id(), self.kind());
        match (self, actual, expected) {
            (
                DigitalOceanResource::Subnet(r),
                DigitalOceanState::Subnet(a),
                DigitalOceanState::Subnet(e),
            ) => Ok(DigitalOceanState::Subnet(r.apply(a, e, target).await?)),
            (
                DigitalOceanResource::Droplet(r),
                DigitalOceanState::Droplet(a),
                DigitalOceanState::Droplet(e),
            ) => Ok(DigitalOceanState::Droplet(r.apply(a, e, target).await?)),
            (
                DigitalOceanResource::Firewall(r),
                DigitalOceanState::Firewall(a),
                DigitalOceanState::Firewall(e),
            ) => Ok(DigitalOceanState::Firewall(r.apply(a, e, target).await?)),
            _ if actual.kind() != kind => mismatch(id, kind, actual),
            _ => mismatch(id, kind, expected),
        }
    }

    async fn delete(&mut self, actual: &DigitalOceanState, known: &Cluster) -> Result<()> {
        let (id, kind) = (self.id(), self.kind());
        match (self, actual) {
            (DigitalOceanResource::Subnet(r), DigitalOceanState::Subnet(a)) => {
                r.delete(a, known).await
            }
            (DigitalOceanResource::Droplet(r), DigitalOceanState::Droplet(a)) => {
                r.delete(a, known).await
            }
            (DigitalOceanResource::Firewall(r), DigitalOceanState::Firewall(a)) => {
                r.delete(a, known).await
            }
            _ => mismatch(id, kind, actual),
        }
    }

    fn render(&self, result: &DigitalOceanState, target: Cluster) -> Result<Cluster> {
        match (self, result) {
            (DigitalOceanResource::Subnet(r), DigitalOceanState::Subnet(s)) => r.render(s, target),
            (DigitalOceanResource::Droplet(r), DigitalOceanState::Droplet(s)) => {
                r.render(s, target)
            }
            (DigitalOceanResource::Firewall(r), DigitalOceanState::Firewall(s)) => {
                r.render(s, target)
            }
            _ => error::RenderSnafu {
                resource: self.id(),
                reason: format!("unable to render a '{}' snapshot", result.kind()),
            }
            .fail(),
        }
    }

    async fn tag(&mut self, tags: &BTreeMap<String, String>) -> Result<()> {
        match self {
            DigitalOceanResource::Subnet(r) => r.tag(tags).await,
            DigitalOceanResource::Droplet(r) => r.tag(tags).await,
            DigitalOceanResource::Firewall(r) => r.tag(tags).await,
        }
    }
}
