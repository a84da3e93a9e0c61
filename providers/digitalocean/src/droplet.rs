/*!

The droplet resource: one DigitalOcean droplet per server pool, found again by a tag equal to the
pool name.

!*/

use crate::client::{DigitalOceanClient, Droplet, DropletRequest};
use crate::lookup::{exactly_one, exactly_one_to_delete};
use crate::{subnet, tags};
use cluster_model::{Cluster, ServerPool};
use log::{debug, info};
use resource_reconciler::compare::is_equal;
use resource_reconciler::error;
use resource_reconciler::{Resource, ResourceCache, Result, Snapshot};
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const KIND: &str = "droplet";

/// The id of the droplet resource of server pool `pool`.
pub(crate) fn resource_id(pool: &str) -> String {
    format!("{}/{}", KIND, pool)
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropletState {
    pub name: String,
    pub cloud_id: String,
    /// The region slug, e.g. `nyc3`.
    pub region: String,
    pub size: String,
    pub image: String,
    pub count: u32,
    /// The id of the VPC the droplet is placed in.
    pub vpc: String,
}

impl Snapshot for DropletState {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn cloud_id(&self) -> &str {
        &self.cloud_id
    }

    fn generated_fields(&self) -> &'static [&'static str] {
        &["cloudId", "vpc"]
    }

    fn detached(self) -> Self {
        Self {
            cloud_id: String::new(),
            ..self
        }
    }
}

pub struct DropletResource {
    /// The server pool name, which is also the droplet name.
    name: String,
    /// The tag that the droplet is looked up by.
    tag: String,
    /// The identifier known from the specification when the resource was built.
    cloud_id: String,
    subnets: Vec<String>,
    client: Arc<dyn DigitalOceanClient>,
    cache: ResourceCache<DropletState>,
    /// The droplet that `apply` converged, for tagging.
    droplet_id: Option<u64>,
}

impl DropletResource {
    pub fn new(pool: &ServerPool, client: Arc<dyn DigitalOceanClient>) -> Self {
        Self {
            name: pool.name.clone(),
            tag: tags::sanitize(&pool.name),
            cloud_id: pool.identifier.clone(),
            subnets: pool
                .subnets
                .iter()
                .map(|s| subnet::resource_id(&pool.name, &s.name))
                .collect(),
            client,
            cache: ResourceCache::new(),
            droplet_id: None,
        }
    }

    fn pool<'a>(&self, cluster: &'a Cluster) -> Result<&'a ServerPool> {
        cluster
            .pool(&self.name)
            .context(error::InvalidResourceSnafu {
                resource: self.id(),
                reason: format!("cluster '{}' has no server pool with this name", cluster.name),
            })
    }

    fn parse_id(&self, cloud_id: &str) -> Result<u64> {
        cloud_id.parse().ok().context(error::InvalidResourceSnafu {
            resource: self.id(),
            reason: format!("'{}' is not a droplet id", cloud_id),
        })
    }

    async fn find(&self) -> Result<Vec<Droplet>> {
        self.client
            .list_droplets_by_tag(&self.tag)
            .await
            .context(error::LookupFailedSnafu {
                resource: self.id(),
            })
    }

    /// A snapshot of `droplet` as the provider reports it.
    fn observed(&self, droplet: &Droplet, count: u32) -> DropletState {
        DropletState {
            name: self.name.clone(),
            cloud_id: droplet.id.to_string(),
            region: droplet.region.slug.clone(),
            size: droplet.size_slug.clone(),
            image: droplet.image.reference(),
            count,
            vpc: droplet.vpc_uuid.clone().unwrap_or_default(),
        }
    }
}

#[async_trait::async_trait]
impl Resource for DropletResource {
    type State = DropletState;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.subnets.clone()
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.droplet_id = None;
    }

    async fn actual(&mut self, known: &Cluster) -> Result<DropletState> {
        if let Some(actual) = self.cache.actual().value() {
            debug!("Using cached droplet '{}' [actual]", self.name);
            return Ok(actual.clone());
        }
        debug!("Looking up droplet '{}'", self.name);
        let count = self.pool(known)?.max_count;
        if self.cloud_id.is_empty() {
            // Nothing has been created for this pool yet.
            let placeholder = DropletState {
                name: self.name.clone(),
                count,
                ..Default::default()
            };
            return Ok(self.cache.cache_actual(placeholder, false));
        }
        let droplet = exactly_one(self.find().await?, &self.id(), &self.tag)?;
        let actual = self.observed(&droplet, count);
        Ok(self.cache.cache_actual(actual, true))
    }

    async fn expected(&mut self, known: &Cluster) -> Result<DropletState> {
        if let Some(expected) = self.cache.expected().value() {
            debug!("Using cached droplet '{}' [expected]", self.name);
            return Ok(expected.clone());
        }
        let pool = self.pool(known)?;
        let expected = DropletState {
            name: self.name.clone(),
            cloud_id: pool.identifier.clone(),
            region: known.location.clone(),
            size: pool.size.clone(),
            image: pool.image.clone(),
            count: pool.max_count,
            vpc: first_vpc(pool),
        };
        Ok(self.cache.cache_expected(expected))
    }

    async fn apply(
        &mut self,
        actual: &DropletState,
        expected: &DropletState,
        target: &Cluster,
    ) -> Result<DropletState> {
        if is_equal(actual, expected)? {
            if !actual.cloud_id.is_empty() {
                self.droplet_id = Some(self.parse_id(&actual.cloud_id)?);
            }
            return Ok(expected.clone());
        }

        if !actual.cloud_id.is_empty() {
            let id = self.parse_id(&actual.cloud_id)?;
            info!("Replacing droplet '{}' [{}] to converge it", self.name, id);
            self.client
                .delete_droplet(id)
                .await
                .context(error::ApplyFailedSnafu {
                    resource: self.id(),
                })?;
            self.cache.cache_actual(actual.clone().detached(), false);
        }

        let pool = self.pool(target)?;
        let vpc = first_vpc(pool);
        let request = DropletRequest {
            name: expected.name.clone(),
            region: expected.region.clone(),
            size: expected.size.clone(),
            image: expected.image.clone(),
            ssh_keys: Some(target.ssh.fingerprint.clone())
                .filter(|f| !f.is_empty())
                .into_iter()
                .collect(),
            tags: vec![self.tag.clone()],
            vpc_uuid: Some(vpc).filter(|v| !v.is_empty()),
            user_data: user_data(&pool.bootstrap_script, &target.values),
        };
        let droplet = self
            .client
            .create_droplet(&request)
            .await
            .context(error::ApplyFailedSnafu {
                resource: self.id(),
            })?;
        info!("Created droplet '{}' [{}]", droplet.name, droplet.id);
        self.droplet_id = Some(droplet.id);
        Ok(self.observed(&droplet, expected.count))
    }

    async fn delete(&mut self, actual: &DropletState, _known: &Cluster) -> Result<()> {
        ensure!(
            !actual.name.is_empty(),
            error::InvalidResourceSnafu {
                resource: self.id(),
                reason: "unable to delete a droplet without a name",
            }
        );
        if actual.cloud_id.is_empty() {
            info!("Droplet '{}' was never created, nothing to delete", self.name);
            return Ok(());
        }
        let found = self
            .client
            .list_droplets_by_tag(&self.tag)
            .await
            .context(error::RequestSnafu)
            .context(error::DeleteFailedSnafu {
                resource: self.id(),
            })?;
        let droplet = exactly_one_to_delete(found, &self.id())?;
        self.client
            .delete_droplet(droplet.id)
            .await
            .context(error::RequestSnafu)
            .context(error::DeleteFailedSnafu {
                resource: self.id(),
            })?;
        info!("Deleted droplet '{}' [{}]", self.name, droplet.id);
        Ok(())
    }

    fn render(&self, result: &DropletState, mut target: Cluster) -> Result<Cluster> {
        let pool = target.pool_entry(&self.name);
        if !result.image.is_empty() {
            pool.image = result.image.clone();
        }
        if !result.size.is_empty() {
            pool.size = result.size.clone();
        }
        pool.max_count = result.count;
        pool.identifier = result.cloud_id.clone();
        // The droplet region is the location of record for the cluster.
        if !result.region.is_empty() {
            target.location = result.region.clone();
        }
        Ok(target)
    }

    async fn tag(&mut self, tags: &BTreeMap<String, String>) -> Result<()> {
        let id = match self.droplet_id {
            Some(id) => id,
            None => {
                debug!("Droplet '{}' does not exist, not tagging", self.name);
                return Ok(());
            }
        };
        for tag in tags::tag_names(tags) {
            self.client
                .tag_droplet(id, &tag)
                .await
                .context(error::TagFailedSnafu {
                    resource: self.id(),
                })?;
        }
        Ok(())
    }
}

/// The VPC of the first subnet of `pool`, empty when it has no subnet or it is not created yet.
fn first_vpc(pool: &ServerPool) -> String {
    pool.subnets
        .first()
        .map(|s| s.identifier.clone())
        .unwrap_or_default()
}

/// The bootstrap script with every `${key}` replaced by the cluster value named `key`.
fn user_data(script: &str, values: &BTreeMap<String, String>) -> Option<String> {
    if script.is_empty() {
        return None;
    }
    Some(values.iter().fold(script.to_string(), |script, (key, value)| {
        script.replace(&format!("${{{}}}", key), value)
    }))
}
