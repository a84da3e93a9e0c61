/*!

The subnet resource: each subnet of a server pool is a DigitalOcean VPC named `<pool>-<subnet>`.

!*/

use crate::client::{ClientResult, DigitalOceanClient, Vpc, VpcRequest};
use crate::lookup::{exactly_one, exactly_one_to_delete};
use cluster_model::{Cluster, Subnet};
use log::{debug, info};
use resource_reconciler::compare::is_equal;
use resource_reconciler::error;
use resource_reconciler::{Resource, ResourceCache, Result, Snapshot};
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const KIND: &str = "subnet";

pub(crate) fn vpc_name(pool: &str, subnet: &str) -> String {
    format!("{}-{}", pool, subnet)
}

/// The id of the resource for subnet `subnet` of server pool `pool`.
pub(crate) fn resource_id(pool: &str, subnet: &str) -> String {
    format!("{}/{}", KIND, vpc_name(pool, subnet))
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetState {
    pub name: String,
    pub cloud_id: String,
    pub region: String,
    pub ip_range: String,
}

impl Snapshot for SubnetState {
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
        &["cloudId"]
    }

    fn detached(self) -> Self {
        Self {
            cloud_id: String::new(),
            ..self
        }
    }
}

pub struct SubnetResource {
    pool: String,
    subnet: String,
    /// The VPC name.
    name: String,
    cloud_id: String,
    client: Arc<dyn DigitalOceanClient>,
    cache: ResourceCache<SubnetState>,
}

impl SubnetResource {
    pub fn new(pool: &str, subnet: &Subnet, client: Arc<dyn DigitalOceanClient>) -> Self {
        Self {
            pool: pool.to_string(),
            subnet: subnet.name.clone(),
            name: vpc_name(pool, &subnet.name),
            cloud_id: subnet.identifier.clone(),
            client,
            cache: ResourceCache::new(),
        }
    }

    fn subnet<'a>(&self, cluster: &'a Cluster) -> Result<&'a Subnet> {
        cluster
            .pool(&self.pool)
            .and_then(|pool| pool.subnets.iter().find(|s| s.name == self.subnet))
            .context(error::InvalidResourceSnafu {
                resource: self.id(),
                reason: format!(
                    "server pool '{}' has no subnet named '{}'",
                    self.pool, self.subnet
                ),
            })
    }

    /// Every VPC carrying this resource's name.
    async fn find(&self) -> ClientResult<Vec<Vpc>> {
        Ok(self
            .client
            .list_vpcs()
            .await?
            .into_iter()
            .filter(|vpc| vpc.name == self.name)
            .collect())
    }

    fn observed(&self, vpc: &Vpc) -> SubnetState {
        SubnetState {
            name: self.name.clone(),
            cloud_id: vpc.id.clone(),
            region: vpc.region.clone(),
            ip_range: vpc.ip_range.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Resource for SubnetResource {
    type State = SubnetState;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.cache.clear();
    }

    async fn actual(&mut self, _known: &Cluster) -> Result<SubnetState> {
        if let Some(actual) = self.cache.actual().value() {
            debug!("Using cached subnet '{}' [actual]", self.name);
            return Ok(actual.clone());
        }
        if self.cloud_id.is_empty() {
            let placeholder = SubnetState {
                name: self.name.clone(),
                ..Default::default()
            };
            return Ok(self.cache.cache_actual(placeholder, false));
        }
        debug!("Looking up VPC '{}'", self.name);
        let found = self.find().await.context(error::LookupFailedSnafu {
            resource: self.id(),
        })?;
        let vpc = exactly_one(found, &self.id(), &self.name)?;
        let actual = self.observed(&vpc);
        Ok(self.cache.cache_actual(actual, true))
    }

    async fn expected(&mut self, known: &Cluster) -> Result<SubnetState> {
        if let Some(expected) = self.cache.expected().value() {
            debug!("Using cached subnet '{}' [expected]", self.name);
            return Ok(expected.clone());
        }
        let subnet = self.subnet(known)?;
        let region = if subnet.location.is_empty() {
            known.location.clone()
        } else {
            subnet.location.clone()
        };
        let expected = SubnetState {
            name: self.name.clone(),
            cloud_id: subnet.identifier.clone(),
            region,
            ip_range: subnet.cidr.clone(),
        };
        Ok(self.cache.cache_expected(expected))
    }

    async fn apply(
        &mut self,
        actual: &SubnetState,
        expected: &SubnetState,
        target: &Cluster,
    ) -> Result<SubnetState> {
        if is_equal(actual, expected)? {
            return Ok(expected.clone());
        }
        // The region and range of a VPC cannot change, so drift means replacing it.
        if !actual.cloud_id.is_empty() {
            info!("Replacing VPC '{}' [{}] to converge it", self.name, actual.cloud_id);
            self.client
                .delete_vpc(&actual.cloud_id)
                .await
                .context(error::ApplyFailedSnafu {
                    resource: self.id(),
                })?;
            self.cache.cache_actual(actual.clone().detached(), false);
        }
        let request = VpcRequest {
            name: self.name.clone(),
            region: expected.region.clone(),
            ip_range: expected.ip_range.clone(),
            description: format!(
                "Subnet '{}' of server pool '{}' in cluster '{}'",
                self.subnet, self.pool, target.name
            ),
        };
        let vpc = self
            .client
            .create_vpc(&request)
            .await
            .context(error::ApplyFailedSnafu {
                resource: self.id(),
            })?;
        info!("Created VPC '{}' [{}]", vpc.name, vpc.id);
        Ok(self.observed(&vpc))
    }

    async fn delete(&mut self, actual: &SubnetState, _known: &Cluster) -> Result<()> {
        ensure!(
            !actual.name.is_empty(),
            error::InvalidResourceSnafu {
                resource: self.id(),
                reason: "unable to delete a VPC without a name",
            }
        );
        if actual.cloud_id.is_empty() {
            info!("VPC '{}' was never created, nothing to delete", self.name);
            return Ok(());
        }
        let found = self
            .find()
            .await
            .context(error::RequestSnafu)
            .context(error::DeleteFailedSnafu {
                resource: self.id(),
            })?;
        let vpc = exactly_one_to_delete(found, &self.id())?;
        self.client
            .delete_vpc(&vpc.id)
            .await
            .context(error::RequestSnafu)
            .context(error::DeleteFailedSnafu {
                resource: self.id(),
            })?;
        info!("Deleted VPC '{}' [{}]", self.name, vpc.id);
        Ok(())
    }

    fn render(&self, result: &SubnetState, mut target: Cluster) -> Result<Cluster> {
        let subnet = target.pool_entry(&self.pool).subnet_entry(&self.subnet);
        subnet.identifier = result.cloud_id.clone();
        if !result.ip_range.is_empty() {
            subnet.cidr = result.ip_range.clone();
        }
        Ok(target)
    }

    async fn tag(&mut self, _tags: &BTreeMap<String, String>) -> Result<()> {
        // VPCs cannot be tagged.
        Ok(())
    }
}
