/*!

The firewall resource: each firewall of a server pool is a DigitalOcean cloud firewall named
`<pool>-<firewall>` that applies to the pool's droplet through its tag.

Rules are compared as a set. A rule whose ports are both `0` opens every port, which DigitalOcean
spells `"0"`. ICMP rules carry no ports.

!*/

use crate::client::{
    ClientResult, CloudFirewall, CloudFirewallRequest, DigitalOceanClient, Endpoints, InboundRule,
    OutboundRule,
};
use crate::lookup::{exactly_one, exactly_one_to_delete};
use crate::{droplet, tags};
use cluster_model::{Cluster, Firewall, Rule};
use log::{debug, info, warn};
use resource_reconciler::compare::is_equal;
use resource_reconciler::error;
use resource_reconciler::{Resource, ResourceCache, Result, Snapshot};
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const KIND: &str = "firewall";

const ICMP: &str = "icmp";

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallState {
    pub name: String,
    pub cloud_id: String,
    /// Sorted and free of duplicates.
    pub rules: Vec<Rule>,
    /// The droplet tags the firewall applies to.
    pub targets: Vec<String>,
}

impl FirewallState {
    fn canonical(mut self) -> Self {
        self.rules.sort();
        self.rules.dedup();
        self.targets.sort();
        self.targets.dedup();
        self
    }
}

impl Snapshot for FirewallState {
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

pub struct FirewallResource {
    pool: String,
    firewall: String,
    /// The cloud firewall name.
    name: String,
    cloud_id: String,
    client: Arc<dyn DigitalOceanClient>,
    cache: ResourceCache<FirewallState>,
}

impl FirewallResource {
    pub fn new(pool: &str, firewall: &Firewall, client: Arc<dyn DigitalOceanClient>) -> Self {
        Self {
            pool: pool.to_string(),
            firewall: firewall.name.clone(),
            name: format!("{}-{}", pool, firewall.name),
            cloud_id: firewall.identifier.clone(),
            client,
            cache: ResourceCache::new(),
        }
    }

    fn firewall<'a>(&self, cluster: &'a Cluster) -> Result<&'a Firewall> {
        cluster
            .pool(&self.pool)
            .and_then(|pool| pool.firewalls.iter().find(|f| f.name == self.firewall))
            .context(error::InvalidResourceSnafu {
                resource: self.id(),
                reason: format!(
                    "server pool '{}' has no firewall named '{}'",
                    self.pool, self.firewall
                ),
            })
    }

    async fn find(&self) -> ClientResult<Vec<CloudFirewall>> {
        Ok(self
            .client
            .list_firewalls()
            .await?
            .into_iter()
            .filter(|f| f.name == self.name)
            .collect())
    }

    fn observed(&self, firewall: &CloudFirewall) -> FirewallState {
        FirewallState {
            name: self.name.clone(),
            cloud_id: firewall.id.clone(),
            rules: firewall.inbound_rules.iter().flat_map(rules_of).collect(),
            targets: firewall.tags.clone(),
        }
        .canonical()
    }
}

#[async_trait::async_trait]
impl Resource for FirewallResource {
    type State = FirewallState;

    fn kind(&self) -> &'static str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        vec![droplet::resource_id(&self.pool)]
    }

    fn reset(&mut self) {
        self.cache.clear();
    }

    async fn actual(&mut self, _known: &Cluster) -> Result<FirewallState> {
        if let Some(actual) = self.cache.actual().value() {
            debug!("Using cached firewall '{}' [actual]", self.name);
            return Ok(actual.clone());
        }
        if self.cloud_id.is_empty() {
            let placeholder = FirewallState {
                name: self.name.clone(),
                ..Default::default()
            };
            return Ok(self.cache.cache_actual(placeholder, false));
        }
        debug!("Looking up firewall '{}'", self.name);
        let found = self.find().await.context(error::LookupFailedSnafu {
            resource: self.id(),
        })?;
        let firewall = exactly_one(found, &self.id(), &self.name)?;
        let actual = self.observed(&firewall);
        Ok(self.cache.cache_actual(actual, true))
    }

    async fn expected(&mut self, known: &Cluster) -> Result<FirewallState> {
        if let Some(expected) = self.cache.expected().value() {
            debug!("Using cached firewall '{}' [expected]", self.name);
            return Ok(expected.clone());
        }
        let firewall = self.firewall(known)?;
        let expected = FirewallState {
            name: self.name.clone(),
            cloud_id: firewall.identifier.clone(),
            rules: firewall.rules.clone(),
            targets: vec![tags::sanitize(&self.pool)],
        }
        .canonical();
        Ok(self.cache.cache_expected(expected))
    }

    async fn apply(
        &mut self,
        actual: &FirewallState,
        expected: &FirewallState,
        _target: &Cluster,
    ) -> Result<FirewallState> {
        if is_equal(actual, expected)? {
            return Ok(expected.clone());
        }
        let request = CloudFirewallRequest {
            name: self.name.clone(),
            inbound_rules: expected.rules.iter().map(inbound_rule).collect(),
            outbound_rules: allow_all_outbound(),
            tags: expected.targets.clone(),
        };
        let firewall = if actual.cloud_id.is_empty() {
            let firewall = self.client.create_firewall(&request).await;
            firewall.context(error::ApplyFailedSnafu {
                resource: self.id(),
            })?
        } else {
            let firewall = self.client.update_firewall(&actual.cloud_id, &request).await;
            firewall.context(error::ApplyFailedSnafu {
                resource: self.id(),
            })?
        };
        info!("Converged firewall '{}' [{}]", firewall.name, firewall.id);
        Ok(self.observed(&firewall))
    }

    async fn delete(&mut self, actual: &FirewallState, _known: &Cluster) -> Result<()> {
        ensure!(
            !actual.name.is_empty(),
            error::InvalidResourceSnafu {
                resource: self.id(),
                reason: "unable to delete a firewall without a name",
            }
        );
        if actual.cloud_id.is_empty() {
            info!("Firewall '{}' was never created, nothing to delete", self.name);
            return Ok(());
        }
        let found = self
            .find()
            .await
            .context(error::RequestSnafu)
            .context(error::DeleteFailedSnafu {
                resource: self.id(),
            })?;
        let firewall = exactly_one_to_delete(found, &self.id())?;
        self.client
            .delete_firewall(&firewall.id)
            .await
            .context(error::RequestSnafu)
            .context(error::DeleteFailedSnafu {
                resource: self.id(),
            })?;
        info!("Deleted firewall '{}' [{}]", self.name, firewall.id);
        Ok(())
    }

    fn render(&self, result: &FirewallState, mut target: Cluster) -> Result<Cluster> {
        let firewall = target
            .pool_entry(&self.pool)
            .firewall_entry(&self.firewall);
        firewall.identifier = result.cloud_id.clone();
        if !result.rules.is_empty() {
            firewall.rules = result.rules.clone();
        }
        Ok(target)
    }

    async fn tag(&mut self, _tags: &BTreeMap<String, String>) -> Result<()> {
        // Firewalls cannot be tagged.
        Ok(())
    }
}

fn ports(rule: &Rule) -> Option<String> {
    if rule.ingress_protocol == ICMP {
        None
    } else if rule.ingress_from_port == rule.ingress_to_port {
        Some(rule.ingress_from_port.to_string())
    } else {
        Some(format!("{}-{}", rule.ingress_from_port, rule.ingress_to_port))
    }
}

fn parse_ports(ports: Option<&str>) -> Option<(u16, u16)> {
    match ports {
        None | Some("all") | Some("0") | Some("") => Some((0, 0)),
        Some(ports) => match ports.split_once('-') {
            Some((from, to)) => Some((from.trim().parse().ok()?, to.trim().parse().ok()?)),
            None => {
                let port = ports.trim().parse().ok()?;
                Some((port, port))
            }
        },
    }
}

fn inbound_rule(rule: &Rule) -> InboundRule {
    InboundRule {
        protocol: rule.ingress_protocol.clone(),
        ports: ports(rule),
        sources: Endpoints {
            addresses: vec![rule.ingress_source.clone()],
            tags: Vec::new(),
        },
    }
}

/// One rule per source address of an inbound rule.
fn rules_of(inbound: &InboundRule) -> Vec<Rule> {
    let (from, to) = match parse_ports(inbound.ports.as_deref()) {
        Some(range) => range,
        None => {
            warn!(
                "Ignoring {} rule with unrecognized ports {:?}",
                inbound.protocol, inbound.ports
            );
            return Vec::new();
        }
    };
    inbound
        .sources
        .addresses
        .iter()
        .map(|address| Rule {
            ingress_from_port: from,
            ingress_to_port: to,
            ingress_source: address.clone(),
            ingress_protocol: inbound.protocol.clone(),
        })
        .collect()
}

fn allow_all_outbound() -> Vec<OutboundRule> {
    let everywhere = Endpoints {
        addresses: vec!["0.0.0.0/0".to_string(), "::/0".to_string()],
        tags: Vec::new(),
    };
    ["tcp", "udp", ICMP]
        .iter()
        .map(|protocol| OutboundRule {
            protocol: protocol.to_string(),
            ports: if *protocol == ICMP {
                None
            } else {
                Some("0".to_string())
            },
            destinations: everywhere.clone(),
        })
        .collect()
}
