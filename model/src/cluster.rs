use crate::constants::CLUSTER_TAG_KEY;
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use std::collections::BTreeMap;

/// The declarative description of one cluster's infrastructure. A `Cluster` is read from the state
/// store, handed to a reconciliation pass, and the rendered result of that pass is written back.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// The name of the cluster, unique within a state store.
    pub name: String,
    /// The cloud provider that hosts the cluster.
    #[serde(default)]
    pub cloud: CloudProvider,
    /// The region of record for the cluster, e.g. `nyc3` or `us-west-2`.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub ssh: Ssh,
    #[serde(default)]
    pub kubernetes_api: KubernetesApi,
    /// Free-form values that are injected into bootstrap scripts.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// Labels applied to every remote object that supports them.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub server_pools: Vec<ServerPool>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    DigitalOcean,
    Amazon,
    Google,
    Azure,
}

impl Default for CloudProvider {
    fn default() -> Self {
        Self::DigitalOcean
    }
}

derive_display_from_serialize!(CloudProvider);
derive_fromstr_from_deserialize!(CloudProvider);

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    #[serde(default)]
    pub network_type: NetworkType,
    /// The block that every subnet of the cluster must fall within.
    #[serde(default)]
    pub cidr: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Public,
    Private,
}

impl Default for NetworkType {
    fn default() -> Self {
        Self::Public
    }
}

derive_display_from_serialize!(NetworkType);
derive_fromstr_from_deserialize!(NetworkType);

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ssh {
    #[serde(default)]
    pub public_key_path: String,
    #[serde(default)]
    pub user: String,
    /// The fingerprint of the public key once it is known to the provider.
    #[serde(default)]
    pub fingerprint: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesApi {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub port: String,
}

/// A named group of identically configured compute instances.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPool {
    #[serde(default)]
    pub pool_type: ServerPoolType,
    pub name: String,
    #[serde(default)]
    pub min_count: u32,
    #[serde(default)]
    pub max_count: u32,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub bootstrap_script: String,
    /// The provider-assigned id of the pool's compute resource, empty until it is created.
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default)]
    pub firewalls: Vec<Firewall>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerPoolType {
    Master,
    Node,
}

impl Default for ServerPoolType {
    fn default() -> Self {
        Self::Node
    }
}

derive_display_from_serialize!(ServerPoolType);
derive_fromstr_from_deserialize!(ServerPoolType);

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub name: String,
    pub cidr: String,
    /// The availability zone or region sub-division of the subnet.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub identifier: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firewall {
    pub name: String,
    #[serde(default)]
    pub identifier: String,
    /// Allow-list rules. Their order carries no meaning.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub ingress_from_port: u16,
    pub ingress_to_port: u16,
    /// The CIDR that traffic may originate from.
    pub ingress_source: String,
    pub ingress_protocol: String,
}

impl Cluster {
    pub fn pool(&self, name: &str) -> Option<&ServerPool> {
        self.server_pools.iter().find(|pool| pool.name == name)
    }

    pub fn pool_mut(&mut self, name: &str) -> Option<&mut ServerPool> {
        self.server_pools.iter_mut().find(|pool| pool.name == name)
    }

    /// Returns the pool named `name`, appending an empty one with that name if it is absent.
    pub fn pool_entry(&mut self, name: &str) -> &mut ServerPool {
        let index = match self.server_pools.iter().position(|pool| pool.name == name) {
            Some(index) => index,
            None => {
                self.server_pools.push(ServerPool {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.server_pools.len() - 1
            }
        };
        &mut self.server_pools[index]
    }

    /// The labels that resources of this cluster are tagged with: the user supplied `tags` plus
    /// the cluster name under `KubernetesCluster`.
    pub fn tag_set(&self) -> BTreeMap<String, String> {
        let mut tags = self.tags.clone();
        tags.insert(CLUSTER_TAG_KEY.to_string(), self.name.clone());
        tags
    }
}

impl ServerPool {
    /// Returns the subnet named `name`, appending an empty one if it is absent.
    pub fn subnet_entry(&mut self, name: &str) -> &mut Subnet {
        let index = match self.subnets.iter().position(|subnet| subnet.name == name) {
            Some(index) => index,
            None => {
                self.subnets.push(Subnet {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.subnets.len() - 1
            }
        };
        &mut self.subnets[index]
    }

    /// Returns the firewall named `name`, appending an empty one if it is absent.
    pub fn firewall_entry(&mut self, name: &str) -> &mut Firewall {
        let index = match self.firewalls.iter().position(|firewall| firewall.name == name) {
            Some(index) => index,
            None => {
                self.firewalls.push(Firewall {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.firewalls.len() - 1
            }
        };
        &mut self.firewalls[index]
    }
}
