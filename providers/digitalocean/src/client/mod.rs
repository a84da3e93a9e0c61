/*!

The `client` module defines the calls that resources make against the DigitalOcean API and the
objects those calls exchange.

The [`DigitalOceanClient`] trait is injected into every resource so that tests can substitute an
in-memory implementation. In practice you will use the [`HttpClient`].

!*/

mod http;

pub use http::{HttpClient, HttpClientConfig, DEFAULT_API_URL};

use resource_reconciler::ClientError;
use serde::{Deserialize, Serialize};

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// The DigitalOcean API surface that resources depend on.
#[async_trait::async_trait]
pub trait DigitalOceanClient: Send + Sync {
    /// Every droplet that carries `tag`.
    async fn list_droplets_by_tag(&self, tag: &str) -> ClientResult<Vec<Droplet>>;

    async fn create_droplet(&self, request: &DropletRequest) -> ClientResult<Droplet>;

    async fn delete_droplet(&self, id: u64) -> ClientResult<()>;

    /// Attach `tag` to the droplet, creating the tag first if it does not exist.
    async fn tag_droplet(&self, id: u64, tag: &str) -> ClientResult<()>;

    async fn list_vpcs(&self) -> ClientResult<Vec<Vpc>>;

    async fn create_vpc(&self, request: &VpcRequest) -> ClientResult<Vpc>;

    async fn delete_vpc(&self, id: &str) -> ClientResult<()>;

    async fn list_firewalls(&self) -> ClientResult<Vec<CloudFirewall>>;

    async fn create_firewall(&self, request: &CloudFirewallRequest) -> ClientResult<CloudFirewall>;

    /// Replace the definition of an existing firewall.
    async fn update_firewall(
        &self,
        id: &str,
        request: &CloudFirewallRequest,
    ) -> ClientResult<CloudFirewall>;

    async fn delete_firewall(&self, id: &str) -> ClientResult<()>;
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub region: Region,
    #[serde(default)]
    pub size_slug: String,
    #[serde(default)]
    pub image: Image,
    #[serde(default)]
    pub vpc_uuid: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub slug: Option<String>,
}

impl Image {
    /// The slug of public images, or the numeric id of private ones.
    pub fn reference(&self) -> String {
        match &self.slug {
            Some(slug) if !slug.is_empty() => slug.clone(),
            _ => self.id.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DropletRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub ip_range: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VpcRequest {
    pub name: String,
    pub region: String,
    pub ip_range: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CloudFirewall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub inbound_rules: Vec<InboundRule>,
    #[serde(default)]
    pub outbound_rules: Vec<OutboundRule>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CloudFirewallRequest {
    pub name: String,
    pub inbound_rules: Vec<InboundRule>,
    pub outbound_rules: Vec<OutboundRule>,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InboundRule {
    pub protocol: String,
    /// A single port, a range such as `8000-9000`, or `all`. Omitted for ICMP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    #[serde(default)]
    pub sources: Endpoints,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutboundRule {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    #[serde(default)]
    pub destinations: Endpoints,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}
