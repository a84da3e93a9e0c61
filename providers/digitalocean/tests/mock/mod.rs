/*!

An in-memory [`DigitalOceanClient`] that records every call it receives, so that tests can check
which requests the resources make without reaching DigitalOcean.

!*/

use cluster_model::{
    CloudProvider, Cluster, Firewall, Network, Rule, ServerPool, ServerPoolType, Ssh, Subnet,
};
use digitalocean_provider::client::{
    ClientResult, CloudFirewall, CloudFirewallRequest, Droplet, DropletRequest, Image, Region, Vpc,
    VpcRequest,
};
use digitalocean_provider::DigitalOceanClient;
use maplit::btreemap;
use resource_reconciler::ClientError;
use std::sync::{Arc, Mutex};

/// The VPC that DigitalOcean places a droplet in when none is requested.
pub const DEFAULT_VPC: &str = "vpc-default";

#[derive(Debug, Default)]
pub struct MockCloud {
    pub droplets: Vec<Droplet>,
    pub vpcs: Vec<Vpc>,
    pub firewalls: Vec<CloudFirewall>,
    next_id: u64,
}

impl MockCloud {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        1000 + self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MockClient {
    cloud: Mutex<MockCloud>,
    calls: Mutex<Vec<String>>,
    /// Methods that answer with an error until `recover` is called.
    failing: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call so far, e.g. `create_droplet:web`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// The number of calls to `method`.
    pub fn count(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(':').next() == Some(method))
            .count()
    }

    /// The calls that change something.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("list_"))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn with_cloud<R>(&self, f: impl FnOnce(&mut MockCloud) -> R) -> R {
        f(&mut self.cloud.lock().unwrap())
    }

    /// Put a droplet in the cloud as if it had been created earlier and return its id.
    pub fn add_droplet(&self, name: &str, size: &str, image: &str, region: &str) -> u64 {
        self.with_cloud(|cloud| {
            let id = cloud.next_id();
            cloud.droplets.push(Droplet {
                id,
                name: name.into(),
                region: Region {
                    slug: region.into(),
                    name: region.to_uppercase(),
                },
                size_slug: size.into(),
                image: Image {
                    id: 7,
                    slug: Some(image.into()),
                },
                vpc_uuid: Some(DEFAULT_VPC.into()),
                tags: vec![name.into()],
                status: "active".into(),
            });
            id
        })
    }

    /// Make every call to `method` fail as if DigitalOcean refused it.
    pub fn fail(&self, method: &str) {
        self.failing.lock().unwrap().push(method.to_string());
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn refused(&self, method: &str) -> ClientResult<()> {
        if self.failing.lock().unwrap().iter().any(|m| m == method) {
            return Err(ClientError::Status {
                code: 422,
                body: format!("{} is not possible right now", method),
            });
        }
        Ok(())
    }
}

fn not_found(what: &str) -> ClientError {
    ClientError::Status {
        code: 404,
        body: format!("{} not found", what),
    }
}

#[async_trait::async_trait]
impl DigitalOceanClient for MockClient {
    async fn list_droplets_by_tag(&self, tag: &str) -> ClientResult<Vec<Droplet>> {
        self.record(format!("list_droplets_by_tag:{}", tag));
        Ok(self.with_cloud(|cloud| {
            cloud
                .droplets
                .iter()
                .filter(|d| d.tags.iter().any(|t| t == tag))
                .cloned()
                .collect()
        }))
    }

    async fn create_droplet(&self, request: &DropletRequest) -> ClientResult<Droplet> {
        self.record(format!("create_droplet:{}", request.name));
        self.refused("create_droplet")?;
        Ok(self.with_cloud(|cloud| {
            let droplet = Droplet {
                id: cloud.next_id(),
                name: request.name.clone(),
                region: Region {
                    slug: request.region.clone(),
                    name: request.region.to_uppercase(),
                },
                size_slug: request.size.clone(),
                image: Image {
                    id: 7,
                    slug: Some(request.image.clone()),
                },
                vpc_uuid: Some(
                    request
                        .vpc_uuid
                        .clone()
                        .unwrap_or_else(|| DEFAULT_VPC.to_string()),
                ),
                tags: request.tags.clone(),
                status: "new".into(),
            };
            cloud.droplets.push(droplet.clone());
            droplet
        }))
    }

    async fn delete_droplet(&self, id: u64) -> ClientResult<()> {
        self.record(format!("delete_droplet:{}", id));
        self.with_cloud(|cloud| {
            let before = cloud.droplets.len();
            cloud.droplets.retain(|d| d.id != id);
            if cloud.droplets.len() == before {
                Err(not_found("droplet"))
            } else {
                Ok(())
            }
        })
    }

    async fn tag_droplet(&self, id: u64, tag: &str) -> ClientResult<()> {
        self.record(format!("tag_droplet:{}:{}", id, tag));
        self.with_cloud(|cloud| {
            let droplet = cloud
                .droplets
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| not_found("droplet"))?;
            if !droplet.tags.iter().any(|t| t == tag) {
                droplet.tags.push(tag.to_string());
            }
            Ok(())
        })
    }

    async fn list_vpcs(&self) -> ClientResult<Vec<Vpc>> {
        self.record("list_vpcs".to_string());
        Ok(self.with_cloud(|cloud| cloud.vpcs.clone()))
    }

    async fn create_vpc(&self, request: &VpcRequest) -> ClientResult<Vpc> {
        self.record(format!("create_vpc:{}", request.name));
        self.refused("create_vpc")?;
        Ok(self.with_cloud(|cloud| {
            let vpc = Vpc {
                id: format!("vpc-{}", cloud.next_id()),
                name: request.name.clone(),
                region: request.region.clone(),
                ip_range: request.ip_range.clone(),
                description: request.description.clone(),
            };
            cloud.vpcs.push(vpc.clone());
            vpc
        }))
    }

    async fn delete_vpc(&self, id: &str) -> ClientResult<()> {
        self.record(format!("delete_vpc:{}", id));
        self.with_cloud(|cloud| {
            let before = cloud.vpcs.len();
            cloud.vpcs.retain(|v| v.id != id);
            if cloud.vpcs.len() == before {
                Err(not_found("vpc"))
            } else {
                Ok(())
            }
        })
    }

    async fn list_firewalls(&self) -> ClientResult<Vec<CloudFirewall>> {
        self.record("list_firewalls".to_string());
        Ok(self.with_cloud(|cloud| cloud.firewalls.clone()))
    }

    async fn create_firewall(&self, request: &CloudFirewallRequest) -> ClientResult<CloudFirewall> {
        self.record(format!("create_firewall:{}", request.name));
        Ok(self.with_cloud(|cloud| {
            let firewall = CloudFirewall {
                id: format!("fw-{}", cloud.next_id()),
                name: request.name.clone(),
                inbound_rules: request.inbound_rules.clone(),
                outbound_rules: request.outbound_rules.clone(),
                tags: request.tags.clone(),
            };
            cloud.firewalls.push(firewall.clone());
            firewall
        }))
    }

    async fn update_firewall(
        &self,
        id: &str,
        request: &CloudFirewallRequest,
    ) -> ClientResult<CloudFirewall> {
        self.record(format!("update_firewall:{}", id));
        self.with_cloud(|cloud| {
            let firewall = cloud
                .firewalls
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| not_found("firewall"))?;
            firewall.name = request.name.clone();
            firewall.inbound_rules = request.inbound_rules.clone();
            firewall.outbound_rules = request.outbound_rules.clone();
            firewall.tags = request.tags.clone();
            Ok(firewall.clone())
        })
    }

    async fn delete_firewall(&self, id: &str) -> ClientResult<()> {
        self.record(format!("delete_firewall:{}", id));
        self.with_cloud(|cloud| {
            let before = cloud.firewalls.len();
            cloud.firewalls.retain(|f| f.id != id);
            if cloud.firewalls.len() == before {
                Err(not_found("firewall"))
            } else {
                Ok(())
            }
        })
    }
}

pub fn ssh_rule() -> Rule {
    Rule {
        ingress_from_port: 22,
        ingress_to_port: 22,
        ingress_source: "0.0.0.0/0".into(),
        ingress_protocol: "tcp".into(),
    }
}

pub fn api_rule() -> Rule {
    Rule {
        ingress_from_port: 6443,
        ingress_to_port: 6443,
        ingress_source: "10.0.0.0/16".into(),
        ingress_protocol: "tcp".into(),
    }
}

/// A cluster with a `master` pool that has a subnet and a firewall, and a bare `node` pool.
pub fn cluster() -> Cluster {
    Cluster {
        name: "prod".into(),
        cloud: CloudProvider::DigitalOcean,
        location: "nyc3".into(),
        network: Network {
            cidr: "10.0.0.0/16".into(),
            ..Default::default()
        },
        ssh: Ssh {
            fingerprint: "aa:bb:cc".into(),
            ..Default::default()
        },
        tags: btreemap! { "team".to_string() => "infra".to_string() },
        server_pools: vec![
            ServerPool {
                pool_type: ServerPoolType::Master,
                name: "master".into(),
                min_count: 1,
                max_count: 1,
                image: "ubuntu-22-04-x64".into(),
                size: "s-2vcpu-2gb".into(),
                subnets: vec![Subnet {
                    name: "a".into(),
                    cidr: "10.0.1.0/24".into(),
                    ..Default::default()
                }],
                firewalls: vec![Firewall {
                    name: "ssh".into(),
                    rules: vec![ssh_rule(), api_rule()],
                    ..Default::default()
                }],
                ..Default::default()
            },
            ServerPool {
                name: "node".into(),
                min_count: 1,
                max_count: 1,
                image: "ubuntu-22-04-x64".into(),
                size: "s-1vcpu-1gb".into(),
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}
