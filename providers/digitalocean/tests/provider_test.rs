pub(crate) mod mock;

use cluster_model::{CloudProvider, ClusterStore, FileSystemStore, Rule};
use digitalocean_provider::DigitalOceanProvider;
use mock::{api_rule, cluster, ssh_rule, MockClient, DEFAULT_VPC};
use resource_reconciler::{converge, teardown, Error, Provider, Resource, ReconcilerConfig};

#[test]
fn resources_follow_the_pools() {
    let provider = DigitalOceanProvider::new(MockClient::new());
    let ids: Vec<String> = provider
        .resources(&cluster())
        .unwrap()
        .iter()
        .map(|r| r.id())
        .collect();
    assert_eq!(
        ids,
        vec![
            "subnet/master-a",
            "droplet/master",
            "firewall/master-ssh",
            "droplet/node"
        ]
    );

    let resources = provider.resources(&cluster()).unwrap();
    assert_eq!(resources[1].dependencies(), vec!["subnet/master-a"]);
    assert_eq!(resources[2].dependencies(), vec!["droplet/master"]);
    assert!(resources[3].dependencies().is_empty());
}

#[test]
fn other_clouds_are_rejected() {
    let provider = DigitalOceanProvider::new(MockClient::new());
    let mut amazon = cluster();
    amazon.cloud = CloudProvider::Amazon;
    assert!(matches!(
        provider.resources(&amazon),
        Err(Error::InvalidResource { .. })
    ));

    let mut nowhere = cluster();
    nowhere.location.clear();
    assert!(matches!(
        provider.resources(&nowhere),
        Err(Error::InvalidResource { .. })
    ));
}

#[tokio::test]
async fn converge_and_teardown() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileSystemStore::new(dir.path());
    let client = MockClient::new();

    let first = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        cluster(),
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();

    // nothing existed, so nothing was looked up
    assert_eq!(client.count("list_vpcs"), 0);
    assert_eq!(client.count("list_droplets_by_tag"), 0);
    let creates: Vec<String> = client
        .mutations()
        .into_iter()
        .filter(|call| call.starts_with("create_"))
        .collect();
    assert_eq!(
        creates,
        vec![
            "create_vpc:master-a",
            "create_droplet:master",
            "create_firewall:master-ssh",
            "create_droplet:node"
        ]
    );
    assert_eq!(client.count("tag_droplet"), 4);

    let master = first.pool("master").unwrap();
    let vpc_id = master.subnets[0].identifier.clone();
    assert!(vpc_id.starts_with("vpc-"));
    assert!(!master.identifier.is_empty());
    assert!(master.firewalls[0].identifier.starts_with("fw-"));
    assert!(!first.pool("node").unwrap().identifier.is_empty());
    assert_eq!(store.read("prod").unwrap(), first);

    client.with_cloud(|cloud| {
        let master = cloud.droplets.iter().find(|d| d.name == "master").unwrap();
        assert_eq!(master.vpc_uuid.as_deref(), Some(vpc_id.as_str()));
        let node = cloud.droplets.iter().find(|d| d.name == "node").unwrap();
        assert_eq!(node.vpc_uuid.as_deref(), Some(DEFAULT_VPC));
        assert_eq!(cloud.firewalls[0].tags, vec!["master"]);
    });

    // a second pass over the stored result observes everything once and changes nothing
    client.clear_calls();
    let second = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        store.read("prod").unwrap(),
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(second, first);
    assert_eq!(client.count("list_vpcs"), 1);
    assert_eq!(client.count("list_droplets_by_tag"), 2);
    assert_eq!(client.count("list_firewalls"), 1);
    assert!(client
        .mutations()
        .iter()
        .all(|call| call.starts_with("tag_droplet:")));

    // teardown removes consumers before producers
    client.clear_calls();
    let torn_down = teardown(
        DigitalOceanProvider::new(client.clone()),
        &store,
        "prod",
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();
    let deletes: Vec<String> = client
        .mutations()
        .iter()
        .map(|call| call.split(':').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        deletes,
        vec![
            "delete_droplet",
            "delete_firewall",
            "delete_droplet",
            "delete_vpc"
        ]
    );
    client.with_cloud(|cloud| {
        assert!(cloud.droplets.is_empty());
        assert!(cloud.vpcs.is_empty());
        assert!(cloud.firewalls.is_empty());
    });

    let master = torn_down.pool("master").unwrap();
    assert_eq!(master.identifier, "");
    assert_eq!(master.subnets[0].identifier, "");
    assert_eq!(master.firewalls[0].identifier, "");
    assert_eq!(master.firewalls[0].rules.len(), 2);
    assert_eq!(torn_down.pool("node").unwrap().identifier, "");
    assert_eq!(store.read("prod").unwrap(), torn_down);
}

#[tokio::test]
async fn changed_rules_update_the_firewall() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileSystemStore::new(dir.path());
    let client = MockClient::new();
    let first = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        cluster(),
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();
    let firewall_id = first.pool("master").unwrap().firewalls[0].identifier.clone();

    let mut changed = first.clone();
    changed.server_pools[0].firewalls[0].rules = vec![api_rule()];
    client.clear_calls();
    let second = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        changed,
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(client.count("update_firewall"), 1);
    assert_eq!(client.count("create_firewall"), 0);
    let firewall = &second.pool("master").unwrap().firewalls[0];
    assert_eq!(firewall.identifier, firewall_id);
    assert_eq!(firewall.rules, vec![api_rule()]);
    assert!(!firewall.rules.contains(&ssh_rule()));
}

#[tokio::test]
async fn missing_droplet_stops_the_pass() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileSystemStore::new(dir.path());
    let client = MockClient::new();

    // an identifier for a droplet that no longer exists makes its lookup fail
    let mut stale = cluster();
    stale.server_pools[0].identifier = "999".into();
    let partial = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        stale,
        ReconcilerConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        partial.error,
        Error::LookupAmbiguous { found: 0, .. }
    ));
    assert!(client.mutations().is_empty());
    // observation failed, so nothing was rendered or stored
    assert_eq!(partial.rendered.pool("master").unwrap().identifier, "999");
    assert!(store.read("prod").is_err());
}

#[tokio::test]
async fn failed_droplet_replacement_is_recreated_next_pass() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileSystemStore::new(dir.path());
    let client = MockClient::new();
    let first = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        cluster(),
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();
    let old_id = first.pool("node").unwrap().identifier.clone();

    // a new size means replacing the droplet, and the create that follows the delete fails
    let mut resized = first.clone();
    resized.pool_mut("node").unwrap().size = "s-2vcpu-4gb".into();
    client.fail("create_droplet");
    client.clear_calls();
    let partial = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        resized,
        ReconcilerConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        partial.error,
        Error::ApplyFailed { ref resource, .. } if resource == "droplet/node"
    ));
    assert_eq!(client.count("delete_droplet"), 1);
    let node = partial.rendered.pool("node").unwrap();
    assert_eq!(node.identifier, "");
    assert_eq!(node.size, "s-2vcpu-4gb");
    assert_eq!(store.read("prod").unwrap(), partial.rendered);

    // the stored specification no longer points at the deleted droplet
    client.recover();
    let recovered = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        store.read("prod").unwrap(),
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();
    let node = recovered.pool("node").unwrap();
    assert!(!node.identifier.is_empty());
    assert_ne!(node.identifier, old_id);
    client.with_cloud(|cloud| {
        let nodes: Vec<_> = cloud.droplets.iter().filter(|d| d.name == "node").collect();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].size_slug, "s-2vcpu-4gb");
    });

    // and it can still be torn down
    teardown(
        DigitalOceanProvider::new(client.clone()),
        &store,
        "prod",
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn failed_vpc_replacement_forgets_the_vpc() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileSystemStore::new(dir.path());
    let client = MockClient::new();
    let first = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        cluster(),
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();

    let mut moved = first.clone();
    moved.pool_mut("master").unwrap().subnets[0].cidr = "10.0.2.0/24".into();
    client.fail("create_vpc");
    let partial = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        moved,
        ReconcilerConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        partial.error,
        Error::ApplyFailed { ref resource, .. } if resource == "subnet/master-a"
    ));
    client.with_cloud(|cloud| assert!(cloud.vpcs.is_empty()));
    let subnet = &partial.rendered.pool("master").unwrap().subnets[0];
    assert_eq!(subnet.identifier, "");
    assert_eq!(subnet.cidr, "10.0.2.0/24");
}

#[tokio::test]
async fn icmp_rules_with_ports_are_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileSystemStore::new(dir.path());
    let client = MockClient::new();
    let mut ping = cluster();
    ping.server_pools[0].firewalls[0].rules.push(Rule {
        ingress_from_port: 8,
        ingress_to_port: 8,
        ingress_source: "0.0.0.0/0".into(),
        ingress_protocol: "icmp".into(),
    });
    let partial = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        ping,
        ReconcilerConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(partial.error, Error::Validation { .. }));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn icmp_rules_converge_once() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileSystemStore::new(dir.path());
    let client = MockClient::new();
    let mut ping = cluster();
    ping.server_pools[0].firewalls[0].rules.push(Rule {
        ingress_from_port: 0,
        ingress_to_port: 0,
        ingress_source: "0.0.0.0/0".into(),
        ingress_protocol: "icmp".into(),
    });
    let first = converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        ping,
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();

    client.clear_calls();
    converge(
        DigitalOceanProvider::new(client.clone()),
        &store,
        first,
        ReconcilerConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(client.count("update_firewall"), 0);
}
