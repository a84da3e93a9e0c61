/*!

`digitalocean-provider` implements the [`resource_reconciler::Resource`] contract for DigitalOcean.
Each server pool of a cluster specification becomes a droplet, with a VPC for each of its subnets
and a cloud firewall for each of its firewalls.

Resources reach DigitalOcean through the [`DigitalOceanClient`] trait. The [`HttpClient`] implements
it against the v2 REST API; tests inject an in-memory client instead.

```no_run
use digitalocean_provider::{DigitalOceanProvider, HttpClient, HttpClientConfig};
use std::sync::Arc;

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let client = HttpClient::new(HttpClientConfig::new("my-token"))?;
let provider = DigitalOceanProvider::new(Arc::new(client));
# Ok(())
# }
```

!*/

pub mod client;
pub mod droplet;
pub mod firewall;
mod lookup;
mod provider;
pub mod subnet;
mod tags;

pub use client::{DigitalOceanClient, HttpClient, HttpClientConfig};
pub use droplet::{DropletResource, DropletState};
pub use firewall::{FirewallResource, FirewallState};
pub use provider::{DigitalOceanProvider, DigitalOceanResource, DigitalOceanState};
pub use subnet::{SubnetResource, SubnetState};
