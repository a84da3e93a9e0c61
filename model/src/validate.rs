use crate::error::{self, Result};
use crate::{Cidr, Cluster};
use snafu::ensure;
use std::collections::HashSet;

const ICMP: &str = "icmp";

/// The firewall rule protocols, spelled the way providers report them back.
const PROTOCOLS: &[&str] = &["tcp", "udp", ICMP];

/// Whether `name` can be used as a single directory name: not empty, not `.` or `..`, and free of
/// path separators.
pub(crate) fn is_directory_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\')
}

impl Cluster {
    /// Check the invariants that a reconciliation pass relies on. Pool names must be unique
    /// because remote objects are looked up by a tag derived from the pool name.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.name.is_empty(),
            error::ValidationSnafu {
                cluster: "",
                reason: "the cluster name is empty",
            }
        );
        ensure!(
            is_directory_name(&self.name),
            error::ValidationSnafu {
                cluster: self.name.as_str(),
                reason: "the cluster name must not contain path separators or be '.' or '..'",
            }
        );
        let invalid = |reason: String| {
            error::ValidationSnafu {
                cluster: self.name.as_str(),
                reason,
            }
            .build()
        };

        let network = if self.network.cidr.is_empty() {
            None
        } else {
            Some(
                self.network
                    .cidr
                    .parse::<Cidr>()
                    .map_err(|e| invalid(format!("network: {}", e)))?,
            )
        };

        let mut pool_names = HashSet::new();
        let mut subnets: Vec<(String, Cidr)> = Vec::new();
        for pool in &self.server_pools {
            if pool.name.is_empty() {
                return Err(invalid("a server pool has an empty name".into()));
            }
            if !pool_names.insert(pool.name.as_str()) {
                return Err(invalid(format!("server pool '{}' is declared twice", pool.name)));
            }
            if pool.min_count > pool.max_count {
                return Err(invalid(format!(
                    "server pool '{}' has minCount {} greater than maxCount {}",
                    pool.name, pool.min_count, pool.max_count
                )));
            }
            for subnet in &pool.subnets {
                let cidr = subnet.cidr.parse::<Cidr>().map_err(|e| {
                    invalid(format!("subnet '{}' of pool '{}': {}", subnet.name, pool.name, e))
                })?;
                if let Some(network) = &network {
                    if !network.contains(&cidr) {
                        return Err(invalid(format!(
                            "subnet '{}' ({}) is outside of the network {}",
                            subnet.name, cidr, network
                        )));
                    }
                }
                if let Some((other, _)) = subnets.iter().find(|(_, other)| other.overlaps(&cidr)) {
                    return Err(invalid(format!(
                        "subnet '{}' ({}) overlaps subnet '{}'",
                        subnet.name, cidr, other
                    )));
                }
                subnets.push((subnet.name.clone(), cidr));
            }
            for firewall in &pool.firewalls {
                for rule in &firewall.rules {
                    if !PROTOCOLS.contains(&rule.ingress_protocol.as_str()) {
                        return Err(invalid(format!(
                            "firewall '{}' has a rule with protocol '{}', expected one of {}",
                            firewall.name,
                            rule.ingress_protocol,
                            PROTOCOLS.join(", ")
                        )));
                    }
                    if rule.ingress_protocol == ICMP
                        && (rule.ingress_from_port != 0 || rule.ingress_to_port != 0)
                    {
                        return Err(invalid(format!(
                            "firewall '{}' has an icmp rule with ports {}-{}, icmp rules carry no ports",
                            firewall.name, rule.ingress_from_port, rule.ingress_to_port
                        )));
                    }
                    if rule.ingress_from_port > rule.ingress_to_port {
                        return Err(invalid(format!(
                            "firewall '{}' has a rule with port range {}-{}",
                            firewall.name, rule.ingress_from_port, rule.ingress_to_port
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
