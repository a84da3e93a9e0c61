use crate::error::{self, Result};
use snafu::{ensure, OptionExt};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network block such as `10.0.0.0/24`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Cidr {
    network: u32,
    prefix: u8,
}

impl Cidr {
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    fn last(&self) -> u32 {
        self.network | !self.mask()
    }

    /// Whether every address of `other` is inside `self`.
    pub fn contains(&self, other: &Cidr) -> bool {
        self.prefix <= other.prefix && other.network & self.mask() == self.network
    }

    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.network <= other.last() && other.network <= self.last()
    }
}

impl FromStr for Cidr {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (address, prefix) = s.split_once('/').context(error::InvalidCidrSnafu {
            cidr: s,
            reason: "missing '/<prefix>'",
        })?;
        let address = Ipv4Addr::from_str(address).ok().context(error::InvalidCidrSnafu {
            cidr: s,
            reason: "address is not an IPv4 address",
        })?;
        let prefix = u8::from_str(prefix).ok().context(error::InvalidCidrSnafu {
            cidr: s,
            reason: "prefix is not a number",
        })?;
        ensure!(
            prefix <= 32,
            error::InvalidCidrSnafu {
                cidr: s,
                reason: "prefix is larger than 32",
            }
        );
        let cidr = Cidr {
            network: u32::from(address),
            prefix,
        };
        ensure!(
            cidr.network & cidr.mask() == cidr.network,
            error::InvalidCidrSnafu {
                cidr: s,
                reason: "host bits are set",
            }
        );
        Ok(cidr)
    }
}

impl Display for Cidr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}
