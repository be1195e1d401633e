//! Network layout planning: the address block and subnets every deployment
//! network is built from.
//!
//! Pure functions only; no I/O.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use outpost_common::OrchestratorConfig;

use crate::domain::error::ConfigError;

/// Destination of the default route through the internet gateway.
pub const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// An IPv4 block in CIDR notation whose host bits are all zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    base: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// # Errors
    ///
    /// Returns an error if the prefix is longer than 32 bits or `base` has
    /// host bits set.
    pub fn new(base: Ipv4Addr, prefix_len: u8) -> Result<Self, ConfigError> {
        let cidr = Self { base, prefix_len };
        if prefix_len > 32 || u32::from(base) & !cidr.mask() != 0 {
            return Err(ConfigError::InvalidCidr(format!("{base}/{prefix_len}")));
        }
        Ok(cidr)
    }

    #[must_use]
    pub fn base(self) -> Ipv4Addr {
        self.base
    }

    #[must_use]
    pub fn prefix_len(self) -> u8 {
        self.prefix_len
    }

    fn mask(self) -> u32 {
        match self.prefix_len {
            0 => 0,
            n => u32::MAX << (32 - u32::from(n)),
        }
    }

    /// Number of `/subnet_prefix` blocks that fit inside this block.
    #[must_use]
    pub fn subnet_capacity(self, subnet_prefix: u8) -> u64 {
        if subnet_prefix <= self.prefix_len || subnet_prefix > 32 {
            return 0;
        }
        1u64 << (subnet_prefix - self.prefix_len)
    }

    /// The `index`-th `/subnet_prefix` block, counting from the base address.
    ///
    /// # Errors
    ///
    /// Returns an error if the block does not fit inside `self`.
    pub fn subnet(self, subnet_prefix: u8, index: u64) -> Result<Self, ConfigError> {
        let capacity = self.subnet_capacity(subnet_prefix);
        if index >= capacity {
            return Err(ConfigError::TooManyZones {
                zones: usize::try_from(index.saturating_add(1)).unwrap_or(usize::MAX),
                capacity,
            });
        }
        let step = 1u64 << (32 - u32::from(subnet_prefix));
        let offset = u32::try_from(index * step)
            .map_err(|_| ConfigError::InvalidCidr(format!("{self} #{index}")))?;
        Self::new(Ipv4Addr::from(u32::from(self.base) + offset), subnet_prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidCidr(s.to_string());
        let (addr, len) = s.trim().split_once('/').ok_or_else(invalid)?;
        let base = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix_len = len.parse::<u8>().map_err(|_| invalid())?;
        Self::new(base, prefix_len).map_err(|_| invalid())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}

/// One subnet to create: an availability zone and its slice of the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetPlan {
    pub zone_id: String,
    pub cidr: Ipv4Cidr,
}

/// The network block and non-overlapping subnets, one per availability zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLayout {
    pub cidr: Ipv4Cidr,
    pub subnets: Vec<SubnetPlan>,
}

impl NetworkLayout {
    /// Plan the layout described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the network block is malformed, no zones are
    /// configured, or the zones do not fit in the block at the configured
    /// subnet prefix.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, ConfigError> {
        let cidr: Ipv4Cidr = config.network_cidr.parse()?;
        if config.availability_zones.is_empty() {
            return Err(ConfigError::NoAvailabilityZones);
        }
        if config.subnet_prefix_len <= cidr.prefix_len() || config.subnet_prefix_len > 32 {
            return Err(ConfigError::SubnetPrefixTooShort {
                subnet: config.subnet_prefix_len,
                network: cidr.prefix_len(),
            });
        }
        let capacity = cidr.subnet_capacity(config.subnet_prefix_len);
        let zones = config.availability_zones.len();
        if zones as u64 > capacity {
            return Err(ConfigError::TooManyZones { zones, capacity });
        }

        let subnets = config
            .availability_zones
            .iter()
            .zip(0u64..)
            .map(|(zone, index)| {
                Ok(SubnetPlan {
                    zone_id: zone.clone(),
                    cidr: cidr.subnet(config.subnet_prefix_len, index)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { cidr, subnets })
    }
}
