//! IP allow-list behavior with CIDR support.

use std::{net::IpAddr, str::FromStr};

use async_trait::async_trait;
use http::StatusCode;

use crate::{
    config::{FrameworkConfig, ValidationError},
    core::context::MethodContext,
    ports::{BehaviorResult, SecureServiceBehavior, ServiceBehavior},
};

/// CIDR network representation
#[derive(Debug, Clone)]
pub struct IpNetwork {
    /// Base IP address
    addr: IpAddr,
    /// Prefix length (e.g., 24 for /24)
    prefix_len: u8,
}

impl IpNetwork {
    /// Create a new IP network from an address and prefix length
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, String> {
        match addr {
            IpAddr::V4(_) if prefix_len > 32 => {
                return Err("IPv4 prefix length must be <= 32".to_string());
            }
            IpAddr::V6(_) if prefix_len > 128 => {
                return Err("IPv6 prefix length must be <= 128".to_string());
            }
            _ => {}
        }

        Ok(Self { addr, prefix_len })
    }

    /// Parse from CIDR notation (e.g., "192.168.1.0/24")
    pub fn parse(s: &str) -> Result<Self, String> {
        if let Some((ip_str, prefix_str)) = s.split_once('/') {
            let addr = IpAddr::from_str(ip_str).map_err(|e| format!("Invalid IP address: {e}"))?;
            let prefix_len: u8 = prefix_str
                .parse()
                .map_err(|e| format!("Invalid prefix length: {e}"))?;
            Self::new(addr, prefix_len)
        } else {
            // No prefix, treat as single IP (/32 or /128)
            let addr = IpAddr::from_str(s).map_err(|e| format!("Invalid IP address: {e}"))?;
            let prefix_len = match addr {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            Ok(Self { addr, prefix_len })
        }
    }

    /// Check if an IP address is contained in this network
    pub fn contains(&self, ip: IpAddr) -> bool {
        // IPs must be same version
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let net_bits = u32::from(net);
                let addr_bits = u32::from(addr);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    !0u32 << (32 - self.prefix_len)
                };
                (net_bits & mask) == (addr_bits & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let net_bits = u128::from(net);
                let addr_bits = u128::from(addr);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    !0u128 << (128 - self.prefix_len)
                };
                (net_bits & mask) == (addr_bits & mask)
            }
            _ => false,
        }
    }
}

impl std::str::FromStr for IpNetwork {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IpNetwork::parse(s)
    }
}

/// Allow-list gate: the client IP must match one of the section's networks.
/// An empty list or an unknown client address forbids.
#[derive(Debug)]
pub struct AclBehavior {
    section: String,
    networks: Vec<IpNetwork>,
}

impl AclBehavior {
    /// Build from a named `[acl]` section of the framework configuration.
    pub fn from_config(config: &FrameworkConfig, section: &str) -> Result<Self, ValidationError> {
        let entries = config
            .acl
            .get(section)
            .ok_or_else(|| ValidationError::InvalidAcl {
                section: section.to_string(),
                message: "section is not defined".to_string(),
            })?;

        let mut networks = Vec::with_capacity(entries.len());
        for entry in entries {
            networks.push(IpNetwork::parse(entry).map_err(|e| ValidationError::InvalidAcl {
                section: section.to_string(),
                message: format!("'{entry}': {e}"),
            })?);
        }

        Ok(Self {
            section: section.to_string(),
            networks,
        })
    }
}

#[async_trait]
impl ServiceBehavior for AclBehavior {
    fn as_secure(&self) -> Option<&dyn SecureServiceBehavior> {
        Some(self)
    }
}

#[async_trait]
impl SecureServiceBehavior for AclBehavior {
    async fn on_authorizing(&self, ctx: &mut MethodContext) -> BehaviorResult {
        let Some(ip) = ctx.request().remote_ip() else {
            tracing::warn!(section = %self.section, "ACL check with unknown client address");
            return BehaviorResult::stop(StatusCode::FORBIDDEN, "Forbidden");
        };

        if self.networks.iter().any(|network| network.contains(ip)) {
            BehaviorResult::Execute
        } else {
            tracing::debug!(section = %self.section, client = %ip, "Client IP not in allow-list");
            BehaviorResult::stop(StatusCode::FORBIDDEN, "Forbidden")
        }
    }
}
