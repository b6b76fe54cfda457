use std::net::IpAddr;

use crate::error::{AchError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    network: IpAddr,
    prefix: u8,
}

impl Block {
    fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (addr, prefix) = match raw.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (raw, None),
        };
        let network: IpAddr = addr
            .parse()
            .map_err(|_| AchError::Config(format!("invalid IP address {:?}", raw)))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= max)
                .ok_or_else(|| AchError::Config(format!("invalid CIDR prefix in {:?}", raw)))?,
            None => max,
        };
        Ok(Self { network, prefix })
    }

    fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }
}

/// Addresses a transport may connect to. An empty list allows everything.
#[derive(Debug, Clone, Default)]
pub struct IpAllowlist {
    blocks: Vec<Block>,
}

impl IpAllowlist {
    pub fn parse(entries: &[String]) -> Result<Self> {
        let blocks = entries
            .iter()
            .filter(|e| !e.trim().is_empty())
            .map(|e| Block::parse(e))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { blocks })
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn allows(&self, ip: &IpAddr) -> bool {
        self.blocks.is_empty() || self.blocks.iter().any(|b| b.contains(ip))
    }

    pub fn check(&self, ip: &IpAddr) -> Result<()> {
        if self.allows(ip) {
            Ok(())
        } else {
            Err(AchError::IpNotAllowed(ip.to_string()))
        }
    }
}
