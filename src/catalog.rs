//! Configured reply options, encoded once at startup.
//!
//! The set of options a server can hand out is closed: router, subnet
//! mask, DNS servers, time servers and the lease timers. They are turned
//! into wire bytes when the server starts and spliced into every OFFER and
//! ACK unchanged.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::options::{DhcpOption, MessageType};

/// Lease handed out when the configuration does not name one.
pub const DEFAULT_LEASE_SECONDS: u32 = 86_400;

/// A configurable option name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogOption {
    #[serde(rename = "router")]
    Router,
    #[serde(rename = "subnetmask")]
    SubnetMask,
    #[serde(rename = "dns")]
    Dns,
    #[serde(rename = "timesvr")]
    TimeServer,
    #[serde(rename = "lease")]
    Lease,
}

impl CatalogOption {
    pub fn name(self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::SubnetMask => "subnetmask",
            Self::Dns => "dns",
            Self::TimeServer => "timesvr",
            Self::Lease => "lease",
        }
    }
}

impl FromStr for CatalogOption {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "router" => Ok(Self::Router),
            "subnetmask" => Ok(Self::SubnetMask),
            "dns" => Ok(Self::Dns),
            "timesvr" => Ok(Self::TimeServer),
            "lease" | "leasetime" => Ok(Self::Lease),
            other => Err(Error::InvalidConfig(format!("Unknown option: {}", other))),
        }
    }
}

impl fmt::Display for CatalogOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// T1: half the lease.
pub fn renewal_time(lease_seconds: u32) -> u32 {
    lease_seconds / 2
}

/// T2: 82.5% of the lease, truncated.
pub fn rebinding_time(lease_seconds: u32) -> u32 {
    (lease_seconds as u64 * 825 / 1000) as u32
}

/// Precomputed reply options.
///
/// The server identifier (option 54) always comes first. The configured
/// options follow in the order they were named, and the lease timers are
/// appended with [`DEFAULT_LEASE_SECONDS`] if no lease was configured.
#[derive(Debug, Clone)]
pub struct OptionCatalog {
    entries: Vec<DhcpOption>,
    encoded: Vec<u8>,
    server_identifier: Vec<u8>,
}

impl OptionCatalog {
    /// Builds the catalog for the options named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a named option has no value, or
    /// an option would not fit in one TLV record.
    pub fn build(config: &Config, server_id: Ipv4Addr) -> Result<Self> {
        let mut entries = vec![DhcpOption::ServerIdentifier(server_id)];
        let mut has_lease = false;

        for option in &config.options {
            match option {
                CatalogOption::Router => {
                    entries.push(DhcpOption::Router(address_list(*option, &config.router)?))
                }
                CatalogOption::SubnetMask => {
                    let mask = config.subnet_mask.ok_or_else(|| missing_value(*option))?;
                    entries.push(DhcpOption::SubnetMask(mask));
                }
                CatalogOption::Dns => {
                    entries.push(DhcpOption::DnsServer(address_list(*option, &config.dns)?))
                }
                CatalogOption::TimeServer => entries.push(DhcpOption::TimeServer(address_list(
                    *option,
                    &config.time_servers,
                )?)),
                CatalogOption::Lease => {
                    if has_lease {
                        continue;
                    }
                    has_lease = true;
                    let lease = config.lease_seconds.ok_or_else(|| missing_value(*option))?;
                    push_lease(&mut entries, lease);
                }
            }
        }

        if !has_lease {
            push_lease(&mut entries, config.lease());
        }

        let mut encoded = Vec::new();
        for entry in &entries {
            entry.encode_into(&mut encoded);
        }
        let server_identifier = entries[0].encode();

        Ok(Self {
            entries,
            encoded,
            server_identifier,
        })
    }

    /// Option bytes to splice into a reply of the given type.
    ///
    /// NAK carries only the server identifier.
    pub fn reply_options(&self, kind: MessageType) -> &[u8] {
        match kind {
            MessageType::Offer | MessageType::Ack => &self.encoded,
            _ => &self.server_identifier,
        }
    }

    pub fn entries(&self) -> &[DhcpOption] {
        &self.entries
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// The lease duration advertised in option 51.
    pub fn lease_seconds(&self) -> u32 {
        self.entries
            .iter()
            .find_map(|entry| match entry {
                DhcpOption::LeaseTime(secs) => Some(*secs),
                _ => None,
            })
            .unwrap_or(DEFAULT_LEASE_SECONDS)
    }
}

fn missing_value(option: CatalogOption) -> Error {
    Error::InvalidConfig(format!("Option {} is named but has no value", option))
}

fn address_list(option: CatalogOption, addrs: &[Ipv4Addr]) -> Result<Vec<Ipv4Addr>> {
    if addrs.is_empty() {
        return Err(missing_value(option));
    }
    if addrs.len() * 4 > u8::MAX as usize {
        return Err(Error::InvalidConfig(format!(
            "Option {} lists {} addresses, at most 63 fit",
            option,
            addrs.len()
        )));
    }
    Ok(addrs.to_vec())
}

fn push_lease(entries: &mut Vec<DhcpOption>, lease: u32) {
    entries.push(DhcpOption::LeaseTime(lease));
    entries.push(DhcpOption::RenewalTime(renewal_time(lease)));
    entries.push(DhcpOption::RebindingTime(rebinding_time(lease)));
}
