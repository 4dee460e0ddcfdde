use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::catalog::{CatalogOption, DEFAULT_LEASE_SECONDS};
use crate::error::{Error, Result};

/// Server configuration read from a `key=value` text file.
///
/// ```text
/// # pool and link
/// addresses=10.0.0.10-10.0.0.200
/// interface=eth0
/// router=10.0.0.1
/// subnetmask=255.255.255.0
/// dns=1.1.1.1,8.8.8.8
/// timesvr=10.0.0.5
/// lease=3600
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub range_first: Ipv4Addr,
    pub range_last: Ipv4Addr,
    pub interface: String,
    #[serde(default)]
    pub router: Vec<Ipv4Addr>,
    #[serde(default)]
    pub subnet_mask: Option<Ipv4Addr>,
    #[serde(default)]
    pub dns: Vec<Ipv4Addr>,
    #[serde(default)]
    pub time_servers: Vec<Ipv4Addr>,
    #[serde(default)]
    pub lease_seconds: Option<u32>,
    /// Options in the order they first appear in the file.
    #[serde(default)]
    pub options: Vec<CatalogOption>,
}

fn parse_address(key: &str, value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("Invalid address for {}: {}", key, value)))
}

fn parse_address_list(key: &str, value: &str) -> Result<Vec<Ipv4Addr>> {
    value
        .split(',')
        .map(|part| parse_address(key, part))
        .collect()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates configuration text.
    ///
    /// Blank lines and lines starting with `#` are skipped. A repeated key
    /// overrides the earlier value.
    pub fn parse(content: &str) -> Result<Self> {
        let mut range = None;
        let mut interface = None;
        let mut router = Vec::new();
        let mut subnet_mask = None;
        let mut dns = Vec::new();
        let mut time_servers = Vec::new();
        let mut lease_seconds = None;
        let mut options = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::InvalidConfig(format!("Line {}: expected key=value: {}", index + 1, line))
            })?;
            let key = key.trim();
            let value = value.trim();

            match key {
                "addresses" => {
                    let (first, last) = value.split_once('-').ok_or_else(|| {
                        Error::InvalidConfig(format!("Invalid address range: {}", value))
                    })?;
                    range = Some((parse_address(key, first)?, parse_address(key, last)?));
                    continue;
                }
                "interface" => {
                    interface = Some(value.to_string());
                    continue;
                }
                _ => {}
            }

            let option: CatalogOption = key.parse().map_err(|_| {
                Error::InvalidConfig(format!("Line {}: unknown setting: {}", index + 1, key))
            })?;

            match option {
                CatalogOption::Router => router = parse_address_list(key, value)?,
                CatalogOption::SubnetMask => subnet_mask = Some(parse_address(key, value)?),
                CatalogOption::Dns => dns = parse_address_list(key, value)?,
                CatalogOption::TimeServer => time_servers = parse_address_list(key, value)?,
                CatalogOption::Lease => {
                    let seconds = value.parse().map_err(|_| {
                        Error::InvalidConfig(format!("Invalid lease time: {}", value))
                    })?;
                    lease_seconds = Some(seconds);
                }
            }

            if !options.contains(&option) {
                options.push(option);
            }
        }

        let (range_first, range_last) =
            range.ok_or_else(|| Error::InvalidConfig("No address range provided".to_string()))?;
        let interface =
            interface.ok_or_else(|| Error::InvalidConfig("No interface provided".to_string()))?;

        let config = Self {
            range_first,
            range_last,
            interface,
            router,
            subnet_mask,
            dns,
            time_servers,
            lease_seconds,
            options,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if u32::from(self.range_first) > u32::from(self.range_last) {
            return Err(Error::InvalidConfig(format!(
                "Address range {}-{} is empty",
                self.range_first, self.range_last
            )));
        }

        if self.interface.is_empty() {
            return Err(Error::InvalidConfig("Interface name is empty".to_string()));
        }

        if self.lease_seconds == Some(0) {
            return Err(Error::InvalidConfig(
                "Lease time must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Rejects a server address that the pool could hand to a client.
    pub fn validate_server_address(&self, server_ip: Ipv4Addr) -> Result<()> {
        if self.in_range(server_ip) {
            return Err(Error::InvalidConfig(format!(
                "Server address {} is inside the pool {}-{}",
                server_ip, self.range_first, self.range_last
            )));
        }
        Ok(())
    }

    pub fn in_range(&self, ip: Ipv4Addr) -> bool {
        (u32::from(self.range_first)..=u32::from(self.range_last)).contains(&u32::from(ip))
    }

    pub fn lease(&self) -> u32 {
        self.lease_seconds.unwrap_or(DEFAULT_LEASE_SECONDS)
    }
}
