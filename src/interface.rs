//! Network interface lookup and raw Ethernet transmission.

use std::fmt;
use std::net::Ipv4Addr;

use pnet_datalink::{Channel, DataLinkSender};
use tracing::debug;

use crate::error::{Error, Result};
use crate::frame::{ETHERTYPE_IPV4, build_ethernet};
use crate::packet::HardwareAddress;

/// Sends an IPv4 datagram to a hardware address on the local link.
pub trait Transmit {
    fn transmit(&mut self, datagram: &[u8], destination: HardwareAddress) -> Result<()>;
}

/// A resolved local interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub mac: HardwareAddress,
    /// First IPv4 address assigned to the interface; used as the server
    /// identifier and reply source.
    pub ipv4: Ipv4Addr,
}

impl NetworkInterface {
    /// Looks up `name` among the system interfaces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Interface`] if the interface does not exist, has no
    /// hardware address, or has no IPv4 address.
    pub fn by_name(name: &str) -> Result<Self> {
        let interface = find_interface(name)?;

        let mac = interface
            .mac
            .map(|mac| HardwareAddress::new([mac.0, mac.1, mac.2, mac.3, mac.4, mac.5]))
            .ok_or_else(|| Error::Interface(format!("Interface {} has no MAC address", name)))?;

        let ipv4 = interface
            .ips
            .iter()
            .find_map(|network| match network {
                ipnetwork::IpNetwork::V4(v4) => Some(v4.ip()),
                ipnetwork::IpNetwork::V6(_) => None,
            })
            .ok_or_else(|| Error::Interface(format!("Interface {} has no IPv4 address", name)))?;

        Ok(Self {
            name: interface.name,
            mac,
            ipv4,
        })
    }
}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.mac, self.ipv4)
    }
}

fn find_interface(name: &str) -> Result<pnet_datalink::NetworkInterface> {
    pnet_datalink::interfaces()
        .into_iter()
        .find(|interface| interface.name == name)
        .ok_or_else(|| Error::Interface(format!("Interface {} not found", name)))
}

/// Writes Ethernet II frames through a datalink channel.
pub struct EthernetTransmitter {
    source: HardwareAddress,
    sender: Box<dyn DataLinkSender>,
}

impl EthernetTransmitter {
    /// Opens a datalink channel on the interface.
    ///
    /// Usually needs root or `CAP_NET_RAW`.
    pub fn open(interface: &NetworkInterface) -> Result<Self> {
        let datalink = find_interface(&interface.name)?;

        let sender = match pnet_datalink::channel(&datalink, Default::default()) {
            Ok(Channel::Ethernet(tx, _)) => tx,
            Ok(_) => return Err(Error::Interface("Unsupported channel type".to_string())),
            Err(e) => {
                return Err(Error::Interface(format!(
                    "Failed to open channel on {}: {}",
                    interface.name, e
                )));
            }
        };

        Ok(Self {
            source: interface.mac,
            sender,
        })
    }
}

impl Transmit for EthernetTransmitter {
    fn transmit(&mut self, datagram: &[u8], destination: HardwareAddress) -> Result<()> {
        let frame = build_ethernet(destination, self.source, ETHERTYPE_IPV4, datagram);
        debug!("Sending {} byte frame to {}", frame.len(), destination);

        self.sender
            .send_to(&frame, None)
            .ok_or_else(|| Error::Interface("Failed to send frame".to_string()))??;

        Ok(())
    }
}
