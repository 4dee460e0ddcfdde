//! DHCP options (RFC 2132) carried in the variable part of a message.
//!
//! Every option is a TLV record: one byte of code, one byte of length and
//! `length` bytes of data. Pad (0) and End (255) are single bytes with no
//! length and never appear as [`DhcpOption`] values.
//!
//! Codes the server does not interpret are kept as [`DhcpOption::Unknown`]
//! so that a decoded message re-encodes to the same option list.

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Largest address list that fits a one-byte length field.
const MAX_ADDRESSES_PER_OPTION: usize = 63;

/// Option codes understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    Router = 3,
    TimeServer = 4,
    DnsServer = 6,
    Hostname = 12,
    RequestedIpAddress = 50,
    LeaseTime = 51,
    OptionOverload = 52,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    RenewalTime = 58,
    RebindingTime = 59,
    ClientIdentifier = 61,
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            4 => Ok(Self::TimeServer),
            6 => Ok(Self::DnsServer),
            12 => Ok(Self::Hostname),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::LeaseTime),
            52 => Ok(Self::OptionOverload),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            58 => Ok(Self::RenewalTime),
            59 => Ok(Self::RebindingTime),
            61 => Ok(Self::ClientIdentifier),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

/// DHCP message types (option 53).
///
/// The server answers DISCOVER, REQUEST and RELEASE; the remaining client
/// types decode fine and are dropped by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discover => "DISCOVER",
            Self::Offer => "OFFER",
            Self::Request => "REQUEST",
            Self::Decline => "DECLINE",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
            Self::Release => "RELEASE",
            Self::Inform => "INFORM",
        };
        f.write_str(name)
    }
}

/// Option overload (option 52): which header fields carry extra options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OverloadFlag {
    File = 1,
    Sname = 2,
    Both = 3,
}

impl OverloadFlag {
    pub fn covers_file(self) -> bool {
        matches!(self, Self::File | Self::Both)
    }

    pub fn covers_sname(self) -> bool {
        matches!(self, Self::Sname | Self::Both)
    }
}

impl TryFrom<u8> for OverloadFlag {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::File),
            2 => Ok(Self::Sname),
            3 => Ok(Self::Both),
            other => Err(other),
        }
    }
}

/// A decoded DHCP option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    /// Option 1.
    SubnetMask(Ipv4Addr),
    /// Option 3. The first address is the default gateway.
    Router(Vec<Ipv4Addr>),
    /// Option 4.
    TimeServer(Vec<Ipv4Addr>),
    /// Option 6.
    DnsServer(Vec<Ipv4Addr>),
    /// Option 12.
    Hostname(String),
    /// Option 50.
    RequestedIpAddress(Ipv4Addr),
    /// Option 51, seconds.
    LeaseTime(u32),
    /// Option 52.
    OptionOverload(OverloadFlag),
    /// Option 53. Lifted into [`DhcpPacket::message_type`] while decoding.
    ///
    /// [`DhcpPacket::message_type`]: crate::packet::DhcpPacket::message_type
    MessageType(MessageType),
    /// Option 54.
    ServerIdentifier(Ipv4Addr),
    /// Option 55.
    ParameterRequestList(Vec<u8>),
    /// Option 58, T1 seconds.
    RenewalTime(u32),
    /// Option 59, T2 seconds.
    RebindingTime(u32),
    /// Option 61.
    ClientIdentifier(Vec<u8>),
    /// Any other code with its raw data.
    Unknown(u8, Vec<u8>),
}

fn single_address(data: &[u8], what: &str) -> Result<Ipv4Addr> {
    match <[u8; 4]>::try_from(data) {
        Ok(octets) => Ok(Ipv4Addr::from(octets)),
        Err(_) => Err(Error::InvalidPacket(format!(
            "Invalid {} length: {}",
            what,
            data.len()
        ))),
    }
}

fn address_list(data: &[u8], what: &str) -> Result<Vec<Ipv4Addr>> {
    if data.is_empty() || !data.len().is_multiple_of(4) {
        return Err(Error::InvalidPacket(format!(
            "Invalid {} length: {}",
            what,
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]))
        .collect())
}

fn seconds(data: &[u8], what: &str) -> Result<u32> {
    match <[u8; 4]>::try_from(data) {
        Ok(bytes) => Ok(u32::from_be_bytes(bytes)),
        Err(_) => Err(Error::InvalidPacket(format!(
            "Invalid {} length: {}",
            what,
            data.len()
        ))),
    }
}

fn single_byte(data: &[u8], what: &str) -> Result<u8> {
    match data {
        [value] => Ok(*value),
        _ => Err(Error::InvalidPacket(format!(
            "Invalid {} length: {}",
            what,
            data.len()
        ))),
    }
}

/// Appends one TLV record, truncating data to 255 bytes.
pub(crate) fn push_tlv(buffer: &mut Vec<u8>, code: u8, data: &[u8]) {
    let len = data.len().min(u8::MAX as usize);
    buffer.push(code);
    buffer.push(len as u8);
    buffer.extend_from_slice(&data[..len]);
}

fn push_addresses(buffer: &mut Vec<u8>, code: u8, addrs: &[Ipv4Addr]) {
    let data: Vec<u8> = addrs
        .iter()
        .take(MAX_ADDRESSES_PER_OPTION)
        .flat_map(|addr| addr.octets())
        .collect();
    push_tlv(buffer, code, &data);
}

impl DhcpOption {
    /// Returns the option code this value is encoded under.
    pub fn option_code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::Router(_) => OptionCode::Router as u8,
            Self::TimeServer(_) => OptionCode::TimeServer as u8,
            Self::DnsServer(_) => OptionCode::DnsServer as u8,
            Self::Hostname(_) => OptionCode::Hostname as u8,
            Self::RequestedIpAddress(_) => OptionCode::RequestedIpAddress as u8,
            Self::LeaseTime(_) => OptionCode::LeaseTime as u8,
            Self::OptionOverload(_) => OptionCode::OptionOverload as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
            Self::ParameterRequestList(_) => OptionCode::ParameterRequestList as u8,
            Self::RenewalTime(_) => OptionCode::RenewalTime as u8,
            Self::RebindingTime(_) => OptionCode::RebindingTime as u8,
            Self::ClientIdentifier(_) => OptionCode::ClientIdentifier as u8,
            Self::Unknown(code, _) => *code,
        }
    }

    /// Decodes the data of a single option.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] when a fixed-size option has the
    /// wrong length, an address list is empty or not a multiple of four,
    /// or the overload value is out of range. A message type outside 1..=8
    /// is kept as [`DhcpOption::Unknown`] so the message still decodes.
    pub fn parse(code: u8, data: &[u8]) -> Result<Self> {
        let option = match OptionCode::try_from(code) {
            Ok(OptionCode::SubnetMask) => Self::SubnetMask(single_address(data, "subnet mask")?),
            Ok(OptionCode::Router) => Self::Router(address_list(data, "router")?),
            Ok(OptionCode::TimeServer) => Self::TimeServer(address_list(data, "time server")?),
            Ok(OptionCode::DnsServer) => Self::DnsServer(address_list(data, "DNS server")?),
            Ok(OptionCode::Hostname) => Self::Hostname(String::from_utf8_lossy(data).into_owned()),
            Ok(OptionCode::RequestedIpAddress) => {
                Self::RequestedIpAddress(single_address(data, "requested IP address")?)
            }
            Ok(OptionCode::LeaseTime) => Self::LeaseTime(seconds(data, "lease time")?),
            Ok(OptionCode::OptionOverload) => {
                let value = single_byte(data, "option overload")?;
                let flag = OverloadFlag::try_from(value).map_err(|value| {
                    Error::InvalidPacket(format!("Invalid option overload value: {}", value))
                })?;
                Self::OptionOverload(flag)
            }
            Ok(OptionCode::MessageType) => {
                let value = single_byte(data, "message type")?;
                match MessageType::try_from(value) {
                    Ok(msg_type) => Self::MessageType(msg_type),
                    Err(unknown) => Self::Unknown(code, vec![unknown]),
                }
            }
            Ok(OptionCode::ServerIdentifier) => {
                Self::ServerIdentifier(single_address(data, "server identifier")?)
            }
            Ok(OptionCode::ParameterRequestList) => Self::ParameterRequestList(data.to_vec()),
            Ok(OptionCode::RenewalTime) => Self::RenewalTime(seconds(data, "renewal time")?),
            Ok(OptionCode::RebindingTime) => Self::RebindingTime(seconds(data, "rebinding time")?),
            Ok(OptionCode::ClientIdentifier) => Self::ClientIdentifier(data.to_vec()),
            Ok(OptionCode::Pad) | Ok(OptionCode::End) => {
                return Err(Error::InvalidPacket(format!(
                    "Option code {} carries no data",
                    code
                )));
            }
            Err(unknown) => Self::Unknown(unknown, data.to_vec()),
        };
        Ok(option)
    }

    /// Appends the TLV encoding of this option to `buffer`.
    pub fn encode_into(&self, buffer: &mut Vec<u8>) {
        let code = self.option_code();
        match self {
            Self::SubnetMask(addr)
            | Self::RequestedIpAddress(addr)
            | Self::ServerIdentifier(addr) => push_tlv(buffer, code, &addr.octets()),
            Self::Router(addrs) | Self::TimeServer(addrs) | Self::DnsServer(addrs) => {
                push_addresses(buffer, code, addrs)
            }
            Self::Hostname(name) => push_tlv(buffer, code, name.as_bytes()),
            Self::LeaseTime(secs) | Self::RenewalTime(secs) | Self::RebindingTime(secs) => {
                push_tlv(buffer, code, &secs.to_be_bytes())
            }
            Self::OptionOverload(flag) => push_tlv(buffer, code, &[*flag as u8]),
            Self::MessageType(msg_type) => push_tlv(buffer, code, &[*msg_type as u8]),
            Self::ParameterRequestList(data)
            | Self::ClientIdentifier(data)
            | Self::Unknown(_, data) => push_tlv(buffer, code, data),
        }
    }

    /// Encodes the option to its wire format (code + length + data).
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.encode_into(&mut buffer);
        buffer
    }
}
