//! DHCP message codec (RFC 2131).
//!
//! A message is a fixed 236-byte header, the 4-byte magic cookie and a
//! sequence of TLV options terminated by End (255).
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! |                          yiaddr (4)                           |
//! |                          siaddr (4)                           |
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                     chaddr (16)  @ 28                         |
//! |                     sname  (64)  @ 44                         |
//! |                     file  (128)  @ 108                        |
//! +---------------------------------------------------------------+
//! |             magic cookie (4) = 99.130.83.99  @ 236            |
//! +---------------------------------------------------------------+
//! |                       options (variable) @ 240                |
//! +---------------------------------------------------------------+
//! ```
//!
//! Every read from an inbound buffer goes through [`Reader`], which turns
//! an out-of-bounds access into [`Error::InvalidPacket`].

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::options::{DhcpOption, MessageType, OptionCode};

/// Identifies DHCP (as opposed to plain BOOTP) in the options area.
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const DHCP_CHADDR_SIZE: usize = 16;
const DHCP_SNAME_SIZE: usize = 64;
const DHCP_FILE_SIZE: usize = 128;

/// Length of the fixed header, i.e. the offset of the magic cookie.
pub const DHCP_HEADER_SIZE: usize = 236;

/// Offset of the first option byte.
pub const DHCP_OPTIONS_OFFSET: usize = DHCP_HEADER_SIZE + DHCP_MAGIC_COOKIE.len();

/// BOOTP minimum message size; shorter replies are zero padded.
pub const DHCP_MIN_PACKET_SIZE: usize = 300;

/// 576 bytes is the datagram size every host must accept (RFC 791).
const DHCP_ENCODE_CAPACITY: usize = 576;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;

pub const HTYPE_ETHERNET: u8 = 1;
pub const HLEN_ETHERNET: u8 = 6;

/// Broadcast bit in `flags`.
pub const FLAG_BROADCAST: u16 = 0x8000;

/// A 6-byte Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HardwareAddress([u8; 6]);

impl HardwareAddress {
    pub const BROADCAST: Self = Self([0xFF; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Lowercase hex without separators, e.g. `aabbccddee01`.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{:02x}", byte)).collect()
    }
}

impl From<[u8; 6]> for HardwareAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

/// Bounds-checked cursor over untrusted bytes.
struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::InvalidPacket(format!(
                    "Need {} bytes at offset {}, only {} available",
                    count,
                    self.position,
                    self.remaining()
                ))
            })?;
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn ipv4(&mut self) -> Result<Ipv4Addr> {
        Ok(Ipv4Addr::from(self.array::<4>()?))
    }
}

/// A DHCP message.
///
/// Option 53 lives in [`message_type`](Self::message_type) rather than in
/// [`options`](Self::options); the encoder writes it last, just before End.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPacket {
    /// [`BOOTREQUEST`] or [`BOOTREPLY`].
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    /// Bit 15 is the broadcast flag.
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub message_type: Option<MessageType>,
    pub options: Vec<DhcpOption>,
}

impl DhcpPacket {
    /// Decodes a DHCP message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if:
    /// - the buffer is shorter than 240 bytes (header + cookie)
    /// - `hlen` exceeds the 16-byte `chaddr` field
    /// - the magic cookie is not 99.130.83.99
    /// - an option length runs past the end of its area
    /// - a fixed-size option has the wrong length or an invalid value
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DHCP_OPTIONS_OFFSET {
            return Err(Error::InvalidPacket(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                DHCP_OPTIONS_OFFSET
            )));
        }

        let mut reader = Reader::new(data);
        let op = reader.u8()?;
        let htype = reader.u8()?;
        let hlen = reader.u8()?;
        let hops = reader.u8()?;

        if hlen as usize > DHCP_CHADDR_SIZE {
            return Err(Error::InvalidPacket(format!(
                "Hardware address length {} exceeds {}",
                hlen, DHCP_CHADDR_SIZE
            )));
        }

        let xid = reader.u32()?;
        let secs = reader.u16()?;
        let flags = reader.u16()?;
        let ciaddr = reader.ipv4()?;
        let yiaddr = reader.ipv4()?;
        let siaddr = reader.ipv4()?;
        let giaddr = reader.ipv4()?;
        let chaddr = reader.array::<DHCP_CHADDR_SIZE>()?;
        let sname = reader.array::<DHCP_SNAME_SIZE>()?;
        let file = reader.array::<DHCP_FILE_SIZE>()?;

        if reader.array::<4>()? != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidPacket("Invalid magic cookie".to_string()));
        }

        let mut packet = Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            message_type: None,
            options: Vec::new(),
        };

        packet.scan_options(&data[DHCP_OPTIONS_OFFSET..])?;

        let overload = packet.options.iter().find_map(|option| match option {
            DhcpOption::OptionOverload(flag) => Some(*flag),
            _ => None,
        });

        if let Some(overload) = overload {
            if overload.covers_file() {
                packet.scan_options(&file)?;
            }
            if overload.covers_sname() {
                packet.scan_options(&sname)?;
            }
        }

        Ok(packet)
    }

    /// Appends the options found in `area` until End or the end of the area.
    ///
    /// The first message type seen is lifted into `message_type`; repeats
    /// are ignored.
    fn scan_options(&mut self, area: &[u8]) -> Result<()> {
        let mut reader = Reader::new(area);

        while reader.remaining() > 0 {
            let code = reader.u8()?;

            if code == OptionCode::Pad as u8 {
                continue;
            }
            if code == OptionCode::End as u8 {
                break;
            }

            let length = reader
                .u8()
                .map_err(|_| Error::InvalidPacket(format!("Option {} length missing", code)))?;
            let value = reader
                .take(length as usize)
                .map_err(|_| Error::InvalidPacket(format!("Option {} data truncated", code)))?;

            match DhcpOption::parse(code, value)? {
                DhcpOption::MessageType(msg_type) => {
                    self.message_type.get_or_insert(msg_type);
                }
                option => self.options.push(option),
            }
        }

        Ok(())
    }

    /// Encodes the message with only its own options.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_with(&[])
    }

    /// Encodes the message, splicing pre-encoded option bytes right after
    /// the magic cookie.
    ///
    /// Layout: cookie, `extra`, the packet's own options, `(53, 1, type)`,
    /// End.
    ///
    /// `extra` must be a sequence of complete TLV records without an End
    /// marker. The result is padded to [`DHCP_MIN_PACKET_SIZE`].
    pub fn encode_with(&self, extra: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(DHCP_ENCODE_CAPACITY);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);
        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());
        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());
        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);
        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        packet.extend_from_slice(extra);
        for option in &self.options {
            option.encode_into(&mut packet);
        }
        if let Some(msg_type) = self.message_type {
            DhcpOption::MessageType(msg_type).encode_into(&mut packet);
        }
        packet.push(OptionCode::End as u8);

        if packet.len() < DHCP_MIN_PACKET_SIZE {
            packet.resize(DHCP_MIN_PACKET_SIZE, 0);
        }

        packet
    }

    /// Requested IP address (option 50).
    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::RequestedIpAddress(ip) => Some(*ip),
            _ => None,
        })
    }

    /// Server identifier (option 54). Present in a REQUEST that answers
    /// an OFFER.
    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::ServerIdentifier(ip) => Some(*ip),
            _ => None,
        })
    }

    pub fn hostname(&self) -> Option<&str> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::Hostname(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn parameter_request_list(&self) -> Option<&[u8]> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::ParameterRequestList(params) => Some(params.as_slice()),
            _ => None,
        })
    }

    /// Raw option 53 value when it names no known message type.
    pub fn unknown_message_type(&self) -> Option<u8> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::Unknown(code, data) if *code == OptionCode::MessageType as u8 => {
                data.first().copied()
            }
            _ => None,
        })
    }

    /// The first six bytes of `chaddr`.
    pub fn hardware_address(&self) -> HardwareAddress {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&self.chaddr[..6]);
        HardwareAddress::new(octets)
    }

    pub fn is_broadcast(&self) -> bool {
        (self.flags & FLAG_BROADCAST) != 0
    }

    /// Builds a server reply to `request`.
    ///
    /// The reply is an Ethernet BOOTREPLY that echoes `xid`, `flags`,
    /// `giaddr` and `chaddr`. Configuration options are not added here;
    /// they are spliced in by [`encode_with`](Self::encode_with).
    pub fn create_reply(
        request: &DhcpPacket,
        message_type: MessageType,
        your_ip: Ipv4Addr,
        server_ip: Ipv4Addr,
    ) -> Self {
        Self {
            op: BOOTREPLY,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: your_ip,
            siaddr: server_ip,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            message_type: Some(message_type),
            options: Vec::new(),
        }
    }
}
