//! IPv4, UDP and Ethernet II framing.
//!
//! Replies are handed to the link layer as complete frames, so the server
//! builds the IP and UDP headers itself instead of relying on the host
//! socket stack. Both checksums are computed here.
//!
//! # IPv4 header (20 bytes, no options)
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Version|  IHL  |  DSCP/ECN     |          Total Length         |
//! |         Identification        |Flags|     Fragment Offset     |
//! |  Time to Live |    Protocol   |         Header Checksum       |
//! |                       Source Address                          |
//! |                    Destination Address                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::net::Ipv4Addr;

use crate::checksum::{
    PROTOCOL_UDP, internet_checksum, transport_checksum, verify_checksum,
    verify_transport_checksum,
};
use crate::error::{Error, Result};
use crate::packet::HardwareAddress;

/// IPv4 header length without options.
pub const IPV4_HEADER_SIZE: usize = 20;

/// UDP header length.
pub const UDP_HEADER_SIZE: usize = 8;

/// Ethernet II header length (destination + source + EtherType).
pub const ETHERNET_HEADER_SIZE: usize = 14;

/// Minimum Ethernet frame length, excluding the FCS.
pub const ETHERNET_MIN_FRAME_SIZE: usize = 60;

/// EtherType for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Version 4, IHL 5 (20-byte header).
const IPV4_VERSION_IHL: u8 = 0x45;

const IPV4_CHECKSUM_OFFSET: usize = 10;
const UDP_CHECKSUM_OFFSET: usize = 6;

/// TTL used for server replies.
pub const DEFAULT_TTL: u8 = 64;

/// UDP port the server listens on.
pub const DHCP_SERVER_PORT: u16 = 67;

/// UDP port clients listen on.
pub const DHCP_CLIENT_PORT: u16 = 68;

/// A decoded IPv4 datagram with a verified header checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Datagram {
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// Exactly `total_length - 20` bytes; trailing link padding is dropped.
    pub payload: Vec<u8>,
}

/// A decoded UDP datagram with a verified checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: Vec<u8>,
}

/// Wraps `payload` in a 20-byte IPv4 header.
///
/// Identification, flags and fragment offset are zero. The header checksum
/// is computed over the header with a zeroed checksum field and written
/// back at offset 10.
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the total length exceeds 65535.
pub fn build_ipv4(
    payload: &[u8],
    protocol: u8,
    ttl: u8,
    source: Ipv4Addr,
    destination: Ipv4Addr,
) -> Result<Vec<u8>> {
    let total_length = u16::try_from(IPV4_HEADER_SIZE + payload.len())
        .map_err(|_| Error::PayloadTooLarge(payload.len()))?;

    let mut packet = Vec::with_capacity(total_length as usize);
    packet.push(IPV4_VERSION_IHL);
    packet.push(0);
    packet.extend_from_slice(&total_length.to_be_bytes());
    packet.extend_from_slice(&[0, 0]);
    packet.extend_from_slice(&[0, 0]);
    packet.push(ttl);
    packet.push(protocol);
    packet.extend_from_slice(&[0, 0]);
    packet.extend_from_slice(&source.octets());
    packet.extend_from_slice(&destination.octets());

    let checksum = internet_checksum(&packet[..IPV4_HEADER_SIZE]);
    packet[IPV4_CHECKSUM_OFFSET..IPV4_CHECKSUM_OFFSET + 2]
        .copy_from_slice(&checksum.to_be_bytes());

    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Wraps `payload` in an 8-byte UDP header with a pseudo-header checksum.
///
/// A computed checksum of zero is sent as `0xFFFF`, since zero on the wire
/// means "no checksum".
///
/// # Errors
///
/// Returns [`Error::PayloadTooLarge`] if the UDP length exceeds 65535.
pub fn build_udp(
    payload: &[u8],
    source_port: u16,
    destination_port: u16,
    source: Ipv4Addr,
    destination: Ipv4Addr,
) -> Result<Vec<u8>> {
    let length = u16::try_from(UDP_HEADER_SIZE + payload.len())
        .map_err(|_| Error::PayloadTooLarge(payload.len()))?;

    let mut datagram = Vec::with_capacity(length as usize);
    datagram.extend_from_slice(&source_port.to_be_bytes());
    datagram.extend_from_slice(&destination_port.to_be_bytes());
    datagram.extend_from_slice(&length.to_be_bytes());
    datagram.extend_from_slice(&[0, 0]);
    datagram.extend_from_slice(payload);

    let checksum = match transport_checksum(
        &source.octets(),
        &destination.octets(),
        PROTOCOL_UDP,
        &datagram,
    ) {
        0 => 0xFFFF,
        value => value,
    };
    datagram[UDP_CHECKSUM_OFFSET..UDP_CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_be_bytes());

    Ok(datagram)
}

/// Frames a DHCP reply as UDP 67 -> 68 inside IPv4.
pub fn frame_reply(payload: &[u8], server_ip: Ipv4Addr, client_ip: Ipv4Addr) -> Result<Vec<u8>> {
    let udp = build_udp(
        payload,
        DHCP_SERVER_PORT,
        DHCP_CLIENT_PORT,
        server_ip,
        client_ip,
    )?;
    build_ipv4(&udp, PROTOCOL_UDP, DEFAULT_TTL, server_ip, client_ip)
}

/// Decodes an IPv4 datagram and verifies its header checksum.
///
/// Only the declared total length is kept; anything beyond it (Ethernet
/// padding) is discarded.
///
/// # Errors
///
/// - [`Error::InvalidPacket`] if the buffer is shorter than the header or
///   the declared length, or the version/IHL is not supported.
/// - [`Error::ChecksumMismatch`] if the header checksum does not verify.
pub fn parse_ipv4(data: &[u8]) -> Result<Ipv4Datagram> {
    let header = data.get(..IPV4_HEADER_SIZE).ok_or_else(|| {
        Error::InvalidPacket(format!("IPv4 header truncated: {} bytes", data.len()))
    })?;

    if header[0] >> 4 != 4 {
        return Err(Error::InvalidPacket(format!(
            "Not an IPv4 packet (version {})",
            header[0] >> 4
        )));
    }

    let header_length = ((header[0] & 0x0F) as usize) * 4;
    if header_length < IPV4_HEADER_SIZE {
        return Err(Error::InvalidPacket(format!(
            "Invalid IPv4 header length {}",
            header_length
        )));
    }

    let total_length = u16::from_be_bytes([header[2], header[3]]) as usize;
    if total_length < header_length || total_length > data.len() {
        return Err(Error::InvalidPacket(format!(
            "IPv4 total length {} does not fit buffer of {} bytes",
            total_length,
            data.len()
        )));
    }

    let datagram = &data[..total_length];
    if !verify_checksum(&datagram[..header_length]) {
        return Err(Error::ChecksumMismatch("IPv4 header"));
    }

    Ok(Ipv4Datagram {
        ttl: header[8],
        protocol: header[9],
        source: Ipv4Addr::new(header[12], header[13], header[14], header[15]),
        destination: Ipv4Addr::new(header[16], header[17], header[18], header[19]),
        payload: datagram[header_length..].to_vec(),
    })
}

/// Decodes a UDP datagram carried between `source` and `destination`.
///
/// # Errors
///
/// - [`Error::InvalidPacket`] if the declared length is shorter than the
///   header or longer than the buffer.
/// - [`Error::ChecksumMismatch`] if a non-zero checksum does not verify.
pub fn parse_udp(data: &[u8], source: Ipv4Addr, destination: Ipv4Addr) -> Result<UdpDatagram> {
    let header = data.get(..UDP_HEADER_SIZE).ok_or_else(|| {
        Error::InvalidPacket(format!("UDP header truncated: {} bytes", data.len()))
    })?;

    let length = u16::from_be_bytes([header[4], header[5]]) as usize;
    if length < UDP_HEADER_SIZE || length > data.len() {
        return Err(Error::InvalidPacket(format!(
            "UDP length {} does not fit buffer of {} bytes",
            length,
            data.len()
        )));
    }

    let datagram = &data[..length];
    let checksum = u16::from_be_bytes([header[6], header[7]]);
    if checksum != 0
        && !verify_transport_checksum(
            &source.octets(),
            &destination.octets(),
            PROTOCOL_UDP,
            datagram,
        )
    {
        return Err(Error::ChecksumMismatch("UDP"));
    }

    Ok(UdpDatagram {
        source_port: u16::from_be_bytes([header[0], header[1]]),
        destination_port: u16::from_be_bytes([header[2], header[3]]),
        payload: datagram[UDP_HEADER_SIZE..].to_vec(),
    })
}

/// Builds an Ethernet II frame, padded to the 60-byte minimum.
pub fn build_ethernet(
    destination: HardwareAddress,
    source: HardwareAddress,
    ethertype: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::with_capacity((ETHERNET_HEADER_SIZE + payload.len()).max(ETHERNET_MIN_FRAME_SIZE));
    frame.extend_from_slice(destination.as_bytes());
    frame.extend_from_slice(source.as_bytes());
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);

    if frame.len() < ETHERNET_MIN_FRAME_SIZE {
        frame.resize(ETHERNET_MIN_FRAME_SIZE, 0);
    }

    frame
}
