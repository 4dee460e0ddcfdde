//! DHCP protocol engine.
//!
//! Turns decoded client messages into replies:
//!
//! | request  | outcome                                        |
//! |----------|------------------------------------------------|
//! | DISCOVER | OFFER of a reserved address, NAK if the pool is empty |
//! | REQUEST  | ACK of the client's binding, NAK otherwise     |
//! | RELEASE  | binding dropped, no reply                      |
//! | other    | logged and dropped                             |
//!
//! The engine owns the [`Leases`] allocator and is driven by a single
//! caller at a time; it performs no I/O.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::catalog::OptionCatalog;
use crate::checksum::PROTOCOL_UDP;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame::{self, DHCP_SERVER_PORT};
use crate::lease::{BindingState, Leases};
use crate::options::MessageType;
use crate::packet::{BOOTREQUEST, DhcpPacket, HardwareAddress};

/// Where a reply is delivered on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub ip: Ipv4Addr,
    pub mac: HardwareAddress,
}

impl Destination {
    pub const BROADCAST: Self = Self {
        ip: Ipv4Addr::BROADCAST,
        mac: HardwareAddress::BROADCAST,
    };

    /// NAKs and requests with the broadcast flag go to everyone; otherwise
    /// the client's current address (`ciaddr`) is preferred over the one
    /// being assigned.
    fn for_reply(request: &DhcpPacket, kind: MessageType, your_ip: Ipv4Addr) -> Self {
        if kind == MessageType::Nak || request.is_broadcast() {
            return Self::BROADCAST;
        }

        let ip = if request.ciaddr.is_unspecified() {
            your_ip
        } else {
            request.ciaddr
        };

        Self {
            ip,
            mac: request.hardware_address(),
        }
    }
}

/// An encoded DHCP reply ready for framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message_type: MessageType,
    pub your_ip: Ipv4Addr,
    /// The encoded DHCP message.
    pub payload: Vec<u8>,
    pub destination: Destination,
}

impl Reply {
    /// Wraps the payload in UDP 67 -> 68 and IPv4 addressed to the
    /// destination.
    pub fn to_ip_packet(&self, server_ip: Ipv4Addr) -> Result<Vec<u8>> {
        frame::frame_reply(&self.payload, server_ip, self.destination.ip)
    }
}

#[derive(Debug)]
pub struct Engine {
    leases: Leases,
    catalog: Arc<OptionCatalog>,
    server_ip: Ipv4Addr,
}

impl Engine {
    pub fn new(leases: Leases, catalog: Arc<OptionCatalog>, server_ip: Ipv4Addr) -> Self {
        Self {
            leases,
            catalog,
            server_ip,
        }
    }

    /// Builds the allocator and option catalog for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the server address lies inside
    /// the pool or the catalog cannot be built.
    pub fn from_config(config: &Config, server_ip: Ipv4Addr) -> Result<Self> {
        config.validate_server_address(server_ip)?;

        let catalog = Arc::new(OptionCatalog::build(config, server_ip)?);
        let leases = Leases::new(config.range_first, config.range_last, catalog.lease_seconds())?;

        Ok(Self::new(leases, catalog, server_ip))
    }

    pub fn leases(&self) -> &Leases {
        &self.leases
    }

    pub fn catalog(&self) -> &OptionCatalog {
        &self.catalog
    }

    pub fn server_ip(&self) -> Ipv4Addr {
        self.server_ip
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        self.leases.expire(now)
    }

    /// Handles an IPv4 packet carrying a UDP datagram.
    ///
    /// Non-UDP packets and datagrams not addressed to port 67 are ignored.
    ///
    /// # Errors
    ///
    /// Returns the decode error if the IPv4, UDP or DHCP layer is malformed
    /// or fails its checksum.
    pub fn handle_ip_packet(&mut self, bytes: &[u8], now: DateTime<Utc>) -> Result<Option<Reply>> {
        let ip = frame::parse_ipv4(bytes)?;
        if ip.protocol != PROTOCOL_UDP {
            debug!("Ignoring IP protocol {} from {}", ip.protocol, ip.source);
            return Ok(None);
        }

        let udp = frame::parse_udp(&ip.payload, ip.source, ip.destination)?;
        if udp.destination_port != DHCP_SERVER_PORT {
            debug!("Ignoring UDP datagram for port {}", udp.destination_port);
            return Ok(None);
        }

        self.handle_datagram(&udp.payload, now)
    }

    /// Decodes a DHCP message and dispatches it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if the message cannot be decoded.
    pub fn handle_datagram(&mut self, bytes: &[u8], now: DateTime<Utc>) -> Result<Option<Reply>> {
        let packet = DhcpPacket::parse(bytes)?;
        Ok(self.handle_packet(&packet, now))
    }

    pub fn handle_packet(&mut self, packet: &DhcpPacket, now: DateTime<Utc>) -> Option<Reply> {
        let mac = packet.hardware_address();

        if packet.op != BOOTREQUEST {
            debug!("Dropping BOOTREPLY from {}", mac);
            return None;
        }

        let Some(message_type) = packet.message_type else {
            match packet.unknown_message_type() {
                Some(code) => warn!("Ignoring unknown message type {} from {}", code, mac),
                None => debug!("Dropping message without type from {}", mac),
            }
            return None;
        };

        match packet.hostname() {
            Some(hostname) => info!(
                "{} from {} ({}, xid {:#010x})",
                message_type, mac, hostname, packet.xid
            ),
            None => info!("{} from {} (xid {:#010x})", message_type, mac, packet.xid),
        }
        if let Some(params) = packet.parameter_request_list() {
            debug!("{} requested options {:?}", mac, params);
        }

        match message_type {
            MessageType::Discover => Some(self.handle_discover(packet, now)),
            MessageType::Request => self.handle_request(packet, now),
            MessageType::Release => {
                self.handle_release(packet);
                None
            }
            _ => {
                warn!("Ignoring {} message from {}", message_type, mac);
                None
            }
        }
    }

    fn handle_discover(&mut self, packet: &DhcpPacket, now: DateTime<Utc>) -> Reply {
        let mac = packet.hardware_address();

        match self.leases.allocate(mac, now) {
            Ok(address) => {
                info!("OFFER {} to {}", address, mac);
                self.reply(packet, MessageType::Offer, address)
            }
            Err(error) => {
                warn!("Cannot offer an address to {}: {}", mac, error);
                self.nak(packet)
            }
        }
    }

    fn handle_request(&mut self, packet: &DhcpPacket, now: DateTime<Utc>) -> Option<Reply> {
        let mac = packet.hardware_address();

        if let Some(server_id) = packet.server_identifier()
            && server_id != self.server_ip
        {
            info!("REQUEST from {} is for server {}", mac, server_id);
            if self
                .leases
                .binding(&mac)
                .is_some_and(|binding| binding.state == BindingState::Offered)
                && let Some(address) = self.leases.release(mac)
            {
                info!("Withdrawing offer of {} to {}", address, mac);
            }
            return None;
        }

        let requested = packet
            .requested_ip()
            .or((!packet.ciaddr.is_unspecified()).then_some(packet.ciaddr));

        if let (Some(requested), Some(binding)) = (requested, self.leases.binding(&mac))
            && requested != binding.address
        {
            warn!(
                "NAK to {}: requested {} but holds {}",
                mac, requested, binding.address
            );
            return Some(self.nak(packet));
        }

        if let Some(binding) = self.leases.binding(&mac)
            && binding.state == BindingState::Bound
        {
            debug!(
                "Renewing {} for {} ({} seconds left)",
                binding.address,
                mac,
                binding.remaining_seconds(now)
            );
        }

        match self.leases.confirm(mac, now) {
            Ok(address) => {
                info!(
                    "ACK {} to {} (lease: {} seconds)",
                    address,
                    mac,
                    self.catalog.lease_seconds()
                );
                Some(self.reply(packet, MessageType::Ack, address))
            }
            Err(error @ (Error::UnknownBinding(_) | Error::PoolExhausted)) => {
                warn!("NAK to {}: {}", mac, error);
                Some(self.nak(packet))
            }
            Err(error) => {
                warn!("REQUEST from {} failed: {}", mac, error);
                None
            }
        }
    }

    fn handle_release(&mut self, packet: &DhcpPacket) {
        let mac = packet.hardware_address();

        if let Some(server_id) = packet.server_identifier()
            && server_id != self.server_ip
        {
            debug!("RELEASE from {} is for server {}", mac, server_id);
            return;
        }

        if let Some(binding) = self.leases.binding(&mac)
            && !packet.ciaddr.is_unspecified()
            && packet.ciaddr != binding.address
        {
            warn!(
                "RELEASE from {} names {} but holds {}",
                mac, packet.ciaddr, binding.address
            );
            return;
        }

        match self.leases.release(mac) {
            Some(address) => info!("RELEASE of {} by {}", address, mac),
            None => debug!("RELEASE from {} with no binding", mac),
        }
    }

    fn reply(&self, request: &DhcpPacket, kind: MessageType, your_ip: Ipv4Addr) -> Reply {
        let message = DhcpPacket::create_reply(request, kind, your_ip, self.server_ip);
        Reply {
            message_type: kind,
            your_ip,
            payload: message.encode_with(self.catalog.reply_options(kind)),
            destination: Destination::for_reply(request, kind, your_ip),
        }
    }

    fn nak(&self, request: &DhcpPacket) -> Reply {
        let mut message =
            DhcpPacket::create_reply(request, MessageType::Nak, Ipv4Addr::UNSPECIFIED, self.server_ip);
        message.siaddr = Ipv4Addr::UNSPECIFIED;
        Reply {
            message_type: MessageType::Nak,
            your_ip: Ipv4Addr::UNSPECIFIED,
            payload: message.encode_with(self.catalog.reply_options(MessageType::Nak)),
            destination: Destination::BROADCAST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::verify_checksum;
    use crate::frame::{DHCP_CLIENT_PORT, build_ipv4, build_udp, parse_ipv4, parse_udp};
    use crate::options::{DhcpOption, OptionCode};
    use crate::packet::{DHCP_MAGIC_COOKIE, FLAG_BROADCAST, HLEN_ETHERNET, HTYPE_ETHERNET};
    use chrono::TimeDelta;

    const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn mac(last: u8) -> [u8; 6] {
        [0xaa, 0xbb, 0xcc, 0xdd, 0xee, last]
    }

    fn test_engine() -> Engine {
        let config =
            Config::parse("addresses=10.0.0.10-10.0.0.12\ninterface=eth0\nlease=3600\n").unwrap();
        Engine::from_config(&config, SERVER).unwrap()
    }

    fn create_dhcp_packet(
        message_type: MessageType,
        mac: [u8; 6],
        xid: u32,
        options: Vec<DhcpOption>,
    ) -> Vec<u8> {
        let mut packet = vec![0u8; 300];

        packet[0] = BOOTREQUEST;
        packet[1] = HTYPE_ETHERNET;
        packet[2] = HLEN_ETHERNET;
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet[28..34].copy_from_slice(&mac);
        packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);

        let mut index = 240;
        packet[index] = OptionCode::MessageType as u8;
        packet[index + 1] = 1;
        packet[index + 2] = message_type as u8;
        index += 3;

        for option in options {
            let encoded = option.encode();
            packet[index..index + encoded.len()].copy_from_slice(&encoded);
            index += encoded.len();
        }

        packet[index] = OptionCode::End as u8;
        packet
    }

    fn discover(engine: &mut Engine, client: [u8; 6]) -> Reply {
        let data = create_dhcp_packet(MessageType::Discover, client, 0x1000, vec![]);
        engine.handle_datagram(&data, now()).unwrap().unwrap()
    }

    fn request(engine: &mut Engine, client: [u8; 6], address: Ipv4Addr) -> Reply {
        let data = create_dhcp_packet(
            MessageType::Request,
            client,
            0x1001,
            vec![
                DhcpOption::RequestedIpAddress(address),
                DhcpOption::ServerIdentifier(SERVER),
            ],
        );
        engine.handle_datagram(&data, now()).unwrap().unwrap()
    }

    fn release(engine: &mut Engine, client: [u8; 6], address: Ipv4Addr) {
        let mut data = create_dhcp_packet(
            MessageType::Release,
            client,
            0x1002,
            vec![DhcpOption::ServerIdentifier(SERVER)],
        );
        data[12..16].copy_from_slice(&address.octets());
        assert!(engine.handle_datagram(&data, now()).unwrap().is_none());
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut engine = test_engine();

        let offer = discover(&mut engine, mac(1));
        assert_eq!(offer.message_type, MessageType::Offer);
        assert_eq!(offer.your_ip, Ipv4Addr::new(10, 0, 0, 10));

        let ack = request(&mut engine, mac(1), Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(ack.message_type, MessageType::Ack);
        assert_eq!(ack.your_ip, Ipv4Addr::new(10, 0, 0, 10));

        let parsed = DhcpPacket::parse(&ack.payload).unwrap();
        assert_eq!(parsed.message_type, Some(MessageType::Ack));
        assert_eq!(parsed.yiaddr, Ipv4Addr::new(10, 0, 0, 10));
        assert!(parsed.options.contains(&DhcpOption::ServerIdentifier(SERVER)));
        assert!(parsed.options.contains(&DhcpOption::LeaseTime(3600)));
        assert!(parsed.options.contains(&DhcpOption::RenewalTime(1800)));
        assert!(parsed.options.contains(&DhcpOption::RebindingTime(2970)));

        assert_eq!(discover(&mut engine, mac(2)).your_ip, Ipv4Addr::new(10, 0, 0, 11));

        release(&mut engine, mac(1), Ipv4Addr::new(10, 0, 0, 10));
        assert!(engine.leases().binding(&HardwareAddress::new(mac(1))).is_none());

        assert_eq!(discover(&mut engine, mac(3)).your_ip, Ipv4Addr::new(10, 0, 0, 10));

        assert_eq!(discover(&mut engine, mac(1)).your_ip, Ipv4Addr::new(10, 0, 0, 12));
        for (client, last) in [(mac(1), 12), (mac(2), 11), (mac(3), 10)] {
            let ack = request(&mut engine, client, Ipv4Addr::new(10, 0, 0, last));
            assert_eq!(ack.message_type, MessageType::Ack);
        }

        let nak = discover(&mut engine, mac(4));
        assert_eq!(nak.message_type, MessageType::Nak);
        assert_eq!(nak.destination, Destination::BROADCAST);
    }

    #[test]
    fn test_offer_layout() {
        let mut engine = test_engine();
        let offer = discover(&mut engine, mac(1));
        let parsed = DhcpPacket::parse(&offer.payload).unwrap();

        assert_eq!(parsed.op, crate::packet::BOOTREPLY);
        assert_eq!(parsed.xid, 0x1000);
        assert_eq!(parsed.siaddr, SERVER);
        assert_eq!(parsed.hardware_address(), HardwareAddress::new(mac(1)));
        assert_eq!(&offer.payload[240..246], &[54, 4, 10, 0, 0, 1]);
        assert_eq!(&offer.payload[246..252], &[51, 4, 0, 0, 0x0e, 0x10]);
        assert_eq!(&offer.payload[264..268], &[53, 1, 2, 255]);
        assert_eq!(
            engine.leases().binding(&HardwareAddress::new(mac(1))).unwrap().state,
            BindingState::Offered
        );
    }

    #[test]
    fn test_repeated_discover_same_offer() {
        let mut engine = test_engine();
        let first = discover(&mut engine, mac(1));
        let second = discover(&mut engine, mac(1));
        assert_eq!(first.your_ip, second.your_ip);
        assert_eq!(engine.leases().active_count(), 1);
    }

    #[test]
    fn test_request_without_offer_naks() {
        let mut engine = test_engine();
        let nak = request(&mut engine, mac(1), Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(nak.message_type, MessageType::Nak);

        let parsed = DhcpPacket::parse(&nak.payload).unwrap();
        assert_eq!(parsed.yiaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(parsed.siaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(parsed.options, vec![DhcpOption::ServerIdentifier(SERVER)]);
    }

    #[test]
    fn test_request_for_wrong_address_naks() {
        let mut engine = test_engine();
        discover(&mut engine, mac(1));

        let nak = request(&mut engine, mac(1), Ipv4Addr::new(10, 0, 0, 11));
        assert_eq!(nak.message_type, MessageType::Nak);
        assert_eq!(
            engine.leases().binding(&HardwareAddress::new(mac(1))).unwrap().state,
            BindingState::Offered
        );
    }

    #[test]
    fn test_request_for_other_server_withdraws_offer() {
        let config =
            Config::parse("addresses=10.0.0.10-10.0.0.10\ninterface=eth0\n").unwrap();
        let mut engine = Engine::from_config(&config, SERVER).unwrap();
        discover(&mut engine, mac(1));

        let data = create_dhcp_packet(
            MessageType::Request,
            mac(1),
            1,
            vec![
                DhcpOption::RequestedIpAddress(Ipv4Addr::new(10, 0, 0, 10)),
                DhcpOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 2)),
            ],
        );
        assert!(engine.handle_datagram(&data, now()).unwrap().is_none());
        assert!(engine.leases().binding(&HardwareAddress::new(mac(1))).is_none());

        let offer = discover(&mut engine, mac(2));
        assert_eq!(offer.message_type, MessageType::Offer);
        assert_eq!(offer.your_ip, Ipv4Addr::new(10, 0, 0, 10));
    }

    #[test]
    fn test_request_for_other_server_keeps_bound_lease() {
        let mut engine = test_engine();
        discover(&mut engine, mac(1));
        request(&mut engine, mac(1), Ipv4Addr::new(10, 0, 0, 10));

        let data = create_dhcp_packet(
            MessageType::Request,
            mac(1),
            1,
            vec![DhcpOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 2))],
        );
        assert!(engine.handle_datagram(&data, now()).unwrap().is_none());
        assert_eq!(
            engine.leases().binding(&HardwareAddress::new(mac(1))).unwrap().state,
            BindingState::Bound
        );
    }

    #[test]
    fn test_release_for_other_server_ignored() {
        let mut engine = test_engine();
        discover(&mut engine, mac(1));
        request(&mut engine, mac(1), Ipv4Addr::new(10, 0, 0, 10));

        let mut data = create_dhcp_packet(
            MessageType::Release,
            mac(1),
            3,
            vec![DhcpOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 2))],
        );
        data[12..16].copy_from_slice(&[10, 0, 0, 10]);
        assert!(engine.handle_datagram(&data, now()).unwrap().is_none());

        let binding = engine.leases().binding(&HardwareAddress::new(mac(1))).unwrap();
        assert_eq!(binding.state, BindingState::Bound);
    }

    #[test]
    fn test_release_for_other_address_ignored() {
        let mut engine = test_engine();
        discover(&mut engine, mac(1));
        request(&mut engine, mac(1), Ipv4Addr::new(10, 0, 0, 10));

        let mut data = create_dhcp_packet(MessageType::Release, mac(1), 3, vec![]);
        data[12..16].copy_from_slice(&[192, 168, 5, 5]);
        assert!(engine.handle_datagram(&data, now()).unwrap().is_none());
        assert!(engine.leases().binding(&HardwareAddress::new(mac(1))).is_some());

        data[12..16].copy_from_slice(&[10, 0, 0, 10]);
        assert!(engine.handle_datagram(&data, now()).unwrap().is_none());
        assert!(engine.leases().binding(&HardwareAddress::new(mac(1))).is_none());
        assert_eq!(engine.leases().free_count(), 3);
    }

    #[test]
    fn test_unknown_message_type_dropped() {
        let mut engine = test_engine();
        let mut data = create_dhcp_packet(MessageType::Discover, mac(1), 1, vec![]);
        data[242] = 9;

        let packet = DhcpPacket::parse(&data).unwrap();
        assert_eq!(packet.message_type, None);
        assert_eq!(packet.unknown_message_type(), Some(9));

        assert!(engine.handle_datagram(&data, now()).unwrap().is_none());
        assert_eq!(engine.leases().active_count(), 0);
    }

    #[test]
    fn test_hostname_does_not_change_offer() {
        let mut engine = test_engine();
        let data = create_dhcp_packet(
            MessageType::Discover,
            mac(1),
            1,
            vec![
                DhcpOption::Hostname("printer".to_string()),
                DhcpOption::ParameterRequestList(vec![1, 3, 6]),
            ],
        );
        let offer = engine.handle_datagram(&data, now()).unwrap().unwrap();
        assert_eq!(offer.your_ip, Ipv4Addr::new(10, 0, 0, 10));
    }

    #[test]
    fn test_renewal_with_ciaddr() {
        let mut engine = test_engine();
        discover(&mut engine, mac(1));
        request(&mut engine, mac(1), Ipv4Addr::new(10, 0, 0, 10));

        let mut data = create_dhcp_packet(MessageType::Request, mac(1), 7, vec![]);
        data[12..16].copy_from_slice(&[10, 0, 0, 10]);

        let later = now() + TimeDelta::seconds(1800);
        let ack = engine.handle_datagram(&data, later).unwrap().unwrap();
        assert_eq!(ack.message_type, MessageType::Ack);
        assert_eq!(ack.destination.ip, Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(ack.destination.mac, HardwareAddress::new(mac(1)));
        assert_eq!(
            engine.leases().binding(&HardwareAddress::new(mac(1))).unwrap().expires_at,
            later + TimeDelta::seconds(3600)
        );
    }

    #[test]
    fn test_reply_destinations() {
        let mut engine = test_engine();

        let offer = discover(&mut engine, mac(1));
        assert_eq!(
            offer.destination,
            Destination {
                ip: Ipv4Addr::new(10, 0, 0, 10),
                mac: HardwareAddress::new(mac(1)),
            }
        );

        let mut data = create_dhcp_packet(MessageType::Discover, mac(2), 9, vec![]);
        data[10..12].copy_from_slice(&FLAG_BROADCAST.to_be_bytes());
        let offer = engine.handle_datagram(&data, now()).unwrap().unwrap();
        assert_eq!(offer.destination, Destination::BROADCAST);
        assert_eq!(DhcpPacket::parse(&offer.payload).unwrap().flags, FLAG_BROADCAST);
    }

    #[test]
    fn test_ignored_messages() {
        let mut engine = test_engine();

        let decline = create_dhcp_packet(MessageType::Decline, mac(1), 1, vec![]);
        assert!(engine.handle_datagram(&decline, now()).unwrap().is_none());

        let inform = create_dhcp_packet(MessageType::Inform, mac(1), 1, vec![]);
        assert!(engine.handle_datagram(&inform, now()).unwrap().is_none());

        let mut bootreply = create_dhcp_packet(MessageType::Discover, mac(1), 1, vec![]);
        bootreply[0] = 2;
        assert!(engine.handle_datagram(&bootreply, now()).unwrap().is_none());

        let mut untyped = create_dhcp_packet(MessageType::Discover, mac(1), 1, vec![]);
        untyped[240] = OptionCode::End as u8;
        assert!(engine.handle_datagram(&untyped, now()).unwrap().is_none());

        assert_eq!(engine.leases().active_count(), 0);
    }

    #[test]
    fn test_release_unknown_client() {
        let mut engine = test_engine();
        release(&mut engine, mac(9), Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(engine.leases().free_count(), 3);
    }

    #[test]
    fn test_malformed_datagram() {
        let mut engine = test_engine();
        assert!(matches!(
            engine.handle_datagram(&[0u8; 100], now()),
            Err(Error::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_expire_releases_stale_offers() {
        let mut engine = test_engine();
        discover(&mut engine, mac(1));
        assert_eq!(engine.expire(now() + TimeDelta::seconds(61)), 1);
        assert_eq!(engine.leases().active_count(), 0);
    }

    #[test]
    fn test_handle_ip_packet() {
        let mut engine = test_engine();
        let dhcp = create_dhcp_packet(MessageType::Discover, mac(1), 0x42, vec![]);

        let udp = build_udp(
            &dhcp,
            DHCP_CLIENT_PORT,
            DHCP_SERVER_PORT,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
        )
        .unwrap();
        let ip = build_ipv4(&udp, PROTOCOL_UDP, 64, Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST)
            .unwrap();

        let offer = engine.handle_ip_packet(&ip, now()).unwrap().unwrap();
        assert_eq!(offer.your_ip, Ipv4Addr::new(10, 0, 0, 10));

        let mut corrupted = ip.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;
        assert!(matches!(
            engine.handle_ip_packet(&corrupted, now()),
            Err(Error::ChecksumMismatch(_))
        ));

        let other_port = build_udp(&dhcp, 68, 1067, Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST).unwrap();
        let other = build_ipv4(&other_port, PROTOCOL_UDP, 64, Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST)
            .unwrap();
        assert!(engine.handle_ip_packet(&other, now()).unwrap().is_none());
    }

    #[test]
    fn test_reply_to_ip_packet() {
        let mut engine = test_engine();
        let offer = discover(&mut engine, mac(1));

        let packet = offer.to_ip_packet(engine.server_ip()).unwrap();
        assert!(verify_checksum(&packet[..20]));

        let ip = parse_ipv4(&packet).unwrap();
        assert_eq!(ip.source, SERVER);
        assert_eq!(ip.destination, Ipv4Addr::new(10, 0, 0, 10));

        let udp = parse_udp(&ip.payload, ip.source, ip.destination).unwrap();
        assert_eq!(udp.source_port, DHCP_SERVER_PORT);
        assert_eq!(udp.destination_port, DHCP_CLIENT_PORT);
        assert_eq!(udp.payload, offer.payload);
    }

    #[test]
    fn test_server_inside_pool_rejected() {
        let config =
            Config::parse("addresses=10.0.0.1-10.0.0.12\ninterface=eth0\n").unwrap();
        assert!(matches!(
            Engine::from_config(&config, SERVER),
            Err(Error::InvalidConfig(_))
        ));
    }
}
