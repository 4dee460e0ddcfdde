use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::{Engine, Reply};
use crate::error::{Error, Result};
use crate::frame::DHCP_SERVER_PORT;
use crate::interface::{EthernetTransmitter, NetworkInterface, Transmit};

const RECV_BUFFER_SIZE: usize = 1500;
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub type SharedTransmitter = Arc<Mutex<Box<dyn Transmit + Send>>>;

pub struct DhcpServer {
    engine: Arc<Mutex<Engine>>,
    transmitter: SharedTransmitter,
    socket: Arc<UdpSocket>,
    server_ip: Ipv4Addr,
}

impl DhcpServer {
    /// Resolves the configured interface, opens the listen socket and the
    /// datalink channel, and builds the engine.
    pub async fn new(config: Config) -> Result<Self> {
        let interface = NetworkInterface::by_name(&config.interface)?;
        info!("Using interface {}", interface);

        let engine = Engine::from_config(&config, interface.ipv4)?;
        let socket = Self::create_socket(&interface.name)?;
        let transmitter = EthernetTransmitter::open(&interface)?;

        info!(
            "DHCP server starting on {}:{}",
            interface.ipv4, DHCP_SERVER_PORT
        );
        info!(
            "IP pool: {} - {} ({} addresses)",
            config.range_first,
            config.range_last,
            engine.leases().pool_size()
        );

        Ok(Self::from_parts(engine, Box::new(transmitter), socket))
    }

    /// Assembles a server from already constructed parts.
    pub fn from_parts(
        engine: Engine,
        transmitter: Box<dyn Transmit + Send>,
        socket: UdpSocket,
    ) -> Self {
        let server_ip = engine.server_ip();
        Self {
            engine: Arc::new(Mutex::new(engine)),
            transmitter: Arc::new(Mutex::new(transmitter)),
            socket: Arc::new(socket),
            server_ip,
        }
    }

    fn create_socket(interface: &str) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

        #[cfg(any(target_os = "linux", target_os = "android", target_os = "fuchsia"))]
        {
            if let Err(error) = socket.bind_device(Some(interface.as_bytes())) {
                warn!("Failed to bind socket to {}: {}", interface, error);
            }
        }
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "fuchsia")))]
        {
            debug!(
                "Device binding is unsupported here, listening on all interfaces instead of {}",
                interface
            );
        }

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DHCP_SERVER_PORT);
        socket.bind(&bind_addr.into()).map_err(|error| {
            Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error))
        })?;

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket).map_err(|error| {
            Error::Socket(format!("Failed to convert to tokio socket: {}", error))
        })?;

        Ok(tokio_socket)
    }

    pub fn engine(&self) -> Arc<Mutex<Engine>> {
        Arc::clone(&self.engine)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serves requests until the listen socket fails.
    ///
    /// Datagrams are handled one at a time. A receive error stops the
    /// server and is returned; a malformed datagram or failed transmit
    /// is logged and skipped.
    pub async fn run(&self) -> Result<()> {
        let _sweeper = AbortOnDrop(spawn_expiry_sweep(
            Arc::clone(&self.engine),
            EXPIRY_SWEEP_INTERVAL,
        ));
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        info!("DHCP server ready and listening");

        loop {
            let (size, source) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(error) => {
                    error!("Error receiving packet: {}", error);
                    return Err(error.into());
                }
            };

            if let Err(error) = self.process_datagram(&buffer[..size], source).await {
                warn!("Error handling packet from {}: {}", source, error);
            }
        }
    }

    /// Runs one received DHCP message through the engine and transmits the
    /// reply, if any.
    ///
    /// Transmit failures are logged, not returned.
    pub async fn process_datagram(&self, data: &[u8], source: SocketAddr) -> Result<Option<Reply>> {
        debug!("Received {} bytes from {}", data.len(), source);

        let reply = {
            let mut engine = self.engine.lock().await;
            engine.handle_datagram(data, Utc::now())?
        };

        let Some(reply) = reply else {
            return Ok(None);
        };

        let datagram = reply.to_ip_packet(self.server_ip)?;
        let mut transmitter = self.transmitter.lock().await;
        match transmitter.transmit(&datagram, reply.destination.mac) {
            Ok(()) => debug!(
                "Sent {} to {} ({})",
                reply.message_type, reply.destination.ip, reply.destination.mac
            ),
            Err(error) => warn!(
                "Failed to send {} to {}: {}",
                reply.message_type, reply.destination.mac, error
            ),
        }

        Ok(Some(reply))
    }
}

/// Expires stale offers and leases under the engine lock.
pub async fn sweep_expired(engine: &Mutex<Engine>, now: DateTime<Utc>) -> usize {
    let expired = engine.lock().await.expire(now);
    if expired > 0 {
        info!("Expired {} binding(s)", expired);
    }
    expired
}

/// Aborts the wrapped task when dropped, so the sweep stops with `run`.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn spawn_expiry_sweep(engine: Arc<Mutex<Engine>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            sweep_expired(&engine, Utc::now()).await;
        }
    })
}
