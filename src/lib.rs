//! # rawlease
//!
//! A DHCP server that builds and parses its own Ethernet, IPv4, UDP and
//! DHCP frames (RFC 2131, RFC 2132).
//!
//! ## Quick Start
//!
//! ```no_run
//! use rawlease::{Config, DhcpServer};
//!
//! #[tokio::main]
//! async fn main() -> rawlease::Result<()> {
//!     let config = Config::load("config.txt")?;
//!     let server = DhcpServer::new(config).await?;
//!     server.run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`checksum`] - RFC 1071 Internet checksum and the UDP pseudo-header
//! - [`frame`] - IPv4, UDP and Ethernet II framing
//! - [`DhcpPacket`] / [`DhcpOption`] - DHCP message codec
//! - [`OptionCatalog`] - configured reply options, encoded once
//! - [`Leases`] - address pool and MAC bindings
//! - [`Engine`] - DISCOVER/REQUEST/RELEASE state machine
//! - [`DhcpServer`] - UDP receive loop and raw Ethernet transmit

pub mod catalog;
pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod interface;
pub mod lease;
pub mod options;
pub mod packet;
pub mod server;

pub use catalog::{CatalogOption, OptionCatalog};
pub use config::Config;
pub use engine::{Destination, Engine, Reply};
pub use error::{Error, Result};
pub use interface::{EthernetTransmitter, NetworkInterface, Transmit};
pub use lease::{Binding, BindingState, Leases};
pub use options::{DhcpOption, MessageType};
pub use packet::{DhcpPacket, HardwareAddress};
pub use server::DhcpServer;
