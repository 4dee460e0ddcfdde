//! Error types for the DHCP server.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

/// Errors that can occur during DHCP server operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    ///
    /// A read error on the listen socket is fatal; a failed transmit is not.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (`show-config` output).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed DHCP message received.
    ///
    /// This includes messages that are too short, have an invalid magic
    /// cookie, an out-of-range hardware address length, or truncated options.
    #[error("Invalid DHCP packet: {0}")]
    InvalidPacket(String),

    /// An inbound IPv4 or UDP checksum did not verify.
    #[error("{0} checksum mismatch")]
    ChecksumMismatch(&'static str),

    /// A payload is too large to fit in a single IPv4/UDP datagram.
    #[error("Payload of {0} bytes does not fit in one datagram")]
    PayloadTooLarge(usize),

    /// The IP address pool is exhausted.
    ///
    /// Every address in the range is either offered or bound and the
    /// free list is empty.
    #[error("No available IP addresses in pool")]
    PoolExhausted,

    /// A REQUEST arrived from a client with no offered or bound address.
    #[error("Client {0} has no offered or bound address")]
    UnknownBinding(String),

    /// Invalid server configuration.
    ///
    /// Returned while loading the configuration file or building the
    /// option catalog; fatal at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 67 without root privileges.
    #[error("Socket error: {0}")]
    Socket(String),

    /// The network interface could not be found or opened.
    #[error("Interface error: {0}")]
    Interface(String),
}

/// A specialized Result type for DHCP operations.
pub type Result<T> = std::result::Result<T, Error>;
