//! Address pool and lease bookkeeping.
//!
//! Each client hardware address maps to at most one [`Binding`]. A binding
//! is created OFFERED by [`Leases::allocate`] and becomes BOUND through
//! [`Leases::confirm`]. Releasing or expiring a binding returns its address
//! to the tail of a FIFO free list, which is drained before any
//! never-issued address is handed out.
//!
//! ```text
//!   AVAILABLE --allocate--> OFFERED --confirm--> BOUND
//!       ^                      |                   |
//!       +------ release / offer timeout / lease expiry
//! ```
//!
//! All operations take the current time explicitly so that callers (and
//! tests) control the clock.

use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::packet::HardwareAddress;

/// How long an OFFERED address stays reserved without a REQUEST.
pub const OFFER_TIMEOUT_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingState {
    Offered,
    Bound,
}

/// An address held by one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub address: Ipv4Addr,
    pub state: BindingState,
    /// Offer deadline while OFFERED, lease end once BOUND.
    pub expires_at: DateTime<Utc>,
}

impl Binding {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Seconds remaining until expiration, or 0 if expired.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// The address allocator.
///
/// Addresses in `range_first..=range_last` are issued in ascending order
/// the first time; after that, released addresses are reused oldest
/// first.
#[derive(Debug)]
pub struct Leases {
    range_first: u32,
    range_last: u32,
    /// Next never-issued address. Kept as `u64` so that a range ending at
    /// 255.255.255.255 can still be exhausted.
    high_watermark: u64,
    released: VecDeque<Ipv4Addr>,
    bindings: HashMap<HardwareAddress, Binding>,
    lease_duration: TimeDelta,
    offer_timeout: TimeDelta,
}

impl Leases {
    /// Creates an empty pool covering `first..=last`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `first > last`.
    pub fn new(first: Ipv4Addr, last: Ipv4Addr, lease_seconds: u32) -> Result<Self> {
        let range_first = u32::from(first);
        let range_last = u32::from(last);

        if range_first > range_last {
            return Err(Error::InvalidConfig(format!(
                "Address range {}-{} is empty",
                first, last
            )));
        }

        Ok(Self {
            range_first,
            range_last,
            high_watermark: range_first as u64,
            released: VecDeque::new(),
            bindings: HashMap::new(),
            lease_duration: TimeDelta::seconds(lease_seconds as i64),
            offer_timeout: TimeDelta::seconds(OFFER_TIMEOUT_SECONDS),
        })
    }

    /// Returns the address reserved for `mac`, reserving one if needed.
    ///
    /// Stale bindings are expired first. A client that already holds an
    /// address gets the same one back; a repeated DISCOVER also refreshes
    /// the offer deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if the free list is empty and every
    /// address in the range has been issued.
    pub fn allocate(&mut self, mac: HardwareAddress, now: DateTime<Utc>) -> Result<Ipv4Addr> {
        self.expire(now);

        if let Some(binding) = self.bindings.get_mut(&mac) {
            if binding.state == BindingState::Offered {
                binding.expires_at = now + self.offer_timeout;
            }
            return Ok(binding.address);
        }

        let address = match self.released.pop_front() {
            Some(address) => address,
            None => self.next_fresh_address()?,
        };

        self.bindings.insert(
            mac,
            Binding {
                address,
                state: BindingState::Offered,
                expires_at: now + self.offer_timeout,
            },
        );

        Ok(address)
    }

    fn next_fresh_address(&mut self) -> Result<Ipv4Addr> {
        if self.high_watermark > self.range_last as u64 {
            return Err(Error::PoolExhausted);
        }
        let address = Ipv4Addr::from(self.high_watermark as u32);
        self.high_watermark += 1;
        Ok(address)
    }

    /// Commits the binding for `mac` and starts (or renews) its lease.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBinding`] if `mac` holds no live binding.
    pub fn confirm(&mut self, mac: HardwareAddress, now: DateTime<Utc>) -> Result<Ipv4Addr> {
        self.expire(now);

        let binding = self
            .bindings
            .get_mut(&mac)
            .ok_or_else(|| Error::UnknownBinding(mac.to_string()))?;

        binding.state = BindingState::Bound;
        binding.expires_at = now + self.lease_duration;
        Ok(binding.address)
    }

    /// Drops the binding for `mac` and queues its address for reuse.
    ///
    /// Returns the released address, or `None` if `mac` held nothing.
    pub fn release(&mut self, mac: HardwareAddress) -> Option<Ipv4Addr> {
        let binding = self.bindings.remove(&mac)?;
        self.released.push_back(binding.address);
        Some(binding.address)
    }

    /// Releases every binding whose deadline has passed.
    ///
    /// Expired addresses join the free list in ascending order. Returns the
    /// number of bindings removed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let mut expired: Vec<(Ipv4Addr, HardwareAddress)> = self
            .bindings
            .iter()
            .filter(|(_, binding)| binding.is_expired(now))
            .map(|(mac, binding)| (binding.address, *mac))
            .collect();
        expired.sort();

        for (address, mac) in &expired {
            self.bindings.remove(mac);
            self.released.push_back(*address);
        }

        expired.len()
    }

    pub fn binding(&self, mac: &HardwareAddress) -> Option<&Binding> {
        self.bindings.get(mac)
    }

    /// All bindings, ordered by address.
    pub fn bindings(&self) -> Vec<(HardwareAddress, Binding)> {
        let mut all: Vec<_> = self
            .bindings
            .iter()
            .map(|(mac, binding)| (*mac, binding.clone()))
            .collect();
        all.sort_by_key(|(_, binding)| binding.address);
        all
    }

    /// Addresses that can be handed out right now, ignoring expiry.
    pub fn free_count(&self) -> u64 {
        self.released.len() as u64 + (self.range_last as u64 + 1 - self.high_watermark)
    }

    /// Number of OFFERED plus BOUND bindings.
    pub fn active_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn pool_size(&self) -> u64 {
        self.range_last as u64 - self.range_first as u64 + 1
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        (self.range_first..=self.range_last).contains(&u32::from(address))
    }
}
