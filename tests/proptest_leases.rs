use std::collections::HashSet;
use std::net::Ipv4Addr;

use chrono::{DateTime, TimeDelta, Utc};
use proptest::prelude::*;

use rawlease::{BindingState, Error, HardwareAddress, Leases};

#[derive(Debug, Clone)]
enum Op {
    Allocate(u8),
    Confirm(u8),
    Release(u8),
    Advance(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..8).prop_map(Op::Allocate),
        3 => (0u8..8).prop_map(Op::Confirm),
        2 => (0u8..8).prop_map(Op::Release),
        1 => (0i64..200).prop_map(Op::Advance),
    ]
}

fn mac(index: u8) -> HardwareAddress {
    HardwareAddress::new([0x02, 0, 0, 0, 0, index])
}

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn assert_consistent(leases: &Leases) -> Result<(), TestCaseError> {
    let bindings = leases.bindings();
    let mut seen = HashSet::new();

    for (_, binding) in &bindings {
        prop_assert!(leases.contains(binding.address));
        prop_assert!(seen.insert(binding.address), "{} bound twice", binding.address);
    }
    prop_assert_eq!(leases.free_count() + bindings.len() as u64, leases.pool_size());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    #[test]
    fn random_operations_keep_pool_consistent(
        pool in 1u32..6,
        lease in 30u32..300,
        ops in prop::collection::vec(op(), 1..64),
    ) {
        let first = Ipv4Addr::new(192, 168, 1, 100);
        let last = Ipv4Addr::from(u32::from(first) + pool - 1);
        let mut leases = Leases::new(first, last, lease).unwrap();
        let mut now = start();

        for op in ops {
            match op {
                Op::Allocate(index) => match leases.allocate(mac(index), now) {
                    Ok(address) => prop_assert!(leases.contains(address)),
                    Err(Error::PoolExhausted) => {
                        prop_assert_eq!(leases.active_count() as u64, leases.pool_size())
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                },
                Op::Confirm(index) => match leases.confirm(mac(index), now) {
                    Ok(address) => {
                        let binding = leases.binding(&mac(index)).unwrap();
                        prop_assert_eq!(binding.address, address);
                        prop_assert_eq!(binding.state, BindingState::Bound);
                    }
                    Err(Error::UnknownBinding(_)) => {
                        prop_assert!(leases.binding(&mac(index)).is_none())
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                },
                Op::Release(index) => {
                    leases.release(mac(index));
                    prop_assert!(leases.binding(&mac(index)).is_none());
                }
                Op::Advance(seconds) => now += TimeDelta::seconds(seconds),
            }
            assert_consistent(&leases)?;
        }
    }

    #[test]
    fn repeated_allocate_returns_same_address(
        pool in 1u32..16,
        repeats in 2usize..10,
    ) {
        let first = Ipv4Addr::new(10, 0, 0, 10);
        let last = Ipv4Addr::from(u32::from(first) + pool - 1);
        let mut leases = Leases::new(first, last, 3600).unwrap();

        let address = leases.allocate(mac(1), start()).unwrap();
        for _ in 0..repeats {
            prop_assert_eq!(leases.allocate(mac(1), start()).unwrap(), address);
        }
        prop_assert_eq!(leases.active_count(), 1);
    }

    #[test]
    fn released_addresses_reused_in_release_order(
        order in Just((0u8..6).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let first = Ipv4Addr::new(10, 0, 0, 1);
        let last = Ipv4Addr::new(10, 0, 0, 6);
        let mut leases = Leases::new(first, last, 3600).unwrap();

        for index in 0..6 {
            leases.allocate(mac(index), start()).unwrap();
        }

        let released: Vec<Ipv4Addr> = order
            .iter()
            .map(|index| leases.release(mac(*index)).unwrap())
            .collect();

        for (offset, expected) in released.iter().enumerate() {
            let address = leases.allocate(mac(100 + offset as u8), start()).unwrap();
            prop_assert_eq!(address, *expected);
        }
    }

    #[test]
    fn single_address_pool_serves_one_client(
        octets in any::<[u8; 4]>(),
        other in 1u8..=255,
    ) {
        let address = Ipv4Addr::from(octets);
        let mut leases = Leases::new(address, address, 60).unwrap();

        prop_assert_eq!(leases.allocate(mac(0), start()).unwrap(), address);
        prop_assert!(matches!(
            leases.allocate(mac(other), start()),
            Err(Error::PoolExhausted)
        ));
    }
}
