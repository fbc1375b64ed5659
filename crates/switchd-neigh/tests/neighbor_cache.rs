//! Neighbor cache behavior over a real state update pipeline.

use pretty_assertions::assert_eq;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use switchd_neigh::{AdvertisementFlags, NeighborCache, NeighborCacheConfig};
use switchd_state::{NeighborEntryState, StateUpdater, SwitchState, Vlan};
use switchd_types::{InterfaceId, MacAddress, PortId, VlanId};

const VLAN: VlanId = VlanId::DEFAULT;
const INTF: InterfaceId = InterfaceId(100);

fn mac(last: u8) -> MacAddress {
    MacAddress::new([0x02, 0, 0, 0, 0, last])
}

fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

fn initial_state() -> SwitchState {
    let mut state = SwitchState::new();
    let mut vlan = Vlan::new(VLAN, "vlan1");
    vlan.interface = Some(INTF);
    state.vlans_mut().insert(VLAN, Arc::new(vlan));
    state
}

fn rig() -> (StateUpdater, NeighborCache<Ipv4Addr>) {
    let updater = StateUpdater::spawn(initial_state());
    let cache = NeighborCache::new(
        VLAN,
        INTF,
        NeighborCacheConfig::default(),
        updater.handle(),
    );
    (updater, cache)
}

async fn entry_state(
    cache: &NeighborCache<Ipv4Addr>,
    updater: &StateUpdater,
    addr: Ipv4Addr,
) -> Option<NeighborEntryState> {
    cache.flush_pipeline().await.unwrap();
    updater
        .handle()
        .current_state()
        .vlans()
        .get(&VLAN)
        .unwrap()
        .arp_table
        .get(&addr)
        .map(|e| e.state)
}

#[tokio::test]
async fn solicited_advertisement_resolves_pending_entry() {
    let (updater, mut cache) = rig();

    cache.sent_solicitation(ip(1));
    assert_eq!(
        entry_state(&cache, &updater, ip(1)).await,
        Some(NeighborEntryState::Pending)
    );
    assert_eq!(cache.resolve(ip(1)), None);

    cache.received_advertisement(
        ip(1),
        mac(1),
        PortId(1),
        AdvertisementFlags {
            solicited: true,
            override_entry: false,
        },
    );
    assert_eq!(
        entry_state(&cache, &updater, ip(1)).await,
        Some(NeighborEntryState::Reachable)
    );
    assert_eq!(cache.resolve(ip(1)), Some((mac(1), PortId(1))));

    updater.shutdown().await;
}

#[tokio::test]
async fn unsolicited_advertisement_for_pending_entry_is_accepted_as_stale() {
    let (updater, mut cache) = rig();

    cache.sent_solicitation(ip(1));
    cache.received_advertisement(
        ip(1),
        mac(1),
        PortId(1),
        AdvertisementFlags::default(),
    );
    assert_eq!(
        entry_state(&cache, &updater, ip(1)).await,
        Some(NeighborEntryState::Stale)
    );

    updater.shutdown().await;
}

#[tokio::test]
async fn mismatch_without_override_is_ignored() {
    let (updater, mut cache) = rig();

    cache.received_advertisement(
        ip(1),
        mac(1),
        PortId(1),
        AdvertisementFlags {
            solicited: true,
            override_entry: false,
        },
    );

    // Different MAC, no override: the cached entry stands.
    cache.received_advertisement(
        ip(1),
        mac(9),
        PortId(1),
        AdvertisementFlags {
            solicited: true,
            override_entry: false,
        },
    );
    cache.flush_pipeline().await.unwrap();
    assert_eq!(cache.resolve(ip(1)), Some((mac(1), PortId(1))));

    // With override the new fields replace the entry.
    cache.received_advertisement(
        ip(1),
        mac(9),
        PortId(2),
        AdvertisementFlags {
            solicited: true,
            override_entry: true,
        },
    );
    cache.flush_pipeline().await.unwrap();
    assert_eq!(cache.resolve(ip(1)), Some((mac(9), PortId(2))));

    updater.shutdown().await;
}

#[tokio::test]
async fn mismatched_solicitation_replaces_entry_as_stale() {
    let (updater, mut cache) = rig();

    cache.received_advertisement(
        ip(1),
        mac(1),
        PortId(1),
        AdvertisementFlags {
            solicited: true,
            override_entry: false,
        },
    );

    // The neighbor shows up from a different port.
    cache.received_solicitation(ip(1), mac(1), PortId(3));
    assert_eq!(
        entry_state(&cache, &updater, ip(1)).await,
        Some(NeighborEntryState::Stale)
    );
    assert_eq!(cache.resolve(ip(1)), Some((mac(1), PortId(3))));

    updater.shutdown().await;
}

#[tokio::test]
async fn port_down_flushes_only_that_ports_entries() {
    let (updater, mut cache) = rig();
    let solicited = AdvertisementFlags {
        solicited: true,
        override_entry: false,
    };

    cache.received_advertisement(ip(1), mac(1), PortId(1), solicited);
    cache.received_advertisement(ip(2), mac(2), PortId(2), solicited);
    cache.flush_pipeline().await.unwrap();

    let before = updater.handle().current_state();
    cache.port_down(PortId(1));
    cache.flush_pipeline().await.unwrap();

    assert_eq!(entry_state(&cache, &updater, ip(1)).await, None);
    assert_eq!(
        entry_state(&cache, &updater, ip(2)).await,
        Some(NeighborEntryState::Reachable)
    );
    // Copy-on-write: the pre-flush root still shows both entries.
    assert!(before
        .vlans()
        .get(&VLAN)
        .unwrap()
        .arp_table
        .get(&ip(1))
        .is_some());

    updater.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn entries_age_down_the_ladder_and_out() {
    let (updater, mut cache) = rig();

    cache.received_advertisement(
        ip(1),
        mac(1),
        PortId(1),
        AdvertisementFlags {
            solicited: true,
            override_entry: false,
        },
    );
    cache.add_static(ip(2), mac(2), PortId(1));
    cache.flush_pipeline().await.unwrap();

    // Fresh entry survives a tick untouched.
    assert!(cache.age_tick().is_empty());
    assert_eq!(
        entry_state(&cache, &updater, ip(1)).await,
        Some(NeighborEntryState::Reachable)
    );

    // Past the stale threshold: REACHABLE -> STALE, no probe yet.
    tokio::time::advance(Duration::from_secs(46)).await;
    assert!(cache.age_tick().is_empty());
    assert_eq!(
        entry_state(&cache, &updater, ip(1)).await,
        Some(NeighborEntryState::Stale)
    );

    // Past the probe threshold: STALE -> UNVERIFIED plus a probe request.
    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(cache.age_tick(), vec![ip(1)]);
    assert_eq!(
        entry_state(&cache, &updater, ip(1)).await,
        Some(NeighborEntryState::Unverified)
    );

    // Unanswered probe: the entry expires and leaves the tree.
    tokio::time::advance(Duration::from_secs(10)).await;
    cache.age_tick();
    assert_eq!(entry_state(&cache, &updater, ip(1)).await, None);

    // The static entry never moved.
    assert_eq!(
        entry_state(&cache, &updater, ip(2)).await,
        Some(NeighborEntryState::Static)
    );

    updater.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_solicitation_expires() {
    let (updater, mut cache) = rig();

    cache.sent_solicitation(ip(1));
    cache.flush_pipeline().await.unwrap();

    tokio::time::advance(Duration::from_secs(6)).await;
    cache.age_tick();
    assert_eq!(entry_state(&cache, &updater, ip(1)).await, None);

    updater.shutdown().await;
}
