//! Per-VLAN neighbor cache.
//!
//! One cache instance covers one VLAN's table for one protocol (ARP over
//! IPv4, NDP over IPv6). Every mutation is a copy-on-write transform
//! submitted to the state update pipeline, so observers always see a
//! complete table. The cache keeps only freshness timestamps on the side;
//! the table in the state tree is the source of truth.

use crate::error::Result;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use switchd_state::{
    NeighborEntry, NeighborEntryState, NeighborTable, StateHandle, SwitchState, Vlan,
};
use switchd_types::{InterfaceId, MacAddress, PortId, VlanId};
use tokio::time::Instant;
use tracing::{debug, error};

/// An address family with a neighbor table in the VLAN node.
pub trait NeighborAddr:
    Copy + Ord + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Protocol tag for logging.
    const PROTOCOL: &'static str;

    fn table(vlan: &Vlan) -> &NeighborTable<Self>;
    fn table_mut(vlan: &mut Vlan) -> &mut NeighborTable<Self>;
}

impl NeighborAddr for Ipv4Addr {
    const PROTOCOL: &'static str = "arp";

    fn table(vlan: &Vlan) -> &NeighborTable<Self> {
        vlan.arp_table.as_ref()
    }

    fn table_mut(vlan: &mut Vlan) -> &mut NeighborTable<Self> {
        vlan.arp_table_mut()
    }
}

impl NeighborAddr for Ipv6Addr {
    const PROTOCOL: &'static str = "ndp";

    fn table(vlan: &Vlan) -> &NeighborTable<Self> {
        vlan.ndp_table.as_ref()
    }

    fn table_mut(vlan: &mut Vlan) -> &mut NeighborTable<Self> {
        vlan.ndp_table_mut()
    }
}

/// Flags carried by a neighbor advertisement.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdvertisementFlags {
    /// Response to a solicitation of ours.
    pub solicited: bool,
    /// Sender insists its link-layer address replaces whatever is cached.
    pub override_entry: bool,
}

/// Aging thresholds, measured from an entry's last refresh.
#[derive(Clone, Copy, Debug)]
pub struct NeighborCacheConfig {
    /// Unanswered PENDING entries are dropped after this long.
    pub pending_after: Duration,
    /// REACHABLE entries degrade to STALE after this long.
    pub stale_after: Duration,
    /// STALE entries get probed (and become UNVERIFIED) after this long.
    pub probe_after: Duration,
    /// Entries still unconfirmed after this long are expired and flushed.
    pub expire_after: Duration,
}

impl Default for NeighborCacheConfig {
    fn default() -> Self {
        NeighborCacheConfig {
            pending_after: Duration::from_secs(5),
            stale_after: Duration::from_secs(45),
            probe_after: Duration::from_secs(50),
            expire_after: Duration::from_secs(60),
        }
    }
}

pub struct NeighborCache<A: NeighborAddr> {
    vlan: VlanId,
    interface: InterfaceId,
    config: NeighborCacheConfig,
    updates: StateHandle,
    refreshed: HashMap<A, Instant>,
}

impl<A: NeighborAddr> NeighborCache<A> {
    pub fn new(
        vlan: VlanId,
        interface: InterfaceId,
        config: NeighborCacheConfig,
        updates: StateHandle,
    ) -> Self {
        NeighborCache {
            vlan,
            interface,
            config,
            updates,
            refreshed: HashMap::new(),
        }
    }

    pub fn vlan(&self) -> VlanId {
        self.vlan
    }

    /// We sent a solicitation for `ip`: make sure a PENDING placeholder
    /// exists so the eventual advertisement has somewhere to land.
    pub fn sent_solicitation(&mut self, ip: A) {
        if self.entry(ip).is_some() {
            return;
        }
        self.refreshed.insert(ip, Instant::now());
        let (vlan_id, interface) = (self.vlan, self.interface);
        self.submit("neighbor solicitation sent", move |root| {
            let mut next = root.clone();
            let vlan = Vlan::modify(vlan_id, &mut next)?;
            let table = A::table_mut(vlan);
            if table.contains_key(&ip) {
                return None;
            }
            table.insert(ip, Arc::new(NeighborEntry::pending(ip, interface)));
            Some(next)
        });
    }

    /// A neighbor asked for us, telling us its own addresses in passing.
    /// Matching entries are refreshed; anything else is replaced with a
    /// STALE entry carrying the new fields.
    pub fn received_solicitation(&mut self, ip: A, mac: MacAddress, port: PortId) {
        match self.entry(ip) {
            Some(e) if e.mac == mac && e.port == port && !e.is_pending() => {
                self.refreshed.insert(ip, Instant::now());
            }
            _ => self.set_entry(ip, mac, port, NeighborEntryState::Stale),
        }
    }

    /// Advertisement handling. Incomplete or missing entries accept
    /// unconditionally; the OVERRIDE flag replaces a complete entry even on
    /// mismatch; otherwise only a solicited advertisement with matching
    /// fields refreshes the entry.
    pub fn received_advertisement(
        &mut self,
        ip: A,
        mac: MacAddress,
        port: PortId,
        flags: AdvertisementFlags,
    ) {
        let existing = self.entry(ip);
        let incomplete = existing.as_ref().is_some_and(|e| e.is_pending());
        let target = if flags.solicited {
            NeighborEntryState::Reachable
        } else {
            NeighborEntryState::Stale
        };

        if existing.is_none() || incomplete || flags.override_entry {
            self.set_entry(ip, mac, port, target);
            return;
        }

        let existing = existing.expect("checked above");
        if flags.solicited {
            if existing.mac == mac && existing.port == port {
                self.set_entry(ip, mac, port, NeighborEntryState::Reachable);
            } else {
                debug!(
                    protocol = A::PROTOCOL,
                    %ip,
                    "advertisement fields mismatch without override, ignoring"
                );
            }
        } else {
            debug!(
                protocol = A::PROTOCOL,
                %ip,
                "unsolicited advertisement for complete entry, ignoring"
            );
        }
    }

    /// Installs a statically configured neighbor. Static entries are never
    /// aged.
    pub fn add_static(&mut self, ip: A, mac: MacAddress, port: PortId) {
        self.set_entry(ip, mac, port, NeighborEntryState::Static);
    }

    pub fn flush(&mut self, ip: A) {
        self.refreshed.remove(&ip);
        let vlan_id = self.vlan;
        self.submit("neighbor entry flush", move |root| {
            let mut next = root.clone();
            let vlan = Vlan::modify(vlan_id, &mut next)?;
            A::table_mut(vlan).remove(&ip)?;
            Some(next)
        });
    }

    /// Drops every entry learned on `port` in one transform.
    pub fn port_down(&mut self, port: PortId) {
        if let Some(vlan) = self.current_vlan() {
            let forgotten: Vec<A> = A::table(&vlan)
                .iter()
                .filter(|(_, e)| e.port == port)
                .map(|(ip, _)| *ip)
                .collect();
            for ip in forgotten {
                self.refreshed.remove(&ip);
            }
        }

        let vlan_id = self.vlan;
        self.submit("neighbor port flush", move |root| {
            let mut next = root.clone();
            let vlan = Vlan::modify(vlan_id, &mut next)?;
            let table = A::table_mut(vlan);
            let doomed: Vec<A> = table
                .iter()
                .filter(|(_, e)| e.port == port)
                .map(|(ip, _)| *ip)
                .collect();
            if doomed.is_empty() {
                return None;
            }
            for ip in doomed {
                table.remove(&ip);
            }
            Some(next)
        });
    }

    /// One prober pass: ages entries down the
    /// REACHABLE → STALE → UNVERIFIED → gone ladder and collects the
    /// addresses a solicitation probe should be sent to.
    pub fn age_tick(&mut self) -> Vec<A> {
        let now = Instant::now();
        let mut probes = Vec::new();
        let Some(vlan) = self.current_vlan() else {
            return probes;
        };

        let mut stale = Vec::new();
        let mut expired = Vec::new();
        for (ip, entry) in A::table(&vlan).iter() {
            if entry.state == NeighborEntryState::Static {
                continue;
            }
            let Some(&refreshed) = self.refreshed.get(ip) else {
                // Entry predates us (restart); start its clock now.
                self.refreshed.insert(*ip, now);
                continue;
            };
            let age = now.duration_since(refreshed);
            match entry.state {
                NeighborEntryState::Pending if age >= self.config.pending_after => {
                    expired.push(*ip);
                }
                NeighborEntryState::Reachable if age >= self.config.stale_after => {
                    stale.push((*ip, NeighborEntryState::Stale));
                }
                NeighborEntryState::Stale if age >= self.config.probe_after => {
                    stale.push((*ip, NeighborEntryState::Unverified));
                    probes.push(*ip);
                }
                NeighborEntryState::Unverified if age >= self.config.expire_after => {
                    expired.push(*ip);
                }
                NeighborEntryState::Expired => expired.push(*ip),
                _ => {}
            }
        }

        for (ip, state) in stale {
            self.update_state(ip, state);
        }
        for ip in expired {
            debug!(protocol = A::PROTOCOL, %ip, "neighbor entry aged out");
            self.update_state(ip, NeighborEntryState::Expired);
            self.flush(ip);
        }
        probes
    }

    /// Next-hop resolution against the current root.
    pub fn resolve(&self, ip: A) -> Option<(MacAddress, PortId)> {
        let entry = self.entry(ip)?;
        entry
            .state
            .is_resolved()
            .then_some((entry.mac, entry.port))
    }

    fn entry(&self, ip: A) -> Option<Arc<NeighborEntry<A>>> {
        let vlan = self.current_vlan()?;
        A::table(&vlan).get(&ip).cloned()
    }

    fn current_vlan(&self) -> Option<Arc<Vlan>> {
        self.updates.current_state().vlans().get(&self.vlan).cloned()
    }

    fn set_entry(&mut self, ip: A, mac: MacAddress, port: PortId, state: NeighborEntryState) {
        self.refreshed.insert(ip, Instant::now());
        debug!(protocol = A::PROTOCOL, %ip, %mac, %port, ?state, "recording neighbor entry");
        let (vlan_id, interface) = (self.vlan, self.interface);
        self.submit("neighbor entry update", move |root| {
            let mut next = root.clone();
            let vlan = Vlan::modify(vlan_id, &mut next)?;
            let table = A::table_mut(vlan);
            if let Some(existing) = table.get(&ip) {
                if existing.mac == mac && existing.port == port && existing.state == state {
                    return None;
                }
            }
            table.insert(
                ip,
                Arc::new(NeighborEntry::new(ip, mac, port, interface, state)),
            );
            Some(next)
        });
    }

    fn update_state(&mut self, ip: A, state: NeighborEntryState) {
        let vlan_id = self.vlan;
        self.submit("neighbor state change", move |root| {
            let mut next = root.clone();
            let vlan = Vlan::modify(vlan_id, &mut next)?;
            let entry = A::table_mut(vlan).modify_node(&ip)?;
            if entry.state == state {
                return None;
            }
            entry.state = state;
            Some(next)
        });
    }

    fn submit(
        &self,
        name: &'static str,
        transform: impl FnOnce(&Arc<SwitchState>) -> Option<Arc<SwitchState>> + Send + 'static,
    ) {
        if let Err(e) = self.updates.submit(name, transform) {
            error!(
                protocol = A::PROTOCOL,
                vlan = %self.vlan,
                error = %e,
                "state pipeline rejected neighbor update"
            );
        }
    }

    /// Queues a no-op transform and waits for it, so callers can observe
    /// everything submitted before it.
    pub async fn flush_pipeline(&self) -> Result<()> {
        self.updates
            .submit_and_wait("neighbor pipeline barrier", |_| None)
            .await
            .map_err(|_| crate::error::NeighborError::ShutDown)?;
        Ok(())
    }
}
