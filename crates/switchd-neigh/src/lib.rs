//! ARP/NDP neighbor caches for switchd.
//!
//! A [`cache::NeighborCache`] maintains one VLAN's neighbor table for one
//! address family, applying every change as a copy-on-write transform on
//! the switch state tree. The [`updater::NeighborUpdater`] task serializes
//! packet-path events with the periodic aging prober.

pub mod cache;
pub mod error;
pub mod updater;

pub use cache::{AdvertisementFlags, NeighborAddr, NeighborCache, NeighborCacheConfig};
pub use error::{NeighborError, Result};
pub use updater::{NeighborHandle, NeighborUpdater};
