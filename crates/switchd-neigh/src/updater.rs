//! Neighbor updater task.
//!
//! One task per protocol cache: events from the packet path arrive over an
//! unbounded channel and the prober tick runs on the same loop, so cache
//! bookkeeping needs no locking. Addresses the prober wants solicited are
//! handed to the platform layer through the probe channel.

use crate::cache::{AdvertisementFlags, NeighborAddr, NeighborCache};
use crate::error::{NeighborError, Result};
use std::time::Duration;
use switchd_types::{MacAddress, PortId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

enum NeighborEvent<A> {
    SentSolicitation(A),
    Solicitation {
        ip: A,
        mac: MacAddress,
        port: PortId,
    },
    Advertisement {
        ip: A,
        mac: MacAddress,
        port: PortId,
        flags: AdvertisementFlags,
    },
    AddStatic {
        ip: A,
        mac: MacAddress,
        port: PortId,
    },
    Flush(A),
    PortDown(PortId),
    Shutdown(oneshot::Sender<()>),
}

/// Client handle to a neighbor updater task.
pub struct NeighborHandle<A> {
    tx: mpsc::UnboundedSender<NeighborEvent<A>>,
}

impl<A> Clone for NeighborHandle<A> {
    fn clone(&self) -> Self {
        NeighborHandle {
            tx: self.tx.clone(),
        }
    }
}

impl<A: NeighborAddr> NeighborHandle<A> {
    pub fn sent_solicitation(&self, ip: A) -> Result<()> {
        self.send(NeighborEvent::SentSolicitation(ip))
    }

    pub fn received_solicitation(&self, ip: A, mac: MacAddress, port: PortId) -> Result<()> {
        self.send(NeighborEvent::Solicitation { ip, mac, port })
    }

    pub fn received_advertisement(
        &self,
        ip: A,
        mac: MacAddress,
        port: PortId,
        flags: AdvertisementFlags,
    ) -> Result<()> {
        self.send(NeighborEvent::Advertisement {
            ip,
            mac,
            port,
            flags,
        })
    }

    pub fn add_static(&self, ip: A, mac: MacAddress, port: PortId) -> Result<()> {
        self.send(NeighborEvent::AddStatic { ip, mac, port })
    }

    pub fn flush(&self, ip: A) -> Result<()> {
        self.send(NeighborEvent::Flush(ip))
    }

    pub fn port_down(&self, port: PortId) -> Result<()> {
        self.send(NeighborEvent::PortDown(port))
    }

    /// Stops the updater after it has drained everything already queued.
    pub async fn stop(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(NeighborEvent::Shutdown(done_tx))?;
        done_rx.await.map_err(|_| NeighborError::ShutDown)
    }

    fn send(&self, event: NeighborEvent<A>) -> Result<()> {
        self.tx.send(event).map_err(|_| NeighborError::ShutDown)
    }
}

pub struct NeighborUpdater<A: NeighborAddr> {
    cache: NeighborCache<A>,
    events: mpsc::UnboundedReceiver<NeighborEvent<A>>,
    probes: mpsc::UnboundedSender<A>,
    probe_interval: Duration,
}

impl<A: NeighborAddr> NeighborUpdater<A> {
    /// Spawns the updater loop. `probes` receives the addresses the aging
    /// prober wants a solicitation sent to.
    pub fn spawn(
        cache: NeighborCache<A>,
        probes: mpsc::UnboundedSender<A>,
        probe_interval: Duration,
    ) -> (NeighborHandle<A>, JoinHandle<()>) {
        let (tx, events) = mpsc::unbounded_channel();
        let updater = NeighborUpdater {
            cache,
            events,
            probes,
            probe_interval,
        };
        let task = tokio::spawn(updater.run());
        (NeighborHandle { tx }, task)
    }

    async fn run(mut self) {
        info!(
            protocol = A::PROTOCOL,
            vlan = %self.cache.vlan(),
            "neighbor updater started"
        );
        let mut tick = tokio::time::interval(self.probe_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    None => break,
                    Some(NeighborEvent::Shutdown(done)) => {
                        let _ = done.send(());
                        break;
                    }
                    Some(event) => self.handle_event(event),
                },
                _ = tick.tick() => {
                    for ip in self.cache.age_tick() {
                        // Receiver gone just means nobody probes anymore.
                        let _ = self.probes.send(ip);
                    }
                }
            }
        }
        info!(protocol = A::PROTOCOL, "neighbor updater exiting");
    }

    fn handle_event(&mut self, event: NeighborEvent<A>) {
        match event {
            NeighborEvent::SentSolicitation(ip) => self.cache.sent_solicitation(ip),
            NeighborEvent::Solicitation { ip, mac, port } => {
                self.cache.received_solicitation(ip, mac, port);
            }
            NeighborEvent::Advertisement {
                ip,
                mac,
                port,
                flags,
            } => self.cache.received_advertisement(ip, mac, port, flags),
            NeighborEvent::AddStatic { ip, mac, port } => self.cache.add_static(ip, mac, port),
            NeighborEvent::Flush(ip) => self.cache.flush(ip),
            NeighborEvent::PortDown(port) => self.cache.port_down(port),
            NeighborEvent::Shutdown(_) => unreachable!("handled by the run loop"),
        }
    }
}
