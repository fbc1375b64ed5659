//! Link aggregation manager task.
//!
//! One tokio task owns every per-port controller, the shared selector and a
//! single delay queue multiplexing all protocol timers. Events arrive over
//! an unbounded channel from the [`LagHandle`]; because everything LACP
//! happens on this one task, machine transitions and selection updates need
//! no further synchronization.

use crate::controller::{LacpContext, LacpController, PeerSignals, PortConfig};
use crate::error::{LacpError, Result};
use crate::machines::{Scheduler, TimerKind};
use crate::pdu::Lacpdu;
use crate::selector::Selector;
use crate::servicer::LacpServicer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchd_types::PortId;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::time::delay_queue::{DelayQueue, Key};
use tracing::{debug, info, warn};

enum LacpEvent {
    AddPort(Box<PortConfig>),
    RemovePort(PortId),
    PortUp(PortId),
    PortDown(PortId),
    Frame { port: PortId, data: Vec<u8> },
    Shutdown(oneshot::Sender<()>),
}

/// Client handle to the manager task.
#[derive(Clone)]
pub struct LagHandle {
    tx: mpsc::UnboundedSender<LacpEvent>,
}

impl LagHandle {
    pub fn add_port(&self, config: PortConfig) -> Result<()> {
        self.send(LacpEvent::AddPort(Box::new(config)))
    }

    pub fn remove_port(&self, port: PortId) -> Result<()> {
        self.send(LacpEvent::RemovePort(port))
    }

    pub fn port_up(&self, port: PortId) -> Result<()> {
        self.send(LacpEvent::PortUp(port))
    }

    pub fn port_down(&self, port: PortId) -> Result<()> {
        self.send(LacpEvent::PortDown(port))
    }

    /// Inbound slow-protocols payload for `port`, starting at the subtype
    /// octet (Ethernet header already stripped).
    pub fn received_frame(&self, port: PortId, data: Vec<u8>) -> Result<()> {
        self.send(LacpEvent::Frame { port, data })
    }

    /// Stops the manager after it has drained everything already queued.
    pub async fn stop(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(LacpEvent::Shutdown(done_tx))?;
        done_rx.await.map_err(|_| LacpError::ShutDown)
    }

    fn send(&self, event: LacpEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| LacpError::ShutDown)
    }
}

/// All protocol timers, multiplexed through one delay queue. Scheduling a
/// (port, kind) pair that is already armed replaces the pending instance.
struct TimerWheel {
    queue: DelayQueue<(PortId, TimerKind)>,
    keys: HashMap<(PortId, TimerKind), Key>,
}

impl TimerWheel {
    fn new() -> Self {
        TimerWheel {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }
}

impl Scheduler for TimerWheel {
    fn schedule(&mut self, port: PortId, kind: TimerKind, after: Duration) {
        if let Some(key) = self.keys.remove(&(port, kind)) {
            self.queue.remove(&key);
        }
        let key = self.queue.insert((port, kind), after);
        self.keys.insert((port, kind), key);
    }

    fn cancel(&mut self, port: PortId, kind: TimerKind) {
        if let Some(key) = self.keys.remove(&(port, kind)) {
            self.queue.remove(&key);
        }
    }
}

pub struct LinkAggregationManager {
    controllers: HashMap<PortId, LacpController>,
    selector: Selector,
    timers: TimerWheel,
    servicer: Arc<dyn LacpServicer>,
    events: mpsc::UnboundedReceiver<LacpEvent>,
}

impl LinkAggregationManager {
    pub fn spawn(servicer: Arc<dyn LacpServicer>) -> (LagHandle, JoinHandle<()>) {
        let (tx, events) = mpsc::unbounded_channel();
        let manager = LinkAggregationManager {
            controllers: HashMap::new(),
            selector: Selector::new(),
            timers: TimerWheel::new(),
            servicer,
            events,
        };
        let task = tokio::spawn(manager.run());
        (LagHandle { tx }, task)
    }

    async fn run(mut self) {
        info!("link aggregation manager started");
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    None => break,
                    Some(LacpEvent::Shutdown(done)) => {
                        let _ = done.send(());
                        break;
                    }
                    Some(event) => self.handle_event(event),
                },
                Some(expired) = self.timers.queue.next(), if !self.timers.queue.is_empty() => {
                    let (port, kind) = expired.into_inner();
                    self.timers.keys.remove(&(port, kind));
                    self.dispatch(port, |controller, ctx| controller.timer_expired(kind, ctx));
                }
            }
        }
        info!("link aggregation manager exiting");
    }

    fn handle_event(&mut self, event: LacpEvent) {
        match event {
            LacpEvent::AddPort(config) => self.add_port(*config),
            LacpEvent::RemovePort(port) => self.remove_port(port),
            LacpEvent::PortUp(port) => {
                self.dispatch(port, |controller, ctx| controller.port_up(ctx));
            }
            LacpEvent::PortDown(port) => {
                self.dispatch(port, |controller, ctx| controller.port_down(ctx));
            }
            LacpEvent::Frame { port, data } => match Lacpdu::parse(&data) {
                Ok(pdu) => {
                    self.dispatch(port, |controller, ctx| controller.received_pdu(&pdu, ctx));
                }
                Err(e) => {
                    warn!(%port, error = %e, "dropping malformed LACPDU");
                }
            },
            LacpEvent::Shutdown(_) => unreachable!("handled by the run loop"),
        }
    }

    fn add_port(&mut self, config: PortConfig) {
        let port = config.port;
        if self.controllers.contains_key(&port) {
            warn!(%port, "port already under LACP control, ignoring add");
            return;
        }
        info!(
            %port,
            aggregate = %config.aggregate,
            min_links = config.min_link_count,
            "bringing port under LACP control"
        );
        self.controllers.insert(port, LacpController::new(config));
        self.dispatch(port, |controller, ctx| controller.start(ctx));
    }

    fn remove_port(&mut self, port: PortId) {
        let Some(mut controller) = self.controllers.remove(&port) else {
            warn!(%port, "remove for port not under LACP control");
            return;
        };
        info!(%port, "releasing port from LACP control");
        let peers = {
            let mut ctx = LacpContext {
                selector: &mut self.selector,
                timers: &mut self.timers,
                servicer: self.servicer.as_ref(),
            };
            controller.stop(&mut ctx)
        };
        Self::route(
            &mut self.controllers,
            &mut self.selector,
            &mut self.timers,
            self.servicer.as_ref(),
            peers,
        );
    }

    fn dispatch(
        &mut self,
        port: PortId,
        f: impl FnOnce(&mut LacpController, &mut LacpContext<'_>) -> PeerSignals,
    ) {
        let LinkAggregationManager {
            controllers,
            selector,
            timers,
            servicer,
            ..
        } = self;
        let Some(controller) = controllers.get_mut(&port) else {
            warn!(%port, "event for port not under LACP control");
            return;
        };
        let peers = {
            let mut ctx = LacpContext {
                selector,
                timers,
                servicer: servicer.as_ref(),
            };
            f(controller, &mut ctx)
        };
        Self::route(controllers, selector, timers, servicer.as_ref(), peers);
    }

    /// Delivers selection verdicts, in order, to their target controllers.
    /// A verdict may fan out further verdicts (batch promotion reaching
    /// min-links); those are appended and handled in the same pass.
    fn route(
        controllers: &mut HashMap<PortId, LacpController>,
        selector: &mut Selector,
        timers: &mut TimerWheel,
        servicer: &dyn LacpServicer,
        pending: PeerSignals,
    ) {
        let mut queue = pending;
        let mut i = 0;
        while i < queue.len() {
            let (port, signal) = queue[i];
            i += 1;
            let Some(controller) = controllers.get_mut(&port) else {
                debug!(%port, "dropping selection verdict for removed port");
                continue;
            };
            let mut ctx = LacpContext {
                selector,
                timers,
                servicer,
            };
            let more = controller.apply_selection(signal, &mut ctx);
            queue.extend(more);
        }
    }
}
