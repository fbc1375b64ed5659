//! Single-writer state update pipeline.
//!
//! Producers submit pure transform functions (`old root -> new root`, or
//! `None` for no change). One task applies them strictly in FIFO order,
//! publishes each resulting root, and broadcasts it to subscribers through a
//! `watch` channel. Subscribers therefore always observe a fully published
//! root, and at most one transform is ever in flight.

use crate::delta::StateDelta;
use crate::node::Node;
use crate::switch_state::SwitchState;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A pure transform over the current root.
pub type StateTransform =
    Box<dyn FnOnce(&Arc<SwitchState>) -> Option<Arc<SwitchState>> + Send + 'static>;

#[derive(Debug, Error)]
pub enum StateUpdateError {
    #[error("state update pipeline has shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, StateUpdateError>;

enum Update {
    Apply {
        name: &'static str,
        transform: StateTransform,
        done: Option<oneshot::Sender<Arc<SwitchState>>>,
    },
    Shutdown,
}

/// Handle for submitting transforms and reading the current root.
#[derive(Clone)]
pub struct StateHandle {
    tx: mpsc::UnboundedSender<Update>,
    state_rx: watch::Receiver<Arc<SwitchState>>,
}

impl StateHandle {
    /// The most recently installed root.
    pub fn current_state(&self) -> Arc<SwitchState> {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to root installations.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SwitchState>> {
        self.state_rx.clone()
    }

    /// Queue a transform; it will be applied after everything already queued.
    pub fn submit(
        &self,
        name: &'static str,
        transform: impl FnOnce(&Arc<SwitchState>) -> Option<Arc<SwitchState>> + Send + 'static,
    ) -> Result<()> {
        self.tx
            .send(Update::Apply {
                name,
                transform: Box::new(transform),
                done: None,
            })
            .map_err(|_| StateUpdateError::ShutDown)
    }

    /// Queue a transform and wait for it to be applied. Resolves to the root
    /// in effect after the transform ran (unchanged on a no-op).
    pub async fn submit_and_wait(
        &self,
        name: &'static str,
        transform: impl FnOnce(&Arc<SwitchState>) -> Option<Arc<SwitchState>> + Send + 'static,
    ) -> Result<Arc<SwitchState>> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Update::Apply {
                name,
                transform: Box::new(transform),
                done: Some(done_tx),
            })
            .map_err(|_| StateUpdateError::ShutDown)?;
        done_rx.await.map_err(|_| StateUpdateError::ShutDown)
    }
}

/// The single-writer apply loop. Owns the authoritative root.
pub struct StateUpdater {
    handle: StateHandle,
    task: JoinHandle<()>,
}

impl StateUpdater {
    /// Publishes `initial` and spawns the apply loop.
    pub fn spawn(initial: SwitchState) -> Self {
        let root = Arc::new(initial);
        root.publish();

        let (tx, mut rx) = mpsc::unbounded_channel::<Update>();
        let (state_tx, state_rx) = watch::channel(root.clone());

        let task = tokio::spawn(async move {
            let mut current = root;
            while let Some(update) = rx.recv().await {
                let (name, transform, done) = match update {
                    Update::Apply {
                        name,
                        transform,
                        done,
                    } => (name, transform, done),
                    Update::Shutdown => break,
                };
                match transform(&current) {
                    Some(new_root) => {
                        new_root.publish();
                        let delta = StateDelta::new(current.clone(), new_root.clone());
                        debug!(
                            update = name,
                            changed_ports = delta.ports_delta().count(),
                            changed_aggs = delta.aggregate_ports_delta().count(),
                            "applied state update"
                        );
                        current = new_root;
                        // Subscribers having gone away is not an error here.
                        let _ = state_tx.send(current.clone());
                    }
                    None => {
                        debug!(update = name, "state update was a no-op");
                    }
                }
                if let Some(done) = done {
                    let _ = done.send(current.clone());
                }
            }
            info!("state update pipeline exiting");
        });

        StateUpdater {
            handle: StateHandle { tx, state_rx },
            task,
        }
    }

    pub fn handle(&self) -> StateHandle {
        self.handle.clone()
    }

    /// Applies everything queued ahead of the call, then stops the loop.
    pub async fn shutdown(self) {
        let StateUpdater { handle, task } = self;
        let _ = handle.tx.send(Update::Shutdown);
        drop(handle);
        let _ = task.await;
    }
}
