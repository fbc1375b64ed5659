//! Control-plane (CPU port) state node.

use crate::node::{Node, NodeBase};
use serde::Serialize;

/// One CPU queue's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuQueue {
    pub id: u8,
    pub name: String,
    pub weight: u32,
    /// Packets-per-second cap, if policed.
    pub rate_limit_pps: Option<u32>,
}

/// Configuration of traffic punted to the CPU.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ControlPlane {
    #[serde(skip)]
    base: NodeBase,
    pub queues: Vec<CpuQueue>,
}

impl ControlPlane {
    pub fn new() -> Self {
        ControlPlane::default()
    }

    pub fn queue(&self, id: u8) -> Option<&CpuQueue> {
        self.queues.iter().find(|q| q.id == id)
    }
}

impl Node for ControlPlane {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.base.mark_published();
    }
}
