//! ACL entry state node.

use crate::node::{Node, NodeBase};
use crate::node_map::NodeMap;
use serde::Serialize;
use std::net::IpAddr;

/// What to do with traffic matching an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AclAction {
    Permit,
    Deny,
    /// Redirect to the CPU (control-plane policing uses this).
    SendToCpu,
}

/// One ACL rule. Lower priority value wins.
#[derive(Debug, Clone, Serialize)]
pub struct AclEntry {
    #[serde(skip)]
    base: NodeBase,
    pub name: String,
    pub priority: u32,
    pub action: AclAction,
    pub src: Option<(IpAddr, u8)>,
    pub dst: Option<(IpAddr, u8)>,
    /// EtherType match, if any (e.g. 0x8809 for slow protocols).
    pub ether_type: Option<u16>,
}

impl AclEntry {
    pub fn new(name: impl Into<String>, priority: u32, action: AclAction) -> Self {
        AclEntry {
            base: NodeBase::default(),
            name: name.into(),
            priority,
            action,
            src: None,
            dst: None,
            ether_type: None,
        }
    }
}

impl Node for AclEntry {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        self.base.mark_published();
    }
}

/// All ACL entries, keyed by name.
pub type AclMap = NodeMap<String, AclEntry>;
