//! Aggregate selection logic.
//!
//! One selector instance serves every port under a manager, so selection
//! state is naturally serialized: all reads and writes happen on the
//! manager task. Ports are held in STANDBY until their LAG musters the
//! aggregate's minimum link count, then the whole batch is promoted to
//! SELECTED at once so the LAG never runs below its floor.

use crate::types::{LacpState, LagId, ParticipantInfo};
use std::collections::HashMap;
use switchd_types::{AggregatePortId, PortId};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionState {
    Selected,
    Standby,
}

/// Verdicts the selector hands back for the manager to route to the named
/// port's mux machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionSignal {
    Selected,
    Standby,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub lag_id: LagId,
    pub state: SelectionState,
}

#[derive(Default)]
pub struct Selector {
    selections: HashMap<PortId, Selection>,
}

impl Selector {
    pub fn new() -> Self {
        Selector::default()
    }

    pub fn selection(&self, port: PortId) -> Option<Selection> {
        self.selections.get(&port).copied()
    }

    /// Runs selection for `port` against its current actor and partner
    /// records. Returns the signals to deliver, in order; a promotion
    /// includes a `Selected` signal for every standby member of the LAG.
    pub fn select(
        &mut self,
        port: PortId,
        actor: &ParticipantInfo,
        partner: &ParticipantInfo,
        aggregate: AggregatePortId,
        min_link_count: u8,
    ) -> Vec<(PortId, SelectionSignal)> {
        let target = LagId::new(actor, partner);
        if let Some(existing) = self.selections.get(&port) {
            if existing.lag_id == target {
                return Vec::new();
            }
        }

        let mut signals = Vec::new();

        // An individual link aggregates with nothing; it is its own LAG and
        // is usable immediately.
        let individual = !actor.state.contains(LacpState::AGGREGATABLE)
            || !partner.state.contains(LacpState::AGGREGATABLE);
        if individual {
            self.selections.insert(
                port,
                Selection {
                    lag_id: target,
                    state: SelectionState::Selected,
                },
            );
            signals.push((port, SelectionSignal::Selected));
            return signals;
        }

        let joins_existing = self
            .selections
            .iter()
            .any(|(p, s)| *p != port && s.lag_id == target);
        let aggregator_free = !self
            .selections
            .values()
            .any(|s| s.lag_id.actor_key == aggregate.raw());

        if !joins_existing && !aggregator_free {
            debug!(%port, lag = %target, "aggregator busy with another LAG, not selecting");
            return signals;
        }

        self.selections.insert(
            port,
            Selection {
                lag_id: target,
                state: SelectionState::Standby,
            },
        );
        signals.push((port, SelectionSignal::Standby));

        // Batch promotion: once the LAG reaches the minimum link count,
        // every standby member goes SELECTED in the same pass.
        let members: Vec<PortId> = self
            .selections
            .iter()
            .filter(|(_, s)| s.lag_id == target)
            .map(|(p, _)| *p)
            .collect();
        if members.len() >= min_link_count as usize {
            let mut standby: Vec<PortId> = self
                .selections
                .iter()
                .filter(|(_, s)| s.lag_id == target && s.state == SelectionState::Standby)
                .map(|(p, _)| *p)
                .collect();
            standby.sort_unstable();
            debug!(lag = %target, members = members.len(), "promoting standby members");
            for member in standby {
                signals.push((member, SelectionSignal::Selected));
            }
        }

        signals
    }

    /// Drops `port`'s selection and demotes every surviving SELECTED member
    /// of its LAG back to standby; the survivors re-run selection and are
    /// promoted again once the LAG musters the minimum link count.
    pub fn unselected(&mut self, port: PortId) -> Vec<(PortId, SelectionSignal)> {
        let Some(removed) = self.selections.remove(&port) else {
            debug!(%port, "unselected with no selection on record");
            return Vec::new();
        };

        let mut survivors: Vec<PortId> = self
            .selections
            .iter()
            .filter(|(_, s)| s.lag_id == removed.lag_id)
            .map(|(p, _)| *p)
            .collect();
        survivors.sort_unstable();
        survivors
            .into_iter()
            .filter(|p| self.selections[p].state == SelectionState::Selected)
            .map(|p| (p, SelectionSignal::Standby))
            .collect()
    }

    /// Records that `port`'s controller accepted a `Selected` verdict. The
    /// selection must exist; a missing record means signal routing is
    /// broken.
    pub fn mark_selected(&mut self, port: PortId) {
        let selection = self
            .selections
            .get_mut(&port)
            .unwrap_or_else(|| panic!("no selection on record for {port}"));
        selection.state = SelectionState::Selected;
    }

    pub fn mark_standby(&mut self, port: PortId) {
        if let Some(selection) = self.selections.get_mut(&port) {
            selection.state = SelectionState::Standby;
        }
    }
}
