//! End-to-end LACP handshake between two switch stacks.
//!
//! Each side runs a real state update pipeline, servicer and manager task;
//! a pump task carries LACPDUs from one side's egress channel into the
//! other side's manager. Time is paused, so protocol timers fire in
//! simulated time and the whole exchange converges instantly.

use std::sync::Arc;
use std::time::Duration;

use switchd_lacp::{
    pdu, LacpActivity, LacpRate, LagHandle, LinkAggregationManager, OutboundFrame, PortConfig,
    SwitchServicer,
};
use switchd_state::{AggregatePort, Forwarding, Port, PortState, StateHandle, StateUpdater, SwitchState};
use switchd_types::{AggregatePortId, MacAddress, PortId};
use tokio::sync::mpsc;

const AGG: AggregatePortId = AggregatePortId(1);
const MEMBER: PortId = PortId(1);

struct Stack {
    updater: StateUpdater,
    updates: StateHandle,
    lag: LagHandle,
    egress: mpsc::UnboundedReceiver<OutboundFrame>,
}

fn initial_state(system_mac: MacAddress) -> SwitchState {
    let mut state = SwitchState::new();
    let mut port = Port::new(MEMBER, "eth1/1");
    port.state = PortState::Up;
    state.ports_mut().insert(MEMBER, Arc::new(port));

    let mut aggregate = AggregatePort::new(AGG, "po1", 32768, system_mac, 1);
    aggregate.add_member(MEMBER);
    state.aggregate_ports_mut().insert(AGG, Arc::new(aggregate));
    state
}

fn spawn_stack(system_mac: MacAddress) -> Stack {
    let updater = StateUpdater::spawn(initial_state(system_mac));
    let updates = updater.handle();

    let (egress_tx, egress) = mpsc::unbounded_channel();
    let servicer = Arc::new(SwitchServicer::new(updates.clone(), system_mac, egress_tx));
    let (lag, _task) = LinkAggregationManager::spawn(servicer);

    lag.add_port(PortConfig {
        port: MEMBER,
        aggregate: AGG,
        system_priority: 32768,
        system_id: system_mac,
        port_priority: 32768,
        min_link_count: 1,
        rate: LacpRate::Fast,
        activity: LacpActivity::Active,
    })
    .unwrap();
    lag.port_up(MEMBER).unwrap();

    Stack {
        updater,
        updates,
        lag,
        egress,
    }
}

/// Moves frames from `from`'s egress into `to`'s manager while the gate is
/// open, stripping the Ethernet header and checking the wire framing on the
/// way. Closing the gate simulates a dead link: frames are silently lost.
fn pump(
    mut from: mpsc::UnboundedReceiver<OutboundFrame>,
    to: LagHandle,
) -> tokio::sync::watch::Sender<bool> {
    let (gate_tx, gate_rx) = tokio::sync::watch::channel(true);
    tokio::spawn(async move {
        while let Some(frame) = from.recv().await {
            assert_eq!(frame.data.len(), pdu::FRAME_LENGTH);
            assert_eq!(
                &frame.data[0..6],
                pdu::SLOW_PROTOCOLS_DST_MAC.as_bytes(),
                "LACPDU not addressed to the slow-protocols group"
            );
            if !*gate_rx.borrow() {
                continue;
            }
            let payload = frame.data[pdu::ETHERNET_HEADER_LENGTH..].to_vec();
            if to.received_frame(frame.port, payload).is_err() {
                break;
            }
        }
    });
    gate_tx
}

async fn wait_for_forwarding(updates: &StateHandle, target: Forwarding) {
    let mut rx = updates.subscribe();
    loop {
        let forwarding = rx
            .borrow_and_update()
            .aggregate_ports()
            .get(&AGG)
            .unwrap()
            .forwarding_state(MEMBER);
        if forwarding == Some(target) {
            return;
        }
        rx.changed().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn two_switches_converge_to_forwarding() {
    let mut a = spawn_stack(MacAddress::from_u64(0x02_00_00_00_00_01));
    let mut b = spawn_stack(MacAddress::from_u64(0x02_00_00_00_00_02));

    pump(std::mem::replace(&mut a.egress, mpsc::unbounded_channel().1), b.lag.clone());
    pump(std::mem::replace(&mut b.egress, mpsc::unbounded_channel().1), a.lag.clone());

    // Give the exchange two minutes of simulated time to converge.
    tokio::time::timeout(Duration::from_secs(120), async {
        wait_for_forwarding(&a.updates, Forwarding::Enabled).await;
        wait_for_forwarding(&b.updates, Forwarding::Enabled).await;
    })
    .await
    .expect("LACP handshake did not converge");

    a.lag.stop().await.unwrap();
    b.lag.stop().await.unwrap();
    a.updater.shutdown().await;
    b.updater.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn partner_going_silent_withdraws_forwarding() {
    let mut a = spawn_stack(MacAddress::from_u64(0x02_00_00_00_00_01));
    let mut b = spawn_stack(MacAddress::from_u64(0x02_00_00_00_00_02));

    let a_to_b = pump(
        std::mem::replace(&mut a.egress, mpsc::unbounded_channel().1),
        b.lag.clone(),
    );
    let _b_to_a = pump(
        std::mem::replace(&mut b.egress, mpsc::unbounded_channel().1),
        a.lag.clone(),
    );

    tokio::time::timeout(Duration::from_secs(120), async {
        wait_for_forwarding(&a.updates, Forwarding::Enabled).await;
        wait_for_forwarding(&b.updates, Forwarding::Enabled).await;
    })
    .await
    .expect("LACP handshake did not converge");

    // Cut the a -> b direction: b stops hearing refreshes, its partner
    // record expires on the fast epoch, and forwarding is withdrawn.
    a_to_b.send(false).unwrap();
    tokio::time::timeout(Duration::from_secs(120), async {
        wait_for_forwarding(&b.updates, Forwarding::Disabled).await;
    })
    .await
    .expect("forwarding was not withdrawn after partner expiry");

    a.lag.stop().await.unwrap();
    b.lag.stop().await.unwrap();
    a.updater.shutdown().await;
    b.updater.shutdown().await;
}
