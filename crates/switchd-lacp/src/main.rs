//! lagd daemon entry point.
//!
//! Wires the link aggregation manager to a switch state pipeline, brings
//! the configured member ports under LACP control and runs until
//! interrupted. Packet I/O is left to the platform layer; this binary logs
//! outbound frames so the protocol flow is observable end to end.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use switchd_lacp::{
    LacpActivity, LacpRate, LinkAggregationManager, PortConfig, SwitchServicer,
};
use switchd_state::{AggregatePort, Port, StateUpdater, SwitchState};
use switchd_types::{AggregatePortId, MacAddress, PortId};

#[derive(Parser, Debug)]
#[command(name = "lagd", about = "LACP link aggregation daemon")]
struct Args {
    /// Switch system MAC address.
    #[arg(long, default_value = "02:00:00:00:00:01")]
    system_mac: MacAddress,

    /// Aggregate port ID for the bootstrap LAG.
    #[arg(long, default_value_t = 1)]
    aggregate: u16,

    /// Member ports of the bootstrap LAG.
    #[arg(long, value_delimiter = ',', default_values_t = [1u16, 2])]
    members: Vec<u16>,

    /// Minimum member links before the LAG forwards.
    #[arg(long, default_value_t = 1)]
    min_links: u8,

    /// Maximum log level.
    #[arg(long, default_value = "debug")]
    log_level: Level,
}

fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn initial_state(args: &Args) -> SwitchState {
    let mut state = SwitchState::new();
    let mut aggregate = AggregatePort::new(
        AggregatePortId(args.aggregate),
        format!("po{}", args.aggregate),
        32768,
        args.system_mac,
        args.min_links,
    );
    for &member in &args.members {
        state.ports_mut().insert(
            PortId(member),
            Arc::new(Port::new(PortId(member), format!("eth1/{member}"))),
        );
        aggregate.add_member(PortId(member));
    }
    state
        .aggregate_ports_mut()
        .insert(AggregatePortId(args.aggregate), Arc::new(aggregate));
    state
}

async fn run(args: Args) -> anyhow::Result<()> {
    let updater = StateUpdater::spawn(initial_state(&args));
    let updates = updater.handle();

    let (egress_tx, mut egress_rx) = tokio::sync::mpsc::unbounded_channel();
    let servicer = Arc::new(SwitchServicer::new(
        updates.clone(),
        args.system_mac,
        egress_tx,
    ));
    let (lag, manager) = LinkAggregationManager::spawn(servicer);

    // Egress drain; the platform packet path hooks in here.
    let egress = tokio::spawn(async move {
        while let Some(frame) = egress_rx.recv().await {
            info!(port = %frame.port, bytes = frame.data.len(), "LACPDU out");
        }
    });

    for &member in &args.members {
        lag.add_port(PortConfig {
            port: PortId(member),
            aggregate: AggregatePortId(args.aggregate),
            system_priority: 32768,
            system_id: args.system_mac,
            port_priority: 32768,
            min_link_count: args.min_links,
            rate: LacpRate::Fast,
            activity: LacpActivity::Active,
        })?;
        lag.port_up(PortId(member))?;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    lag.stop().await?;
    manager.await?;
    updater.shutdown().await;
    egress.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    info!("--- Starting lagd ---");

    match run(args).await {
        Ok(()) => {
            info!("lagd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("lagd error: {e}");
            ExitCode::FAILURE
        }
    }
}
