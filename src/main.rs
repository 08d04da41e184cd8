//! Scenario runner.
//!
//! Loads a JSON scenario, runs the simulation to its horizon and logs a
//! per-node traffic summary. Log records are timestamped with the logical
//! simulation clock, so raising the verbosity to `debug` gives a complete
//! tick-by-tick narration of the run.
//!
//! ```text
//! radionet <scenario.json> [error|warn|info|debug|trace]
//! ```

use anyhow::{Context, Result, bail};
use log::{LevelFilter, info};

use radionet::{PacketEvent, PacketStatus, Scenario, Sim, logging};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: radionet <scenario.json> [error|warn|info|debug|trace]");
    };
    let verbosity = match args.next() {
        Some(level) => level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow::anyhow!("unrecognised log level: {level}"))?,
        None => LevelFilter::Info,
    };
    logging::init(verbosity);

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read scenario file: {path}"))?;
    let scenario = Scenario::from_json(&text)
        .with_context(|| format!("failed to parse scenario file: {path}"))?;

    let sim = Sim::new();
    let (nodes, world) = scenario.build(&sim)?;

    info!(
        "running {} node(s) until {}",
        nodes.len(),
        scenario.horizon()
    );
    sim.run_until(scenario.horizon());

    for node in &nodes {
        let tx = node.radio().tx_history();
        let rx = node.radio().rx_history();
        let delivered = PacketEvent::with_status(&rx, PacketStatus::SuccessRx).count();
        let dropped = PacketEvent::with_status(&rx, PacketStatus::DroppedMode).count()
            + PacketEvent::with_status(&rx, PacketStatus::DroppedRssi).count();
        let empty_windows = PacketEvent::with_status(&rx, PacketStatus::NothingRx).count();
        info!(
            "[{}] {} transmission(s), {} delivered, {} dropped, {} empty window(s)",
            node.name(),
            tx.len(),
            delivered,
            dropped,
            empty_windows
        );
    }
    info!("[world] {} collision(s) on air", world.collisions().len());

    Ok(())
}
