//! Periodic acquisition driven by a tokio interval.
//!
//! Each tick runs the producer side of one cycle on the chassis
//! ([`ConnectionManager::run_cycle`]) and then the consumer side on the map
//! ([`Map::read_inputs`] and optionally [`Map::write_outputs`]).

use std::time::Duration;

use anyhow::{bail, Context, Result};
use daq_core::signal::SignalDirection;
use daq_driver_iom::{
    ChannelValues, ConnectionManager, DriverRegistry, Map, ManagerState, SimulatedChassis,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::AppConfig;

/// Totals over one acquisition run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionSummary {
    pub cycles: u32,
    pub records_read: usize,
    pub records_written: usize,
    pub overruns: usize,
    /// Channel values handed to the consumer
    pub values_read: usize,
    /// Values of the last cycle that yielded input
    pub last_values: Vec<ChannelValues>,
}

/// Build and initialise a manager against the configured simulated chassis.
///
/// No hardware library is linked into this binary, so a `[simulator]`
/// section is required.
pub fn connect(config: &AppConfig) -> Result<ConnectionManager> {
    let Some(simulator) = &config.simulator else {
        bail!("no [simulator] section configured and no hardware transport is available");
    };
    let chassis = SimulatedChassis::from_config(simulator);
    let registry = DriverRegistry::with_defaults();

    let mut manager = ConnectionManager::new(Box::new(chassis));
    manager
        .initialise(&config.chassis, &registry)
        .context("Failed to initialise chassis")?;
    info!(
        devices = manager.devices().len(),
        maps = manager.maps().len(),
        "Chassis ready"
    );
    Ok(manager)
}

/// Mirror input values onto the output channels of the same index.
fn loopback_values(map: &dyn Map, inputs: &[ChannelValues]) -> Vec<ChannelValues> {
    let mut values = Vec::new();
    for group in map
        .groups()
        .iter()
        .filter(|g| g.direction == SignalDirection::Output)
    {
        for &channel in &group.channels {
            if let Some(input) = inputs.iter().find(|v| v.channel == channel) {
                values.push(ChannelValues {
                    device: group.device_name.clone(),
                    channel,
                    samples: input.samples.clone(),
                });
            }
        }
    }
    values
}

/// Run `cycles` acquisition cycles of map `map_name`, one per `period`.
///
/// Missed ticks are skipped rather than bursted. With `loopback` set, each
/// cycle's inputs are written back onto the map's outputs.
pub async fn run_acquisition(
    manager: &mut ConnectionManager,
    map_name: &str,
    cycles: u32,
    period: Duration,
    loopback: bool,
) -> Result<AcquisitionSummary> {
    if manager.state() != ManagerState::Ready {
        bail!("chassis is not ready (state: {})", manager.state());
    }
    manager
        .activate_map(map_name)
        .with_context(|| format!("Failed to activate map '{}'", map_name))?;

    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut summary = AcquisitionSummary::default();
    for cycle in 0..cycles {
        interval.tick().await;

        let report = manager
            .run_cycle(map_name)
            .with_context(|| format!("Cycle {} of map '{}' failed", cycle, map_name))?;
        summary.records_read += report.records_read;
        summary.records_written += report.records_written;
        if report.overruns > 0 {
            warn!(cycle, overruns = report.overruns, "Input overrun");
            summary.overruns += report.overruns;
        }

        let map = manager
            .map(map_name)
            .with_context(|| format!("map '{}' disappeared", map_name))?;
        let inputs = map.read_inputs()?;
        debug!(cycle, values = inputs.len(), "Inputs read");

        if loopback {
            let outputs = loopback_values(map, &inputs);
            map.write_outputs(&outputs)?;
        }

        summary.values_read += inputs.len();
        if !inputs.is_empty() {
            summary.last_values = inputs;
        }
        summary.cycles += 1;
    }

    info!(
        map = %map_name,
        cycles = summary.cycles,
        records_read = summary.records_read,
        records_written = summary.records_written,
        overruns = summary.overruns,
        "Acquisition finished"
    );
    Ok(summary)
}
