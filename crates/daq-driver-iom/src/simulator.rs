//! In-process chassis for tests and the CLI.
//!
//! [`SimulatedChassis`] implements [`ChassisTransport`] against a table of
//! installed boards. Clones share state, so a test can hand one clone to the
//! [`ConnectionManager`](crate::ConnectionManager) and inspect another.
//!
//! Input scans replay a per-slot word pattern; output scans and board
//! settings are captured. Failures are injected with [`FaultScenario`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::device::ModelCode;
use crate::transport::{ChassisAddress, ChassisHandle, ChassisTransport, LayerSetting, TransportError};
use crate::word::HardwareWord;

/// Code reported when an operation names a handle that is not open.
pub const ERR_BAD_HANDLE: i32 = -2;

/// Code reported when a scan buffer is not a whole number of words.
pub const ERR_BAD_LENGTH: i32 = -3;

/// Injected failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultScenario {
    /// Every call of `operation` fails with `code`
    Fail { operation: &'static str, code: i32 },
    /// `operation` succeeds `count` times, then fails with `code`
    FailAfterN {
        operation: &'static str,
        count: u32,
        code: i32,
    },
    /// `open_chassis` succeeds but hands back a zero handle
    ZeroHandle,
}

/// One installed board in a simulator description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedSlot {
    pub devn: u32,
    pub model: u32,
    /// Input words replayed in a loop, one per scan word
    #[serde(default)]
    pub input_pattern: Vec<u32>,
}

/// Simulator description as found in application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub slots: Vec<SimulatedSlot>,
}

#[derive(Debug, Default)]
struct InputSource {
    pattern: Vec<u32>,
    position: usize,
}

impl InputSource {
    fn next_word(&mut self) -> u32 {
        if self.pattern.is_empty() {
            return 0;
        }
        let word = self.pattern[self.position % self.pattern.len()];
        self.position = (self.position + 1) % self.pattern.len();
        word
    }
}

#[derive(Debug)]
struct ChassisState {
    library_open: bool,
    next_handle: u32,
    open_handles: Vec<u32>,
    closed_handles: Vec<u32>,
    last_address: Option<ChassisAddress>,
    last_timeout: Option<Duration>,
    slots: HashMap<u32, ModelCode>,
    inputs: HashMap<u32, InputSource>,
    outputs: HashMap<u32, Vec<u32>>,
    settings: Vec<(u32, LayerSetting)>,
    scenarios: Vec<FaultScenario>,
    operation_counts: HashMap<&'static str, u32>,
}

impl Default for ChassisState {
    fn default() -> Self {
        Self {
            library_open: false,
            next_handle: 1,
            open_handles: Vec::new(),
            closed_handles: Vec::new(),
            last_address: None,
            last_timeout: None,
            slots: HashMap::new(),
            inputs: HashMap::new(),
            outputs: HashMap::new(),
            settings: Vec::new(),
            scenarios: Vec::new(),
            operation_counts: HashMap::new(),
        }
    }
}

impl ChassisState {
    fn check_operation(&mut self, operation: &'static str) -> Result<(), TransportError> {
        let count = self.operation_counts.entry(operation).or_insert(0);
        *count += 1;
        let calls = *count;

        for scenario in &self.scenarios {
            match *scenario {
                FaultScenario::Fail { operation: op, code } if op == operation => {
                    return Err(TransportError::new(operation, code));
                }
                FaultScenario::FailAfterN {
                    operation: op,
                    count,
                    code,
                } if op == operation && calls > count => {
                    return Err(TransportError::new(operation, code));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_handle(
        &self,
        operation: &'static str,
        handle: ChassisHandle,
    ) -> Result<(), TransportError> {
        if self.open_handles.contains(&handle.get()) {
            Ok(())
        } else {
            Err(TransportError::new(operation, ERR_BAD_HANDLE))
        }
    }
}

/// Shared-state fake chassis.
#[derive(Debug, Clone, Default)]
pub struct SimulatedChassis {
    state: Arc<Mutex<ChassisState>>,
}

impl SimulatedChassis {
    /// Empty chassis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chassis populated from a configuration description.
    pub fn from_config(config: &SimulatorConfig) -> Self {
        config.slots.iter().fold(Self::new(), |chassis, slot| {
            chassis
                .with_slot(slot.devn, ModelCode(slot.model))
                .with_input_pattern(slot.devn, slot.input_pattern.clone())
        })
    }

    /// Install a board of `model` at `devn`.
    pub fn with_slot(self, devn: u32, model: ModelCode) -> Self {
        self.state.lock().slots.insert(devn, model);
        self
    }

    /// Replay `words` on every input scan of `devn`.
    pub fn with_input_pattern(self, devn: u32, words: Vec<u32>) -> Self {
        self.set_input_pattern(devn, words);
        self
    }

    pub fn with_fault(self, scenario: FaultScenario) -> Self {
        self.state.lock().scenarios.push(scenario);
        self
    }

    pub fn set_input_pattern(&self, devn: u32, words: Vec<u32>) {
        self.state.lock().inputs.insert(
            devn,
            InputSource {
                pattern: words,
                position: 0,
            },
        );
    }

    pub fn is_library_open(&self) -> bool {
        self.state.lock().library_open
    }

    /// Handles currently open.
    pub fn open_handles(&self) -> Vec<u32> {
        self.state.lock().open_handles.clone()
    }

    /// Handles closed so far, in close order.
    pub fn closed_handles(&self) -> Vec<u32> {
        self.state.lock().closed_handles.clone()
    }

    pub fn last_address(&self) -> Option<ChassisAddress> {
        self.state.lock().last_address
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.state.lock().last_timeout
    }

    /// Settings written to `devn`, in write order.
    pub fn settings_for(&self, devn: u32) -> Vec<LayerSetting> {
        self.state
            .lock()
            .settings
            .iter()
            .filter(|(d, _)| *d == devn)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Output words written to `devn`, oldest first.
    pub fn output_words(&self, devn: u32) -> Vec<u32> {
        self.state
            .lock()
            .outputs
            .get(&devn)
            .cloned()
            .unwrap_or_default()
    }

    /// Times `operation` was called, failed calls included.
    pub fn call_count(&self, operation: &str) -> u32 {
        self.state
            .lock()
            .operation_counts
            .get(operation)
            .copied()
            .unwrap_or(0)
    }
}

impl ChassisTransport for SimulatedChassis {
    fn open_library(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_operation("open_library")?;
        state.library_open = true;
        Ok(())
    }

    fn close_library(&mut self) {
        let mut state = self.state.lock();
        state.library_open = false;
        state.operation_counts.entry("close_library").and_modify(|c| *c += 1).or_insert(1);
    }

    fn open_chassis(
        &mut self,
        address: &ChassisAddress,
        timeout: Duration,
    ) -> Result<u32, TransportError> {
        let mut state = self.state.lock();
        state.check_operation("open_chassis")?;
        state.last_address = Some(*address);
        state.last_timeout = Some(timeout);
        if state.scenarios.contains(&FaultScenario::ZeroHandle) {
            return Ok(0);
        }
        let handle = state.next_handle;
        state.next_handle += 1;
        state.open_handles.push(handle);
        trace!(%address, handle, "Simulated chassis opened");
        Ok(handle)
    }

    fn close_chassis(&mut self, handle: ChassisHandle) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_operation("close_chassis")?;
        state.check_handle("close_chassis", handle)?;
        state.open_handles.retain(|&h| h != handle.get());
        state.closed_handles.push(handle.get());
        Ok(())
    }

    fn installed_model(
        &mut self,
        handle: ChassisHandle,
        devn: u32,
    ) -> Result<Option<ModelCode>, TransportError> {
        let mut state = self.state.lock();
        state.check_operation("installed_model")?;
        state.check_handle("installed_model", handle)?;
        Ok(state.slots.get(&devn).copied())
    }

    fn write_layer_setting(
        &mut self,
        handle: ChassisHandle,
        devn: u32,
        setting: &LayerSetting,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_operation("write_layer_setting")?;
        state.check_handle("write_layer_setting", handle)?;
        state.settings.push((devn, setting.clone()));
        Ok(())
    }

    fn read_scan(
        &mut self,
        handle: ChassisHandle,
        devn: u32,
        dest: &mut [u8],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_operation("read_scan")?;
        state.check_handle("read_scan", handle)?;
        if dest.len() % HardwareWord::SIZE != 0 {
            return Err(TransportError::new("read_scan", ERR_BAD_LENGTH));
        }
        let source = state.inputs.entry(devn).or_default();
        for slot in dest.chunks_exact_mut(HardwareWord::SIZE) {
            HardwareWord::new(source.next_word()).write_to(slot);
        }
        Ok(())
    }

    fn write_scan(
        &mut self,
        handle: ChassisHandle,
        devn: u32,
        src: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check_operation("write_scan")?;
        state.check_handle("write_scan", handle)?;
        if src.len() % HardwareWord::SIZE != 0 {
            return Err(TransportError::new("write_scan", ERR_BAD_LENGTH));
        }
        let words = src
            .chunks_exact(HardwareWord::SIZE)
            .filter_map(HardwareWord::read_from)
            .map(HardwareWord::raw);
        state.outputs.entry(devn).or_default().extend(words);
        Ok(())
    }
}
