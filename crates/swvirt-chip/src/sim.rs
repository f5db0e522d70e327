//! In-memory switch chip.
//!
//! [`SimulatedSwitch`] behaves like a tail-tagging switch: the host port
//! needs promiscuous receive as soon as any port carries an address other
//! than the chip's own. Results of `program_address` can be scripted to
//! reproduce chip quirks and bus faults.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::chip::{LinkListener, SwitchChip, SwitchProbe};
use crate::error::{ChipError, ChipResult};
use crate::types::{FeatureFlags, LinkStatus, MacAddress, PromiscLevel};

/// Address the simulated chip answers to by default.
pub const DEFAULT_CHIP_ADDRESS: MacAddress = MacAddress::new([0x02, 0x10, 0xa1, 0x00, 0x00, 0x01]);

#[derive(Default)]
struct SimState {
    scripted: VecDeque<ChipResult<PromiscLevel>>,
    program_calls: Vec<(u16, MacAddress, PromiscLevel)>,
    port_addresses: HashMap<u16, MacAddress>,
    vlans: BTreeSet<u16>,
    listeners: HashMap<u16, Arc<dyn LinkListener>>,
    fail_enumerate: bool,
}

/// Scriptable switch chip living entirely in memory.
pub struct SimulatedSwitch {
    name: String,
    port_count: u16,
    device_offset: u16,
    mtu_limit: u32,
    mtu_overhead: u32,
    features: FeatureFlags,
    chip_address: MacAddress,
    state: Mutex<SimState>,
}

impl SimulatedSwitch {
    /// Starts building a simulated switch.
    pub fn builder() -> SimulatedSwitchBuilder {
        SimulatedSwitchBuilder::default()
    }

    /// Queues results returned by the next `program_address` calls, in
    /// order, before the computed behaviour resumes.
    pub fn script_program_results<I>(&self, results: I)
    where
        I: IntoIterator<Item = ChipResult<PromiscLevel>>,
    {
        self.state.lock().scripted.extend(results);
    }

    /// Number of `program_address` transactions seen so far.
    pub fn program_calls(&self) -> usize {
        self.state.lock().program_calls.len()
    }

    /// Every `program_address` transaction as `(port, address, current)`.
    pub fn program_log(&self) -> Vec<(u16, MacAddress, PromiscLevel)> {
        self.state.lock().program_calls.clone()
    }

    /// VLAN ids currently in the chip's table.
    pub fn vlans(&self) -> Vec<u16> {
        self.state.lock().vlans.iter().copied().collect()
    }

    /// Makes `enumerate_ports` fail until cleared.
    pub fn set_fail_enumerate(&self, fail: bool) {
        self.state.lock().fail_enumerate = fail;
    }

    /// Returns true if a link listener is bound for `port`.
    pub fn has_link_listener(&self, port: u16) -> bool {
        self.state.lock().listeners.contains_key(&port)
    }

    /// Delivers a link change for `port` to its listener. Returns false when
    /// nobody listens on that port.
    pub fn emit_link(&self, port: u16, status: LinkStatus) -> bool {
        // Clone out so the listener runs without the simulator lock held.
        let listener = self.state.lock().listeners.get(&port).cloned();
        match listener {
            Some(listener) => {
                listener.link_changed(port, status);
                true
            }
            None => false,
        }
    }

    fn check_port(&self, port: u16) -> ChipResult<()> {
        if port >= self.port_count {
            return Err(ChipError::InvalidPort { port });
        }
        Ok(())
    }
}

impl fmt::Debug for SimulatedSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedSwitch")
            .field("name", &self.name)
            .field("port_count", &self.port_count)
            .field("device_offset", &self.device_offset)
            .field("mtu_limit", &self.mtu_limit)
            .field("mtu_overhead", &self.mtu_overhead)
            .field("features", &self.features)
            .finish()
    }
}

impl SwitchChip for SimulatedSwitch {
    fn name(&self) -> &str {
        &self.name
    }

    fn enumerate_ports(&self) -> ChipResult<u16> {
        if self.state.lock().fail_enumerate {
            return Err(ChipError::timeout("enumerate_ports"));
        }
        Ok(self.port_count)
    }

    fn device_offset(&self) -> u16 {
        self.device_offset
    }

    fn program_address(
        &self,
        port: u16,
        address: MacAddress,
        current: PromiscLevel,
    ) -> ChipResult<PromiscLevel> {
        self.check_port(port)?;
        let mut state = self.state.lock();
        state.program_calls.push((port, address, current));

        if let Some(result) = state.scripted.pop_front() {
            trace!(port, %address, ?result, "scripted program_address result");
            if result.is_ok() {
                state.port_addresses.insert(port, address);
            }
            return result;
        }

        state.port_addresses.insert(port, address);
        let foreign = state
            .port_addresses
            .values()
            .any(|a| *a != self.chip_address);
        let level = if foreign {
            PromiscLevel::On
        } else {
            PromiscLevel::Off
        };
        debug!(chip = %self.name, port, %address, %level, "programmed port address");
        Ok(level)
    }

    fn mtu_limit(&self) -> u32 {
        self.mtu_limit
    }

    fn mtu_overhead(&self) -> u32 {
        self.mtu_overhead
    }

    fn add_vlan(&self, vid: u16) -> ChipResult<()> {
        self.state.lock().vlans.insert(vid);
        Ok(())
    }

    fn remove_vlan(&self, vid: u16) -> ChipResult<()> {
        self.state.lock().vlans.remove(&vid);
        Ok(())
    }

    fn features(&self) -> FeatureFlags {
        self.features
    }

    fn bind_link_listener(&self, port: u16, listener: Arc<dyn LinkListener>) -> ChipResult<()> {
        self.check_port(port)?;
        self.state.lock().listeners.insert(port, listener);
        Ok(())
    }

    fn unbind_link_listener(&self, port: u16) {
        self.state.lock().listeners.remove(&port);
    }
}

/// Builder for [`SimulatedSwitch`].
#[derive(Debug, Clone)]
pub struct SimulatedSwitchBuilder {
    name: String,
    port_count: u16,
    device_offset: u16,
    mtu_limit: u32,
    mtu_overhead: u32,
    features: FeatureFlags,
    chip_address: MacAddress,
}

impl Default for SimulatedSwitchBuilder {
    fn default() -> Self {
        Self {
            name: "sw.0".to_string(),
            port_count: 4,
            device_offset: 0,
            mtu_limit: 1536,
            mtu_overhead: 1,
            features: FeatureFlags::empty(),
            chip_address: DEFAULT_CHIP_ADDRESS,
        }
    }
}

impl SimulatedSwitchBuilder {
    /// Sets the chip name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the number of exposed ports.
    pub fn port_count(mut self, port_count: u16) -> Self {
        self.port_count = port_count;
        self
    }

    /// Sets the number of ports hidden from the host.
    pub fn device_offset(mut self, device_offset: u16) -> Self {
        self.device_offset = device_offset;
        self
    }

    /// Sets the chip frame limit.
    pub fn mtu_limit(mut self, mtu_limit: u32) -> Self {
        self.mtu_limit = mtu_limit;
        self
    }

    /// Sets the per-frame tagging overhead.
    pub fn mtu_overhead(mut self, mtu_overhead: u32) -> Self {
        self.mtu_overhead = mtu_overhead;
        self
    }

    /// Sets the optional capabilities.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Sets the address the chip answers to.
    pub fn chip_address(mut self, chip_address: MacAddress) -> Self {
        self.chip_address = chip_address;
        self
    }

    /// Builds the switch.
    pub fn build(self) -> SimulatedSwitch {
        SimulatedSwitch {
            name: self.name,
            port_count: self.port_count,
            device_offset: self.device_offset,
            mtu_limit: self.mtu_limit,
            mtu_overhead: self.mtu_overhead,
            features: self.features,
            chip_address: self.chip_address,
            state: Mutex::new(SimState::default()),
        }
    }
}

/// Probe over a fixed set of switches keyed by id.
#[derive(Default)]
pub struct SimulatedProbe {
    switches: HashMap<u32, Arc<dyn SwitchChip>>,
}

impl SimulatedProbe {
    /// Creates a probe that finds nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a switch under `id`.
    pub fn with_switch(mut self, id: u32, chip: Arc<dyn SwitchChip>) -> Self {
        self.switches.insert(id, chip);
        self
    }
}

impl SwitchProbe for SimulatedProbe {
    fn probe(&self, id: u32) -> Option<Arc<dyn SwitchChip>> {
        self.switches.get(&id).cloned()
    }
}
