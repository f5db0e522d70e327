//! Capability traits implemented by the switch chip driver.
//!
//! The driver resolves its capabilities once when it is bound and the core
//! holds the result as an `Arc<dyn SwitchChip>` for the lifetime of the
//! binding.

use std::fmt;
use std::sync::Arc;

use crate::error::ChipResult;
use crate::types::{FeatureFlags, LinkStatus, MacAddress, PromiscLevel};

/// Receives link state changes for a switch port.
pub trait LinkListener: Send + Sync {
    /// Called by the PHY layer whenever the port's link state changes.
    fn link_changed(&self, port: u16, status: LinkStatus);
}

/// A multi-port switch chip sitting behind a single host transport.
///
/// Implementations may block the calling thread for the duration of a
/// hardware transaction. The core only calls these methods from its
/// configuration path, never from the transmit completion path.
pub trait SwitchChip: Send + Sync + fmt::Debug {
    /// Returns a short identifier for logging (e.g., "sw.0").
    fn name(&self) -> &str;

    /// Returns the number of ports exposed as logical interfaces.
    fn enumerate_ports(&self) -> ChipResult<u16>;

    /// Returns the number of additional ports that are not exposed as
    /// logical interfaces (e.g., the uplink to the host).
    fn device_offset(&self) -> u16 {
        0
    }

    /// Programs `address` for `port` and returns the host-port promiscuity
    /// the chip ended up in. `current` is the level the core believes the
    /// chip is in.
    fn program_address(
        &self,
        port: u16,
        address: MacAddress,
        current: PromiscLevel,
    ) -> ChipResult<PromiscLevel>;

    /// Returns the largest frame, in bytes, the chip forwards.
    fn mtu_limit(&self) -> u32;

    /// Returns the per-frame bytes the chip adds on the host port (tail
    /// tags, timestamps).
    fn mtu_overhead(&self) -> u32;

    /// Adds `vid` to the chip's VLAN table.
    fn add_vlan(&self, vid: u16) -> ChipResult<()>;

    /// Removes `vid` from the chip's VLAN table.
    fn remove_vlan(&self, vid: u16) -> ChipResult<()>;

    /// Returns the optional capabilities of the chip.
    fn features(&self) -> FeatureFlags {
        FeatureFlags::empty()
    }

    /// Registers the listener that receives link changes for `port`.
    fn bind_link_listener(&self, port: u16, listener: Arc<dyn LinkListener>) -> ChipResult<()>;

    /// Drops the listener registered for `port`, if any.
    fn unbind_link_listener(&self, port: u16);
}

/// Locates switch chips available to this host.
pub trait SwitchProbe: Send + Sync {
    /// Returns the chip registered under `id`, if one exists.
    fn probe(&self, id: u32) -> Option<Arc<dyn SwitchChip>>;
}
