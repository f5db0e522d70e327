//! Switch chip abstraction for swvirt.
//!
//! The switch-chip driver (register access, MIB counters, VLAN table
//! encoding, bus transport) lives outside this workspace. This crate defines
//! the capability surface the virtualization core consumes from it, plus a
//! scriptable in-memory implementation used for dry runs and tests.
//!
//! - [`types`]: Hardware-level value types (MAC address, promiscuity level,
//!   feature flags, link status)
//! - [`chip`]: The [`SwitchChip`], [`SwitchProbe`] and [`LinkListener`] traits
//! - [`error`]: [`ChipError`] returned by chip transactions
//! - [`sim`]: [`SimulatedSwitch`] and [`SimulatedProbe`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use swvirt_chip::{SimulatedSwitch, SwitchChip, MacAddress, PromiscLevel};
//!
//! let chip = Arc::new(SimulatedSwitch::builder().port_count(4).build());
//! let level = chip.program_address(1, "02:00:00:00:00:01".parse()?, PromiscLevel::Off)?;
//! ```

pub mod chip;
pub mod error;
pub mod sim;
pub mod types;

pub use chip::{LinkListener, SwitchChip, SwitchProbe};
pub use error::{ChipError, ChipResult};
pub use sim::{SimulatedProbe, SimulatedSwitch, SimulatedSwitchBuilder};
pub use types::{FeatureFlags, LinkStatus, MacAddress, PromiscLevel};
