//! Common infrastructure for the swvirt switch port virtualization daemon.
//!
//! - [`error`]: [`SwitchError`] returned by every core operation
//! - [`config`]: TOML configuration loaded by `swvirtd`
//!
//! # Example
//!
//! ```ignore
//! use swvirt_common::{SwvirtConfig, SwitchResult};
//!
//! fn load() -> SwitchResult<SwvirtConfig> {
//!     let config = SwvirtConfig::load_or_default("/etc/swvirt/swvirtd.toml")?;
//!     config.validate()?;
//!     Ok(config)
//! }
//! ```

pub mod config;
pub mod error;

pub use config::{
    InterfaceConfig, LifecycleConfig, NamespaceConfig, PromiscuityConfig, SimulationConfig,
    SwvirtConfig, DEFAULT_CONFIG_PATH,
};
pub use error::{errno, CreateReason, SwitchError, SwitchResult};
