//! Configuration file support for swvirtd.
//!
//! Loads and validates the daemon configuration from a TOML file.
//! Default location: `/etc/swvirt/swvirtd.toml`. Every field has a default,
//! so a missing file or a partial file is valid.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swvirt_chip::{FeatureFlags, MacAddress};
use tracing::info;

use crate::error::{SwitchError, SwitchResult};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/swvirt/swvirtd.toml";

/// Longest interface name accepted (IFNAMSIZ - 1).
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Smallest MTU accepted on an Ethernet interface.
pub const ETH_MIN_MTU: u32 = 68;

/// Primary interface settings, copied to every sibling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Name of the primary interface; siblings are `<base_name>.<port>`.
    #[serde(default = "default_base_name")]
    pub base_name: String,

    /// Hardware address of the primary interface.
    #[serde(default = "default_mac_address")]
    pub mac_address: MacAddress,

    /// MTU requested for the primary interface.
    #[serde(default = "default_mtu")]
    pub default_mtu: u32,

    /// Transmit queues of the shared transport.
    #[serde(default = "default_queues")]
    pub tx_queues: u16,

    /// Receive queues of the shared transport.
    #[serde(default = "default_queues")]
    pub rx_queues: u16,
}

/// Limits of the host interface namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Maximum number of interfaces that may be registered.
    #[serde(default = "default_max_interfaces")]
    pub max_interfaces: usize,
}

/// Promiscuity arbitration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromiscuityConfig {
    /// Delay before an ambiguous chip answer is reset, in milliseconds.
    #[serde(default = "default_reset_delay_ms")]
    pub reset_delay_ms: u64,
}

/// Attach/teardown sequencing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Identifier probed when no chip is bound yet.
    #[serde(default)]
    pub probe_id: u32,

    /// Refuse to attach when a multi-queue transport would be shared by
    /// more than one interface, instead of only warning.
    #[serde(default)]
    pub strict_expansion: bool,
}

/// Layout of the simulated switch used when no hardware driver is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Ports exposed as interfaces.
    #[serde(default = "default_port_count")]
    pub port_count: u16,

    /// Ports hidden from the host.
    #[serde(default)]
    pub device_offset: u16,

    /// Largest frame the chip forwards.
    #[serde(default = "default_mtu_limit")]
    pub mtu_limit: u32,

    /// Tagging overhead added on the host port.
    #[serde(default = "default_mtu_overhead")]
    pub mtu_overhead: u32,

    /// Optional chip capabilities ("ptp", "dlr").
    #[serde(default)]
    pub features: Vec<String>,
}

/// Complete swvirtd configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwvirtConfig {
    /// Primary interface configuration.
    #[serde(default)]
    pub interface: InterfaceConfig,

    /// Namespace configuration.
    #[serde(default)]
    pub namespace: NamespaceConfig,

    /// Promiscuity configuration.
    #[serde(default)]
    pub promiscuity: PromiscuityConfig,

    /// Lifecycle configuration.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Simulated switch configuration.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_base_name() -> String {
    "eth0".to_string()
}

fn default_mac_address() -> MacAddress {
    MacAddress::new([0x02, 0x10, 0xa1, 0x00, 0x00, 0x01])
}

fn default_mtu() -> u32 {
    1500
}

fn default_queues() -> u16 {
    1
}

fn default_max_interfaces() -> usize {
    64
}

fn default_reset_delay_ms() -> u64 {
    100
}

fn default_port_count() -> u16 {
    4
}

fn default_mtu_limit() -> u32 {
    1536
}

fn default_mtu_overhead() -> u32 {
    1
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            base_name: default_base_name(),
            mac_address: default_mac_address(),
            default_mtu: default_mtu(),
            tx_queues: default_queues(),
            rx_queues: default_queues(),
        }
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            max_interfaces: default_max_interfaces(),
        }
    }
}

impl Default for PromiscuityConfig {
    fn default() -> Self {
        Self {
            reset_delay_ms: default_reset_delay_ms(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            probe_id: 0,
            strict_expansion: false,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            port_count: default_port_count(),
            device_offset: 0,
            mtu_limit: default_mtu_limit(),
            mtu_overhead: default_mtu_overhead(),
            features: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Parses the configured feature names.
    pub fn feature_flags(&self) -> SwitchResult<FeatureFlags> {
        FeatureFlags::from_names(self.features.as_slice()).map_err(SwitchError::config)
    }
}

impl SwvirtConfig {
    /// Load configuration from file, falling back to defaults if file not found.
    pub fn load_or_default(path: impl AsRef<Path>) -> SwitchResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                SwitchError::config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(SwitchError::Io(e)),
        }
    }

    /// Load from the default location or defaults.
    pub fn load() -> SwitchResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> SwitchResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SwitchError::config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the promiscuity reset delay as Duration.
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.promiscuity.reset_delay_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> SwitchResult<()> {
        let name = &self.interface.base_name;
        if name.is_empty() || name.len() > MAX_INTERFACE_NAME_LEN {
            return Err(SwitchError::config(format!(
                "base_name must be 1-{} characters",
                MAX_INTERFACE_NAME_LEN
            )));
        }
        if name.contains(['/', ' ', ':']) {
            return Err(SwitchError::config(format!(
                "base_name '{}' contains invalid characters",
                name
            )));
        }

        if !self.interface.mac_address.is_valid_unicast() {
            return Err(SwitchError::config(format!(
                "mac_address {} is not a unicast address",
                self.interface.mac_address
            )));
        }

        if self.interface.default_mtu < ETH_MIN_MTU {
            return Err(SwitchError::config(format!(
                "default_mtu must be >= {}",
                ETH_MIN_MTU
            )));
        }

        if self.interface.tx_queues == 0 || self.interface.rx_queues == 0 {
            return Err(SwitchError::config("tx_queues and rx_queues must be > 0"));
        }

        if self.namespace.max_interfaces == 0 {
            return Err(SwitchError::config("max_interfaces must be > 0"));
        }

        if self.promiscuity.reset_delay_ms == 0 {
            return Err(SwitchError::config("reset_delay_ms must be > 0"));
        }

        if self.simulation.port_count == 0 {
            return Err(SwitchError::config("simulation.port_count must be > 0"));
        }
        self.simulation.feature_flags()?;

        Ok(())
    }
}
