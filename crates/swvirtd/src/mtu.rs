//! MTU negotiation between the host transport and the switch chip.

use swvirt_chip::SwitchChip;
use swvirt_common::config::ETH_MIN_MTU;
use swvirt_common::{SwitchError, SwitchResult};

/// Ethernet header length.
pub const ETH_HLEN: u32 = 14;

/// Ethernet frame check sequence length.
pub const ETH_FCS_LEN: u32 = 4;

/// Ceiling imposed by the host transport alone.
///
/// The MAC transmits up to 3906 bytes but receive overruns above 0xC00
/// (3072) bytes, so the usable MTU is 3072 - 18 - 2 - 6 = 3046.
pub const BASELINE_MTU_CEILING: u32 = 3046;

/// Computes the largest MTU a logical interface may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtuNegotiator {
    baseline: u32,
}

impl MtuNegotiator {
    /// Creates a negotiator with the transport baseline.
    pub fn new() -> Self {
        Self {
            baseline: BASELINE_MTU_CEILING,
        }
    }

    /// Returns the transport baseline.
    pub fn baseline(&self) -> u32 {
        self.baseline
    }

    /// Returns the admissible MTU ceiling.
    ///
    /// The chip raises the ceiling only when its own frame limit, minus the
    /// Ethernet header, FCS and the chip's tagging overhead, exceeds the
    /// transport baseline.
    pub fn ceiling(&self, chip: Option<&dyn SwitchChip>) -> u32 {
        let mut max_mtu = self.baseline;
        if let Some(chip) = chip {
            let chip_mtu = chip
                .mtu_limit()
                .saturating_sub(ETH_HLEN + ETH_FCS_LEN)
                .saturating_sub(chip.mtu_overhead());
            if chip_mtu > max_mtu {
                max_mtu = chip_mtu;
            }
        }
        max_mtu
    }

    /// Clamps `requested` to the ceiling.
    pub fn clamp(&self, chip: Option<&dyn SwitchChip>, requested: u32) -> u32 {
        requested.min(self.ceiling(chip))
    }

    /// Validates and clamps an MTU request from the control surface.
    pub fn admit(&self, chip: Option<&dyn SwitchChip>, requested: u32) -> SwitchResult<u32> {
        if requested < ETH_MIN_MTU {
            return Err(SwitchError::InvalidMtu {
                requested,
                minimum: ETH_MIN_MTU,
            });
        }
        Ok(self.clamp(chip, requested))
    }
}

impl Default for MtuNegotiator {
    fn default() -> Self {
        Self::new()
    }
}
