//! Hardware-level value types shared between the chip driver and the core.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 48-bit Ethernet hardware address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The all-zero address.
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    /// Creates an address from raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Returns the raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Returns true for group (multicast or broadcast) addresses.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Returns true for the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    /// Returns true if the address may be assigned to an interface.
    pub fn is_valid_unicast(&self) -> bool {
        !self.is_zero() && !self.is_multicast()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| format!("MAC address too short: {}", s))?;
            if part.len() != 2 {
                return Err(format!("Invalid MAC address octet '{}' in {}", part, s));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| format!("Invalid MAC address octet '{}' in {}", part, s))?;
        }
        if parts.next().is_some() {
            return Err(format!("MAC address too long: {}", s));
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Chip-wide receive promiscuity as reported by the switch.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromiscLevel {
    /// Unicast filtering is in effect.
    #[default]
    Off = 0,
    /// The host port receives all frames.
    On = 1,
    /// The chip answered with a transitional state.
    Ambiguous = 2,
}

impl PromiscLevel {
    /// Returns the raw level as used by the chip.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns true for the two settled levels (off or on).
    pub fn is_settled(self) -> bool {
        !matches!(self, PromiscLevel::Ambiguous)
    }
}

impl TryFrom<u8> for PromiscLevel {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(PromiscLevel::Off),
            1 => Ok(PromiscLevel::On),
            2 => Ok(PromiscLevel::Ambiguous),
            other => Err(other),
        }
    }
}

impl fmt::Display for PromiscLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

bitflags! {
    /// Optional chip capabilities that enable protocol extension endpoints.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFlags: u32 {
        /// IEEE 1588 precision time protocol support.
        const PTP = 1 << 0;
        /// Device level ring redundancy support.
        const DLR = 1 << 1;
    }
}

impl FeatureFlags {
    /// Parses feature names as written in configuration files.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        names.iter().try_fold(FeatureFlags::empty(), |acc, name| {
            let flag = match name.as_ref().to_ascii_lowercase().as_str() {
                "ptp" => FeatureFlags::PTP,
                "dlr" => FeatureFlags::DLR,
                other => return Err(format!("Unknown chip feature: {}", other)),
            };
            Ok(acc | flag)
        })
    }
}

/// Link state of one switch port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    /// Carrier present.
    pub up: bool,
    /// Negotiated speed in Mb/s (0 when down).
    pub speed_mbps: u32,
    /// Full duplex.
    pub full_duplex: bool,
}

impl LinkStatus {
    /// Link down.
    pub const fn down() -> Self {
        Self {
            up: false,
            speed_mbps: 0,
            full_duplex: false,
        }
    }

    /// Link up at the given speed.
    pub const fn up(speed_mbps: u32, full_duplex: bool) -> Self {
        Self {
            up: true,
            speed_mbps,
            full_duplex,
        }
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::down()
    }
}
