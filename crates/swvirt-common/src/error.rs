//! Error types for swvirt operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Each variant
//! maps onto the errno class a network driver would report for it, see
//! [`SwitchError::errno`].

use std::fmt;
use std::io;

use swvirt_chip::{ChipError, MacAddress};
use thiserror::Error;

/// Result type alias for swvirt operations.
pub type SwitchResult<T> = Result<T, SwitchError>;

/// errno values used to classify errors.
pub mod errno {
    /// I/O error.
    pub const EIO: i32 = 5;
    /// No such device or address.
    pub const ENXIO: i32 = 6;
    /// Out of memory.
    pub const ENOMEM: i32 = 12;
    /// File exists.
    pub const EEXIST: i32 = 17;
    /// No such device.
    pub const ENODEV: i32 = 19;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// Address not available.
    pub const EADDRNOTAVAIL: i32 = 99;
}

/// Why creating a sibling interface failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateReason {
    /// The interface namespace has no room left.
    NamespaceExhausted {
        /// Configured namespace capacity.
        limit: usize,
    },
    /// Another interface already holds the name.
    NameConflict {
        /// The contested name.
        name: String,
    },
    /// The generated name does not fit an interface name.
    NameTooLong {
        /// The rejected name.
        name: String,
    },
    /// The chip does not serve the port.
    PortOutOfRange {
        /// Ports served by the chip.
        port_count: u16,
    },
}

impl fmt::Display for CreateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamespaceExhausted { limit } => {
                write!(f, "interface namespace exhausted ({} interfaces)", limit)
            }
            Self::NameConflict { name } => write!(f, "name '{}' already registered", name),
            Self::NameTooLong { name } => write!(f, "name '{}' is too long", name),
            Self::PortOutOfRange { port_count } => {
                write!(f, "chip serves only {} ports", port_count)
            }
        }
    }
}

/// Errors that can occur while virtualizing switch ports.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// No switch chip could be found during attach.
    #[error("No switch found (probe id {probe_id})")]
    NoSwitchFound {
        /// The identifier that was probed.
        probe_id: u32,
    },

    /// Binding the primary interface failed.
    #[error("Attach failed: {reason}")]
    Attach {
        /// Error message.
        reason: String,
    },

    /// Creating a sibling interface failed.
    #[error("Failed to create interface for port {port}: {reason}")]
    Create {
        /// The port whose interface could not be created.
        port: u16,
        /// Why creation failed.
        reason: CreateReason,
    },

    /// The chip rejected or lost an address programming transaction.
    #[error("Failed to program address on port {port}: {source}")]
    AddressProgram {
        /// The port whose address was being programmed.
        port: u16,
        /// The chip error.
        #[source]
        source: ChipError,
    },

    /// The requested address cannot be assigned to an interface.
    #[error("Invalid hardware address {address}")]
    InvalidAddress {
        /// The rejected address.
        address: MacAddress,
    },

    /// The requested MTU is below the Ethernet minimum.
    #[error("Invalid MTU {requested} (minimum {minimum})")]
    InvalidMtu {
        /// The requested MTU.
        requested: u32,
        /// The smallest accepted MTU.
        minimum: u32,
    },

    /// The VLAN id is outside the 12-bit range.
    #[error("Invalid VLAN id {vid}")]
    InvalidVlan {
        /// The rejected VLAN id.
        vid: u16,
    },

    /// No interface is bound to the port.
    #[error("No interface bound to port {port}")]
    InterfaceNotFound {
        /// The port index.
        port: u16,
    },

    /// Any other chip transaction failed.
    #[error("Chip operation {operation} failed: {source}")]
    Chip {
        /// The chip operation.
        operation: String,
        /// The chip error.
        #[source]
        source: ChipError,
    },

    /// Configuration validation error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SwitchError {
    /// Creates an attach error.
    pub fn attach(reason: impl Into<String>) -> Self {
        Self::Attach {
            reason: reason.into(),
        }
    }

    /// Creates a sibling creation error.
    pub fn create(port: u16, reason: CreateReason) -> Self {
        Self::Create { port, reason }
    }

    /// Creates an address programming error.
    pub fn address_program(port: u16, source: ChipError) -> Self {
        Self::AddressProgram { port, source }
    }

    /// Creates a chip operation error.
    pub fn chip(operation: impl Into<String>, source: ChipError) -> Self {
        Self::Chip {
            operation: operation.into(),
            source,
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if the error ends the core instance; the process itself
    /// keeps running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SwitchError::NoSwitchFound { .. } | SwitchError::Attach { .. }
        )
    }

    /// Returns the errno class a network driver would report.
    pub fn errno(&self) -> i32 {
        match self {
            SwitchError::NoSwitchFound { .. } => errno::ENXIO,
            SwitchError::Attach { .. } => errno::ENODEV,
            SwitchError::Create { reason, .. } => match reason {
                CreateReason::NamespaceExhausted { .. } => errno::ENOMEM,
                CreateReason::NameConflict { .. } => errno::EEXIST,
                CreateReason::NameTooLong { .. } | CreateReason::PortOutOfRange { .. } => {
                    errno::EINVAL
                }
            },
            SwitchError::AddressProgram { .. } | SwitchError::Chip { .. } => errno::EIO,
            SwitchError::InvalidAddress { .. } => errno::EADDRNOTAVAIL,
            SwitchError::InvalidMtu { .. }
            | SwitchError::InvalidVlan { .. }
            | SwitchError::Config { .. } => errno::EINVAL,
            SwitchError::InterfaceNotFound { .. } => errno::ENODEV,
            SwitchError::Io(_) => errno::EIO,
        }
    }
}
