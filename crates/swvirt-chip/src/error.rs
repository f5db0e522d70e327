//! Chip transaction errors.

use thiserror::Error;

/// Result type alias for chip transactions.
pub type ChipResult<T> = Result<T, ChipError>;

/// Errors reported by the switch chip driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChipError {
    /// The bus transaction to the chip failed.
    #[error("Chip bus error during {operation}: {message}")]
    Bus {
        /// The chip operation (e.g., "program_address").
        operation: String,
        /// Driver-provided detail.
        message: String,
    },

    /// The chip did not answer in time.
    #[error("Chip timed out during {operation}")]
    Timeout {
        /// The chip operation.
        operation: String,
    },

    /// The port index is not served by this chip.
    #[error("Port {port} is not served by this chip")]
    InvalidPort {
        /// The port index.
        port: u16,
    },

    /// The chip does not implement the requested capability.
    #[error("Operation not supported by chip: {operation}")]
    Unsupported {
        /// The chip operation.
        operation: String,
    },
}

impl ChipError {
    /// Creates a bus error.
    pub fn bus(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Bus {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Returns true if the failure is a transport-level fault rather than a
    /// permanent property of the chip.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChipError::Bus { .. } | ChipError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChipError::bus("program_address", "spi nak");
        assert_eq!(
            err.to_string(),
            "Chip bus error during program_address: spi nak"
        );
        assert_eq!(
            ChipError::InvalidPort { port: 9 }.to_string(),
            "Port 9 is not served by this chip"
        );
    }

    #[test]
    fn test_is_transient() {
        assert!(ChipError::bus("add_vlan", "crc").is_transient());
        assert!(ChipError::timeout("add_vlan").is_transient());
        assert!(!ChipError::unsupported("bind_link_listener").is_transient());
        assert!(!ChipError::InvalidPort { port: 1 }.is_transient());
    }
}
