//! # SX127x Error Handling
//!
//! This module defines the error types returned by the sx127x-rs crate. Caller
//! mistakes are reported as [`ValidationError`] before any register is touched,
//! collaborator failures are carried unchanged as [`HalError`], and the chip-level
//! failures of the initialization sequence get their own variants.

use std::time::Duration;
use thiserror::Error;

pub use crate::radio::hal::HalError;

/// A caller-supplied parameter outside the range the chip accepts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Carrier frequency must be a finite, positive number of MHz.
    #[error("Invalid frequency: {0} MHz")]
    Frequency(f64),

    #[error("Spreading factor {0} out of range 6-12")]
    SpreadingFactor(u8),

    #[error("Coding rate 4/{0} out of range 4/5-4/8")]
    CodingRate(u8),

    #[error("Transmit power {0} dB out of range 5-23")]
    TxPower(i8),

    #[error("Payload is empty")]
    EmptyPayload,

    #[error("Payload too long: {0} > 255 bytes")]
    PayloadTooLong(usize),

    /// Bit field does not fit inside one 8-bit register.
    #[error("Invalid bit field: width {width}, offset {offset}")]
    BitField { width: u8, offset: u8 },

    #[error("SPI clock {0} Hz out of range 1-10000000")]
    SpiSpeed(u32),

    #[error("Transmit timeout must be non-zero")]
    TxTimeout,
}

/// Errors returned by the SX127x driver.
#[derive(Debug, Error)]
pub enum Sx127xError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bus error: {0}")]
    Bus(#[from] HalError),

    /// The version register read back as zero: nothing answered on the bus.
    #[error("No SX127x device found (version register reads 0x00)")]
    DeviceNotFound,

    #[error("Unsupported silicon version: 0x{0:02X}")]
    UnsupportedVersion(u8),

    /// The operating-mode register did not hold what was just written to it.
    #[error("Configuration readback mismatch: expected 0x{expected:02X}, read 0x{actual:02X}")]
    ConfigurationReadbackMismatch { expected: u8, actual: u8 },

    #[error("Transmit did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Driver not initialized")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Sx127xError {
    /// Returns `true` for failures of the initialization sequence that call for
    /// checking the wiring before retrying.
    pub fn is_fatal_init(&self) -> bool {
        matches!(
            self,
            Sx127xError::DeviceNotFound
                | Sx127xError::UnsupportedVersion(_)
                | Sx127xError::ConfigurationReadbackMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Sx127xError::UnsupportedVersion(0x13);
        assert_eq!(err.to_string(), "Unsupported silicon version: 0x13");

        let err = Sx127xError::ConfigurationReadbackMismatch {
            expected: 0x80,
            actual: 0x09,
        };
        assert_eq!(
            err.to_string(),
            "Configuration readback mismatch: expected 0x80, read 0x09"
        );

        let err: Sx127xError = ValidationError::PayloadTooLong(256).into();
        assert_eq!(
            err.to_string(),
            "Validation error: Payload too long: 256 > 255 bytes"
        );
    }

    #[test]
    fn test_fatal_init_classification() {
        assert!(Sx127xError::DeviceNotFound.is_fatal_init());
        assert!(Sx127xError::UnsupportedVersion(0x22).is_fatal_init());
        assert!(!Sx127xError::Timeout(Duration::from_millis(10)).is_fatal_init());
        assert!(!Sx127xError::Bus(HalError::Spi("nack".to_string())).is_fatal_init());
    }
}
