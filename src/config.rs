//! # SX127x Device Configuration
//!
//! The radio parameters a driver instance is initialized with. The configuration is
//! read-only once `initialize` has committed it to the chip; changing any parameter
//! means initializing again.
//!
//! ## Configuration File
//!
//! Configurations can be loaded from JSON. Missing fields take their default value:
//! ```json
//! {
//!   "frequency_mhz": 868.1,
//!   "bandwidth_hz": 125000,
//!   "spreading_factor": 9,
//!   "tx_power_db": 20,
//!   "reset_pin": 22,
//!   "interrupt_pin": 25
//! }
//! ```

use crate::error::{Sx127xError, ValidationError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Spreading factors accepted by the LoRa modem
pub const SPREADING_FACTOR_RANGE: std::ops::RangeInclusive<u8> = 6..=12;

/// Coding-rate denominators (4/5 through 4/8)
pub const CODING_RATE_RANGE: std::ops::RangeInclusive<u8> = 5..=8;

/// Transmit power range in dB
pub const TX_POWER_RANGE: std::ops::RangeInclusive<i8> = 5..=23;

/// Maximum SPI clock of the SX127x (SCK period ≥ 100 ns)
pub const MAX_SPI_SPEED_HZ: u32 = 10_000_000;

/// Radio parameters for one SX127x instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfiguration {
    /// Carrier frequency in MHz (e.g. 868.1 or 915.0)
    pub frequency_mhz: f64,
    /// Preamble length programmed into RegPreambleMsb/Lsb
    pub preamble_length: u16,
    /// Signal bandwidth in Hz, rounded up to the next supported bandwidth
    pub bandwidth_hz: u32,
    /// Coding-rate denominator, 5-8 for 4/5-4/8
    pub coding_rate: u8,
    /// Spreading factor, 6-12
    pub spreading_factor: u8,
    /// Enable payload CRC generation and checking
    pub crc_enabled: bool,
    /// Let the AGC set the LNA gain
    pub agc_enabled: bool,
    /// Transmit power in dB, 5-23 (values above 20 use the PA boost DAC)
    pub tx_power_db: i8,
    /// GPIO line driving the radio NRESET input (BCM numbering)
    pub reset_pin: u8,
    /// GPIO line connected to DIO0 (BCM numbering)
    pub interrupt_pin: u8,
    /// SPI clock rate in Hz
    pub spi_speed_hz: u32,
    /// How long `send` waits for the TxDone interrupt
    pub tx_timeout_ms: u64,
    /// Report every register access at debug level
    pub diagnostics: bool,
}

impl Default for DeviceConfiguration {
    fn default() -> Self {
        Self {
            frequency_mhz: 915.0,
            preamble_length: 8,
            bandwidth_hz: 125_000,
            coding_rate: 5,
            spreading_factor: 7,
            crc_enabled: true,
            agc_enabled: true,
            tx_power_db: 17,
            reset_pin: 22,
            interrupt_pin: 25,
            spi_speed_hz: 8_000_000,
            tx_timeout_ms: 2_000,
            diagnostics: false,
        }
    }
}

impl DeviceConfiguration {
    /// Parse a configuration from a JSON document
    pub fn from_json(json: &str) -> Result<Self, Sx127xError> {
        serde_json::from_str(json)
            .map_err(|e| Sx127xError::Config(format!("Invalid configuration JSON: {e}")))
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Sx127xError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Sx127xError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Check every numeric field against the range the chip accepts
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_frequency(self.frequency_mhz)?;
        validate_spreading_factor(self.spreading_factor)?;
        validate_coding_rate(self.coding_rate)?;
        validate_tx_power(self.tx_power_db)?;

        if self.spi_speed_hz == 0 || self.spi_speed_hz > MAX_SPI_SPEED_HZ {
            return Err(ValidationError::SpiSpeed(self.spi_speed_hz));
        }
        if self.tx_timeout_ms == 0 {
            return Err(ValidationError::TxTimeout);
        }
        Ok(())
    }

    /// Transmit timeout as a `Duration`
    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }

    pub fn with_frequency(mut self, frequency_mhz: f64) -> Self {
        self.frequency_mhz = frequency_mhz;
        self
    }

    pub fn with_bandwidth(mut self, bandwidth_hz: u32) -> Self {
        self.bandwidth_hz = bandwidth_hz;
        self
    }

    pub fn with_spreading_factor(mut self, spreading_factor: u8) -> Self {
        self.spreading_factor = spreading_factor;
        self
    }

    pub fn with_coding_rate(mut self, coding_rate: u8) -> Self {
        self.coding_rate = coding_rate;
        self
    }

    pub fn with_tx_power(mut self, tx_power_db: i8) -> Self {
        self.tx_power_db = tx_power_db;
        self
    }

    pub fn with_pins(mut self, reset_pin: u8, interrupt_pin: u8) -> Self {
        self.reset_pin = reset_pin;
        self.interrupt_pin = interrupt_pin;
        self
    }

    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }
}

pub fn validate_frequency(frequency_mhz: f64) -> Result<f64, ValidationError> {
    if frequency_mhz.is_finite() && frequency_mhz > 0.0 {
        Ok(frequency_mhz)
    } else {
        Err(ValidationError::Frequency(frequency_mhz))
    }
}

pub fn validate_spreading_factor(spreading_factor: u8) -> Result<u8, ValidationError> {
    if SPREADING_FACTOR_RANGE.contains(&spreading_factor) {
        Ok(spreading_factor)
    } else {
        Err(ValidationError::SpreadingFactor(spreading_factor))
    }
}

pub fn validate_coding_rate(coding_rate: u8) -> Result<u8, ValidationError> {
    if CODING_RATE_RANGE.contains(&coding_rate) {
        Ok(coding_rate)
    } else {
        Err(ValidationError::CodingRate(coding_rate))
    }
}

pub fn validate_tx_power(tx_power_db: i8) -> Result<i8, ValidationError> {
    if TX_POWER_RANGE.contains(&tx_power_db) {
        Ok(tx_power_db)
    } else {
        Err(ValidationError::TxPower(tx_power_db))
    }
}
