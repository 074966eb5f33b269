//! # sx127x-rs - An Async Rust Driver for SX127x LoRa Transceivers
//!
//! The sx127x-rs crate drives the Semtech SX1276/77/78/79 family in LoRa mode over
//! SPI, with one GPIO line for NRESET and one for DIO0.
//!
//! ## Features
//!
//! - Configure carrier frequency, bandwidth, spreading factor, coding rate and power
//! - Silicon errata for narrow and 500 kHz bandwidths applied automatically
//! - Interrupt-driven continuous receive delivering packets on a channel
//! - Interrupt-driven transmit with a timeout
//! - Diagnostic mode tracing every register access by name
//! - Simulated chip ([`radio::hal::MockHal`]) for tests without hardware
//! - Raspberry Pi support through `rppal` (feature `raspberry-pi`)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! sx127x-rs = { version = "0.1.0", features = ["raspberry-pi"] }
//! ```
//!
//! ```rust
//! use sx127x_rs::{init_logger, DeviceConfiguration, MockHal, Sx127xDriver, Sx127xError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Sx127xError> {
//! init_logger();
//!
//! let config = DeviceConfiguration::default()
//!     .with_frequency(868.1)
//!     .with_spreading_factor(9);
//! let mut driver = Sx127xDriver::new(MockHal::new(), config);
//! driver.initialize().await?;
//! assert_eq!(driver.version().await?, 0x12);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod radio;
pub mod util;

pub use crate::config::DeviceConfiguration;
pub use crate::error::{HalError, Sx127xError, ValidationError};
pub use crate::logging::{init_logger, init_logger_with_level};

pub use radio::driver::{RadioEvent, RadioStats, ReceiveFailure, ReceivedPacket, Sx127xDriver};
pub use radio::hal::{Hal, MockHal};
pub use radio::registers::OperatingMode;

#[cfg(feature = "raspberry-pi")]
pub use radio::hal::{RaspberryPiHal, RaspberryPiHalBuilder};
