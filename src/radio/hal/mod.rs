//! # Hardware Abstraction Layer for the SX127x
//!
//! This module defines the [`Hal`] trait: the byte transport to the radio plus the
//! two discrete lines the driver needs (an output for NRESET and an edge-watched
//! input for DIO0). The driver owns exactly one `Hal` value per chip and issues one
//! operation at a time, so implementations need no internal locking.
//!
//! Two implementations ship with the crate:
//! - [`mock::MockHal`] simulates the chip's register file and FIFO for tests
//! - [`raspberry_pi::RaspberryPiHal`] drives real hardware through `rppal`
//!   (feature `raspberry-pi`)

use thiserror::Error;

/// Callback invoked from the line-watch context on every rising edge
pub type EdgeCallback = Box<dyn FnMut() + Send + 'static>;

/// Errors that can occur during HAL operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    #[error("SPI communication error: {0}")]
    Spi(String),

    #[error("GPIO operation error: {0}")]
    Gpio(String),

    /// Full-duplex transfer returned fewer bytes than were clocked out
    #[error("Short SPI transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HAL released an edge callback the driver never unwatched
    #[error("Edge watch on GPIO {0} dropped while armed")]
    WatchDropped(u8),
}

/// Hardware Abstraction Layer trait for SX127x radio control
pub trait Hal: Send + 'static {
    /// Clock out `out` and return the bytes clocked in (same length)
    fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>, HalError>;

    /// Clock out `out`, ignoring whatever comes back
    fn write(&mut self, out: &[u8]) -> Result<(), HalError>;

    /// Drive an output line high or low
    fn set_level(&mut self, pin: u8, high: bool) -> Result<(), HalError>;

    /// Call `callback` on every rising edge of `pin`, replacing any previous watch
    fn watch_rising_edge(&mut self, pin: u8, callback: EdgeCallback) -> Result<(), HalError>;

    /// Stop watching `pin`. Unwatching a line that is not watched is not an error.
    fn unwatch(&mut self, pin: u8) -> Result<(), HalError>;
}

pub mod mock;

// Platform implementations
#[cfg(feature = "raspberry-pi")]
pub mod raspberry_pi;

pub use mock::MockHal;

#[cfg(feature = "raspberry-pi")]
pub use raspberry_pi::{RaspberryPiHal, RaspberryPiHalBuilder};
