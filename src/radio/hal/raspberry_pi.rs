//! # Raspberry Pi HAL Implementation
//!
//! [`Hal`] for an SX127x module wired to the Raspberry Pi 40-pin header, using
//! `rppal` for SPI and GPIO.
//!
//! ## Wiring (SPI0, default lines)
//! ```text
//! Pi Pin │ BCM GPIO │ SX127x Pin │ Function
//! ───────┼──────────┼────────────┼─────────────
//! 19     │ GPIO 10  │ MOSI       │ SPI data out
//! 21     │ GPIO 9   │ MISO       │ SPI data in
//! 23     │ GPIO 11  │ SCK        │ SPI clock
//! 24     │ GPIO 8   │ NSS        │ Chip select (CE0)
//! 15     │ GPIO 22  │ NRESET     │ Reset (output)
//! 22     │ GPIO 25  │ DIO0       │ RxDone / TxDone (input)
//! ```
//!
//! SPI runs in mode 0, MSB first. SPI must be enabled in `/boot/config.txt`
//! (`dtparam=spi=on`).
//!
//! ```rust,no_run
//! use sx127x_rs::config::DeviceConfiguration;
//! use sx127x_rs::radio::driver::Sx127xDriver;
//! use sx127x_rs::radio::hal::RaspberryPiHal;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfiguration::from_file("/etc/sx127x.json")?;
//! let hal = RaspberryPiHal::from_config(&config)?;
//! let mut driver = Sx127xDriver::new(hal, config);
//! driver.initialize().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{DeviceConfiguration, MAX_SPI_SPEED_HZ};
use crate::radio::hal::{EdgeCallback, Hal, HalError};
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::collections::HashMap;

/// Raspberry Pi HAL for one SX127x
pub struct RaspberryPiHal {
    spi: Spi,
    gpio: Gpio,
    /// Lines claimed as outputs (NRESET)
    outputs: HashMap<u8, OutputPin>,
    /// Lines claimed as inputs with an edge watch (DIO0)
    inputs: HashMap<u8, InputPin>,
    bus_info: String,
}

impl RaspberryPiHal {
    /// Open SPI `bus`/`slave_select` at `speed_hz`. GPIO lines are claimed on first use.
    pub fn new(bus: Bus, slave_select: SlaveSelect, speed_hz: u32) -> Result<Self, HalError> {
        if speed_hz == 0 || speed_hz > MAX_SPI_SPEED_HZ {
            return Err(HalError::InvalidConfig(format!(
                "Invalid SPI speed {speed_hz} Hz, must be 1-{MAX_SPI_SPEED_HZ}"
            )));
        }

        let spi = Spi::new(bus, slave_select, speed_hz, Mode::Mode0)
            .map_err(|e| HalError::Spi(format!("SPI initialization failed: {e}")))?;
        let gpio =
            Gpio::new().map_err(|e| HalError::Gpio(format!("GPIO initialization failed: {e}")))?;

        let bus_info = format!("{bus:?}/{slave_select:?} at {speed_hz} Hz");
        log::info!("Raspberry Pi HAL initialized: {bus_info}");

        Ok(Self {
            spi,
            gpio,
            outputs: HashMap::new(),
            inputs: HashMap::new(),
            bus_info,
        })
    }

    /// SPI0/CE0 at the configured clock, with NRESET claimed and released (high)
    pub fn from_config(config: &DeviceConfiguration) -> Result<Self, HalError> {
        RaspberryPiHalBuilder::new()
            .spi_speed(config.spi_speed_hz)
            .reset_pin(config.reset_pin)
            .build()
    }

    pub fn bus_info(&self) -> &str {
        &self.bus_info
    }

    fn output(&mut self, pin: u8) -> Result<&mut OutputPin, HalError> {
        if !self.outputs.contains_key(&pin) {
            let line = self
                .gpio
                .get(pin)
                .map_err(|e| HalError::Gpio(format!("GPIO {pin} unavailable: {e}")))?
                .into_output();
            self.outputs.insert(pin, line);
        }
        self.outputs
            .get_mut(&pin)
            .ok_or_else(|| HalError::Gpio(format!("GPIO {pin} not claimed")))
    }
}

impl Hal for RaspberryPiHal {
    fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>, HalError> {
        let mut response = vec![0u8; out.len()];
        let transferred = self
            .spi
            .transfer(&mut response, out)
            .map_err(|e| HalError::Spi(format!("SPI transfer failed: {e}")))?;

        if transferred != out.len() {
            return Err(HalError::ShortTransfer {
                expected: out.len(),
                actual: transferred,
            });
        }
        Ok(response)
    }

    fn write(&mut self, out: &[u8]) -> Result<(), HalError> {
        let written = self
            .spi
            .write(out)
            .map_err(|e| HalError::Spi(format!("SPI write failed: {e}")))?;

        if written != out.len() {
            return Err(HalError::ShortTransfer {
                expected: out.len(),
                actual: written,
            });
        }
        Ok(())
    }

    fn set_level(&mut self, pin: u8, high: bool) -> Result<(), HalError> {
        let line = self.output(pin)?;
        if high {
            line.set_high();
        } else {
            line.set_low();
        }
        Ok(())
    }

    fn watch_rising_edge(&mut self, pin: u8, mut callback: EdgeCallback) -> Result<(), HalError> {
        self.unwatch(pin)?;

        let mut line = self
            .gpio
            .get(pin)
            .map_err(|e| HalError::Gpio(format!("GPIO {pin} unavailable: {e}")))?
            .into_input();
        line.set_async_interrupt(Trigger::RisingEdge, move |_level| callback())
            .map_err(|e| HalError::Gpio(format!("Failed to set interrupt on GPIO {pin}: {e}")))?;

        self.inputs.insert(pin, line);
        log::debug!("Watching rising edges on GPIO {pin}");
        Ok(())
    }

    fn unwatch(&mut self, pin: u8) -> Result<(), HalError> {
        if let Some(mut line) = self.inputs.remove(&pin) {
            line.clear_async_interrupt().map_err(|e| {
                HalError::Gpio(format!("Failed to clear interrupt on GPIO {pin}: {e}"))
            })?;
            log::debug!("Stopped watching GPIO {pin}");
        }
        Ok(())
    }
}

/// Builder for [`RaspberryPiHal`]
///
/// ```rust,no_run
/// use sx127x_rs::radio::hal::RaspberryPiHalBuilder;
///
/// let hal = RaspberryPiHalBuilder::new()
///     .spi_bus(0)
///     .chip_select(1)
///     .spi_speed(4_000_000)
///     .reset_pin(17)
///     .build()?;
/// # Ok::<(), sx127x_rs::radio::hal::HalError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RaspberryPiHalBuilder {
    spi_bus: u8,
    chip_select: u8,
    spi_speed: u32,
    reset_pin: Option<u8>,
}

impl Default for RaspberryPiHalBuilder {
    fn default() -> Self {
        Self {
            spi_bus: 0,
            chip_select: 0,
            spi_speed: 8_000_000,
            reset_pin: None,
        }
    }
}

impl RaspberryPiHalBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// SPI controller (0 or 1)
    pub fn spi_bus(mut self, bus: u8) -> Self {
        self.spi_bus = bus;
        self
    }

    /// Chip-select line (0-2)
    pub fn chip_select(mut self, cs: u8) -> Self {
        self.chip_select = cs;
        self
    }

    pub fn spi_speed(mut self, speed: u32) -> Self {
        self.spi_speed = speed;
        self
    }

    /// Claim NRESET at build time and hold the radio out of reset
    pub fn reset_pin(mut self, pin: u8) -> Self {
        self.reset_pin = Some(pin);
        self
    }

    pub fn build(self) -> Result<RaspberryPiHal, HalError> {
        let bus = match self.spi_bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            other => {
                return Err(HalError::InvalidConfig(format!(
                    "Invalid SPI bus {other}, only 0 and 1 supported"
                )))
            }
        };
        let slave_select = match self.chip_select {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => {
                return Err(HalError::InvalidConfig(format!(
                    "Invalid chip select {other}, only 0-2 supported"
                )))
            }
        };

        let mut hal = RaspberryPiHal::new(bus, slave_select, self.spi_speed)?;
        if let Some(pin) = self.reset_pin {
            hal.set_level(pin, true)?;
        }
        Ok(hal)
    }
}
