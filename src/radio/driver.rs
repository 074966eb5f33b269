//! # SX127x LoRa Driver
//!
//! Async driver for the Semtech SX1276/77/78/79 in LoRa mode. The driver owns the
//! chip's register bus together with its NRESET and DIO0 lines and exposes three
//! intents: configure, receive and transmit.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──► initialize ──► Standby ◄──────────────┐
//!                          │  begin_receive     │ stop_receive
//!                          ├──────────────► RxContinuous ──► RadioEvent per DIO0 edge
//!                          │  send              │
//!                          └──────────────► Tx ─┴─► TxDone edge | timeout
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sx127x_rs::config::DeviceConfiguration;
//! use sx127x_rs::radio::driver::{RadioEvent, Sx127xDriver};
//! use sx127x_rs::radio::hal::MockHal;
//!
//! # async fn example() -> Result<(), sx127x_rs::error::Sx127xError> {
//! let config = DeviceConfiguration::default().with_frequency(868.1);
//! let mut driver = Sx127xDriver::new(MockHal::new(), config);
//! driver.initialize().await?;
//!
//! let mut events = driver.take_events().expect("first call");
//! driver.begin_receive().await?;
//! while let Some(event) = events.recv().await {
//!     if let RadioEvent::Packet(packet) = event {
//!         println!("{} bytes at {} dB", packet.payload.len(), packet.rssi_db);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::DeviceConfiguration;
use crate::error::{Sx127xError, ValidationError};
use crate::radio::bus::RegisterBus;
use crate::radio::frequency;
use crate::radio::hal::{Hal, HalError};
use crate::radio::registers::*;
use crate::util::logging::{log_payload_hex, LogThrottle};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// NRESET low time
const RESET_HOLD: Duration = Duration::from_micros(100);

/// Wait after releasing NRESET before the chip answers on SPI
const POWER_UP_SETTLE: Duration = Duration::from_millis(5);

/// Wait after entering Sleep before LongRangeMode may be set
const SLEEP_SETTLE: Duration = Duration::from_millis(10);

/// Receive-error log throttling: 5 messages per minute
const RX_ERROR_LOG_WINDOW: Duration = Duration::from_secs(60);
const RX_ERROR_LOG_CAP: u32 = 5;

/// A packet drained from the FIFO after RxDone
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedPacket {
    pub payload: Vec<u8>,
    /// RegPktRssiValue - 137
    pub rssi_db: i16,
    /// RegPktSnrValue as two's complement quarter dB
    pub snr_db: f32,
}

/// Why a receive interrupt did not produce a packet
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveFailure {
    /// IRQ flags did not show RxDone + ValidHeader without timeout or CRC error
    Flags(IrqFlags),
    /// Bus failure while draining the packet
    Bus(HalError),
}

impl From<HalError> for ReceiveFailure {
    fn from(err: HalError) -> Self {
        ReceiveFailure::Bus(err)
    }
}

/// Notifications emitted while a receive session is armed
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    Packet(ReceivedPacket),
    ReceiveError(ReceiveFailure),
}

/// Snapshot of the driver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadioStats {
    pub packets_received: u64,
    pub receive_errors: u64,
    pub packets_sent: u64,
    pub tx_timeouts: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    packets_received: AtomicU64,
    receive_errors: AtomicU64,
    packets_sent: AtomicU64,
    tx_timeouts: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> RadioStats {
        RadioStats {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            tx_timeouts: self.tx_timeouts.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.packets_received.store(0, Ordering::Relaxed);
        self.receive_errors.store(0, Ordering::Relaxed);
        self.packets_sent.store(0, Ordering::Relaxed);
        self.tx_timeouts.store(0, Ordering::Relaxed);
    }
}

/// Driver for one SX127x chip
pub struct Sx127xDriver<H: Hal> {
    /// Register bus and lines; every register sequence runs under one guard
    bus: Arc<Mutex<RegisterBus<H>>>,

    config: DeviceConfiguration,

    initialized: bool,

    events_tx: mpsc::UnboundedSender<RadioEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<RadioEvent>>,

    stats: Arc<StatCounters>,

    /// Receive task draining packets on DIO0 edges
    receive_task: Option<JoinHandle<()>>,

    /// Shutdown signal for the receive task
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl<H: Hal> Sx127xDriver<H> {
    /// Create a driver. Nothing touches the hardware until [`initialize`](Self::initialize).
    pub fn new(hal: H, config: DeviceConfiguration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            bus: Arc::new(Mutex::new(RegisterBus::new(hal, config.diagnostics))),
            config,
            initialized: false,
            events_tx,
            events_rx: Some(events_rx),
            stats: Arc::new(StatCounters::default()),
            receive_task: None,
            shutdown_tx: None,
        }
    }

    pub fn configuration(&self) -> &DeviceConfiguration {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Receiver for packet and receive-error notifications. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<RadioEvent>> {
        self.events_rx.take()
    }

    pub fn stats(&self) -> RadioStats {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Whether a receive session is armed
    pub fn is_receiving(&self) -> bool {
        self.receive_task
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn ensure_initialized(&self) -> Result<(), Sx127xError> {
        if self.initialized {
            Ok(())
        } else {
            Err(Sx127xError::NotInitialized)
        }
    }

    /// Reset the chip, verify it and program the configuration.
    ///
    /// The configuration is validated before the reset line is touched. Any
    /// failure leaves the driver uninitialized; calling again starts from scratch.
    pub async fn initialize(&mut self) -> Result<(), Sx127xError> {
        self.config.validate()?;

        self.initialized = false;
        self.stop_receive_task();

        let result = {
            let mut bus = self.bus.lock().await;
            bus.set_diagnostics(self.config.diagnostics);
            bus.hal_mut().unwatch(self.config.interrupt_pin)?;
            run_initialization(&mut *bus, &self.config).await
        };

        match result {
            Ok(()) => {
                self.initialized = true;
                info!(
                    "SX127x initialized: {:.3} MHz, {} Hz, SF{}, CR 4/{}, {} dB",
                    self.config.frequency_mhz,
                    self.config.bandwidth_hz,
                    self.config.spreading_factor,
                    self.config.coding_rate,
                    self.config.tx_power_db
                );
                Ok(())
            }
            Err(e) => {
                error!("SX127x initialization failed: {e}");
                Err(e)
            }
        }
    }

    /// Read the silicon revision
    pub async fn version(&self) -> Result<u8, Sx127xError> {
        let mut bus = self.bus.lock().await;
        Ok(bus.read_register(REG_VERSION)?)
    }

    /// Current operating mode as read back from the chip
    pub async fn mode(&self) -> Result<OperatingMode, Sx127xError> {
        self.ensure_initialized()?;
        let mut bus = self.bus.lock().await;
        Ok(OperatingMode::from_bits(bus.read(FIELD_MODE)?))
    }

    pub async fn sleep(&mut self) -> Result<(), Sx127xError> {
        self.set_mode(OperatingMode::Sleep).await
    }

    pub async fn standby(&mut self) -> Result<(), Sx127xError> {
        self.set_mode(OperatingMode::Standby).await
    }

    async fn set_mode(&mut self, mode: OperatingMode) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;
        let mut bus = self.bus.lock().await;
        bus.write(FIELD_MODE, mode.bits())?;
        debug!("Mode set to {mode:?}");
        Ok(())
    }

    /// Enter continuous receive. Every DIO0 edge yields one [`RadioEvent`] until
    /// [`stop_receive`](Self::stop_receive) or [`send`](Self::send).
    pub async fn begin_receive(&mut self) -> Result<(), Sx127xError> {
        self.ensure_initialized()?;
        self.stop_receive_task();

        let pin = self.config.interrupt_pin;
        let (edge_tx, edge_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        {
            let mut bus = self.bus.lock().await;
            bus.hal_mut().unwatch(pin)?;

            let armed = arm_receive(&mut *bus, pin, edge_tx);
            if let Err(e) = armed {
                let _ = bus.hal_mut().unwatch(pin);
                return Err(e);
            }
        }

        let bus = self.bus.clone();
        let events = self.events_tx.clone();
        let stats = self.stats.clone();
        let handle = tokio::spawn(async move {
            receive_loop(bus, edge_rx, shutdown_rx, events, stats).await;
        });

        self.receive_task = Some(handle);
        self.shutdown_tx = Some(shutdown_tx);
        info!("Receive started on DIO0 (GPIO {pin})");
        Ok(())
    }

    /// Leave receive: disarm DIO0 and force Standby. Calling it when not receiving is fine.
    pub async fn stop_receive(&mut self) -> Result<(), Sx127xError> {
        let was_receiving = self.stop_receive_task();
        if !self.initialized {
            return Ok(());
        }

        let mut bus = self.bus.lock().await;
        bus.hal_mut().unwatch(self.config.interrupt_pin)?;
        bus.write(FIELD_MODE, OperatingMode::Standby.bits())?;

        if was_receiving {
            info!("Receive stopped");
        }
        Ok(())
    }

    /// Transmit one packet and wait for TxDone.
    ///
    /// Payload length is checked before anything else. An active receive session
    /// is stopped first; the chip is left in whatever mode it ends up in, so
    /// callers that want to keep listening call `begin_receive` again.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), Sx127xError> {
        if payload.is_empty() {
            return Err(ValidationError::EmptyPayload.into());
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ValidationError::PayloadTooLong(payload.len()).into());
        }
        self.ensure_initialized()?;

        if self.stop_receive_task() {
            debug!("Receive cancelled for transmit");
        }

        let pin = self.config.interrupt_pin;
        let tx_timeout = self.config.tx_timeout();
        let (edge_tx, mut edge_rx) = mpsc::unbounded_channel();

        {
            let mut bus = self.bus.lock().await;
            bus.hal_mut().unwatch(pin)?;

            let armed = arm_transmit(&mut *bus, pin, payload, edge_tx);
            if let Err(e) = armed {
                let _ = bus.hal_mut().unwatch(pin);
                return Err(e);
            }
        }

        // The edge channel only lives as long as this call, so whichever of
        // edge and timeout resolves first is the only outcome.
        let outcome = timeout(tx_timeout, edge_rx.recv()).await;

        let mut bus = self.bus.lock().await;
        let unwatched = bus.hal_mut().unwatch(pin);
        drop(edge_rx);

        match outcome {
            Ok(Some(())) => {
                read_and_clear_irq(&mut *bus)?;
                unwatched?;
                self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                log_payload_hex("Sent", payload);
                Ok(())
            }
            // The only sender lives in the DIO0 callback, so the channel closes
            // early only when the HAL drops a callback that is still watched.
            Ok(None) => {
                unwatched?;
                Err(HalError::WatchDropped(pin).into())
            }
            Err(_) => {
                self.stats.tx_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!("Transmit of {} bytes timed out after {:?}", payload.len(), tx_timeout);
                unwatched?;
                Err(Sx127xError::Timeout(tx_timeout))
            }
        }
    }

    /// Stop receiving and put the chip to Sleep
    pub async fn shutdown(&mut self) -> Result<(), Sx127xError> {
        info!("Shutting down SX127x driver");
        self.stop_receive().await?;
        if self.initialized {
            self.sleep().await?;
        }
        Ok(())
    }

    /// Signal and abort the receive task. Returns whether one was running.
    fn stop_receive_task(&mut self) -> bool {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        match self.receive_task.take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }
}

impl<H: Hal> Drop for Sx127xDriver<H> {
    fn drop(&mut self) {
        self.stop_receive_task();

        // Lines only, no register traffic
        if let Ok(mut bus) = self.bus.try_lock() {
            let _ = bus.hal_mut().unwatch(self.config.interrupt_pin);
        }
    }
}

/// Steps 1-7 of bring-up, run under one bus guard
async fn run_initialization<H: Hal>(
    bus: &mut RegisterBus<H>,
    config: &DeviceConfiguration,
) -> Result<(), Sx127xError> {
    info!("Resetting SX127x (NRESET on GPIO {})", config.reset_pin);
    bus.hal_mut().set_level(config.reset_pin, false)?;
    sleep(RESET_HOLD).await;
    bus.hal_mut().set_level(config.reset_pin, true)?;
    sleep(POWER_UP_SETTLE).await;

    let version = bus.read_register(REG_VERSION)?;
    match version {
        0x00 => return Err(Sx127xError::DeviceNotFound),
        SX127X_VERSION => info!("SX127x found, silicon version 0x{version:02X}"),
        other => return Err(Sx127xError::UnsupportedVersion(other)),
    }

    bus.write(FIELD_MODE, OperatingMode::Sleep.bits())?;
    sleep(SLEEP_SETTLE).await;
    bus.write(FIELD_LORA_MODE, 1)?;

    let op_mode = bus.read_register(REG_OP_MODE)?;
    let lora = op_mode >> FIELD_LORA_MODE.offset;
    let mode = op_mode & 0x07;
    if lora != 1 || mode != OperatingMode::Sleep.bits() {
        return Err(Sx127xError::ConfigurationReadbackMismatch {
            expected: 0x80 | OperatingMode::Sleep.bits(),
            actual: (lora << 7) | mode,
        });
    }

    if config.frequency_mhz > frequency::LOW_BAND_MAX_MHZ {
        bus.write(FIELD_LOW_FREQUENCY_MODE, 0)?;
    }

    bus.write_register(REG_FIFO_TX_BASE_ADDR, 0)?;
    bus.write_register(REG_FIFO_RX_BASE_ADDR, 0)?;

    bus.write(FIELD_MODE, OperatingMode::Standby.bits())?;

    bus.write_register(REG_PREAMBLE_MSB, (config.preamble_length >> 8) as u8)?;
    bus.write_register(REG_PREAMBLE_LSB, config.preamble_length as u8)?;
    frequency::apply(bus, config.frequency_mhz, config.bandwidth_hz)?;
    program_spreading_factor(bus, config.spreading_factor)?;
    program_coding_rate(bus, config.coding_rate)?;
    bus.write(FIELD_CRC_ON, config.crc_enabled as u8)?;
    bus.write(FIELD_AGC_AUTO_ON, config.agc_enabled as u8)?;
    program_tx_power(bus, config.tx_power_db)?;

    Ok(())
}

/// Program the spreading factor and its detection tuning.
///
/// SF6 only works in implicit header mode with its own detection settings.
pub fn program_spreading_factor<H: Hal>(
    bus: &mut RegisterBus<H>,
    spreading_factor: u8,
) -> Result<(), Sx127xError> {
    let spreading_factor = crate::config::validate_spreading_factor(spreading_factor)?;

    if spreading_factor == 6 {
        bus.write(FIELD_DETECTION_OPTIMIZE, DETECTION_OPTIMIZE_SF6)?;
        bus.write_register(REG_DETECTION_THRESHOLD, DETECTION_THRESHOLD_SF6)?;
        bus.write(FIELD_IMPLICIT_HEADER, 1)?;
    } else {
        bus.write(FIELD_DETECTION_OPTIMIZE, DETECTION_OPTIMIZE_SF7_12)?;
        bus.write_register(REG_DETECTION_THRESHOLD, DETECTION_THRESHOLD_SF7_12)?;
        bus.write(FIELD_IMPLICIT_HEADER, 0)?;
    }
    bus.write(FIELD_SPREADING_FACTOR, spreading_factor)
}

/// Program coding rate 4/`coding_rate`
pub fn program_coding_rate<H: Hal>(
    bus: &mut RegisterBus<H>,
    coding_rate: u8,
) -> Result<(), Sx127xError> {
    let coding_rate = crate::config::validate_coding_rate(coding_rate)?;
    bus.write(FIELD_CODING_RATE, coding_rate - 4)
}

/// Program output power on PA_BOOST. Above 20 dB the boost DAC supplies the last 3 dB.
pub fn program_tx_power<H: Hal>(bus: &mut RegisterBus<H>, tx_power_db: i8) -> Result<(), Sx127xError> {
    let tx_power_db = crate::config::validate_tx_power(tx_power_db)?;

    let level = if tx_power_db > PA_STANDARD_MAX_DB {
        bus.write_register(REG_PA_DAC, PA_DAC_BOOST)?;
        tx_power_db - PA_BOOST_STEP_DB
    } else {
        bus.write_register(REG_PA_DAC, PA_DAC_DEFAULT)?;
        tx_power_db
    };

    bus.write(FIELD_PA_SELECT, 1)?;
    bus.write(FIELD_OUTPUT_POWER, (level - PA_OUTPUT_POWER_BASE_DB) as u8)
}

/// Read RegIrqFlags and write the set bits back to clear them
fn read_and_clear_irq<H: Hal>(bus: &mut RegisterBus<H>) -> Result<IrqFlags, HalError> {
    let raw = bus.read_register(REG_IRQ_FLAGS)?;
    if raw != 0 {
        bus.write_register(REG_IRQ_FLAGS, raw)?;
    }
    Ok(IrqFlags::from_bits_retain(raw))
}

fn arm_receive<H: Hal>(
    bus: &mut RegisterBus<H>,
    pin: u8,
    edge_tx: mpsc::UnboundedSender<()>,
) -> Result<(), Sx127xError> {
    bus.write_register(REG_FIFO_ADDR_PTR, 0)?;
    bus.write(FIELD_DIO0_MAPPING, DIO0_RX_DONE)?;
    bus.hal_mut().watch_rising_edge(
        pin,
        Box::new(move || {
            let _ = edge_tx.send(());
        }),
    )?;
    bus.write(FIELD_MODE, OperatingMode::ReceiveContinuous.bits())
}

fn arm_transmit<H: Hal>(
    bus: &mut RegisterBus<H>,
    pin: u8,
    payload: &[u8],
    edge_tx: mpsc::UnboundedSender<()>,
) -> Result<(), Sx127xError> {
    // FIFO is not accessible in Sleep
    bus.write(FIELD_MODE, OperatingMode::Standby.bits())?;
    bus.write_register(REG_FIFO_ADDR_PTR, 0)?;
    bus.write_buffer(REG_FIFO, payload)?;
    bus.write_register(REG_PAYLOAD_LENGTH, payload.len() as u8)?;
    bus.write(FIELD_DIO0_MAPPING, DIO0_TX_DONE)?;
    bus.hal_mut().watch_rising_edge(
        pin,
        Box::new(move || {
            let _ = edge_tx.send(());
        }),
    )?;
    bus.write(FIELD_MODE, OperatingMode::Transmit.bits())
}

/// Drain one packet after an RxDone edge
pub fn read_packet<H: Hal>(bus: &mut RegisterBus<H>) -> Result<ReceivedPacket, ReceiveFailure> {
    let flags = read_and_clear_irq(bus)?;
    if flags.bits() >> FIELD_RX_IRQ_PATTERN.offset != RX_VALID_PACKET_PATTERN {
        return Err(ReceiveFailure::Flags(flags));
    }

    let len = bus.read_register(REG_RX_NB_BYTES)? as usize;
    bus.write_register(REG_FIFO_ADDR_PTR, 0)?;
    let payload = if len == 0 {
        Vec::new()
    } else {
        bus.read_buffer(REG_FIFO, len)?
    };

    let snr_raw = bus.read_register(REG_PKT_SNR_VALUE)?;
    let rssi_raw = bus.read_register(REG_PKT_RSSI_VALUE)?;

    Ok(ReceivedPacket {
        payload,
        rssi_db: rssi_raw as i16 - RSSI_OFFSET_DB,
        snr_db: (snr_raw as i8) as f32 / 4.0,
    })
}

async fn receive_loop<H: Hal>(
    bus: Arc<Mutex<RegisterBus<H>>>,
    mut edges: mpsc::UnboundedReceiver<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<RadioEvent>,
    stats: Arc<StatCounters>,
) {
    let mut error_throttle = LogThrottle::new(RX_ERROR_LOG_WINDOW, RX_ERROR_LOG_CAP);
    debug!("Receive task started");

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            edge = edges.recv() => {
                if edge.is_none() {
                    break;
                }

                let outcome = {
                    let mut bus = bus.lock().await;
                    read_packet(&mut *bus)
                };

                let event = match outcome {
                    Ok(packet) => {
                        stats.packets_received.fetch_add(1, Ordering::Relaxed);
                        debug!(
                            "Packet received: {} bytes, RSSI {} dB, SNR {:.2} dB",
                            packet.payload.len(),
                            packet.rssi_db,
                            packet.snr_db
                        );
                        log_payload_hex("Received", &packet.payload);
                        RadioEvent::Packet(packet)
                    }
                    Err(failure) => {
                        stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                        if error_throttle.allow() {
                            warn!("Receive error: {failure:?}");
                        }
                        RadioEvent::ReceiveError(failure)
                    }
                };

                let _ = events.send(event);
            }
        }
    }

    debug!("Receive task stopped");
}
