//! Simulated SX127x for testing
//!
//! [`MockHal`] models the parts of the chip the driver talks to: the 128-byte
//! register file with its reset values, the 256-byte FIFO behind `RegFifoAddrPtr`,
//! write-one-to-clear IRQ flags, the Sleep-only LongRangeMode bit, and the NRESET /
//! DIO0 lines. Every bus transaction is logged so tests can assert on traffic.
//!
//! The mock is `Clone`; clones share state, so a test keeps one handle while the
//! driver owns the other.

use crate::radio::hal::{EdgeCallback, Hal, HalError};
use crate::radio::registers::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Register values after power-on reset
const RESET_VALUES: [(u8, u8); 19] = [
    (REG_OP_MODE, 0x09),
    (REG_FRF_MSB, 0x6C),
    (REG_FRF_MID, 0x80),
    (REG_PA_CONFIG, 0x4F),
    (REG_FIFO_TX_BASE_ADDR, 0x80),
    (REG_MODEM_CONFIG_1, 0x72),
    (REG_MODEM_CONFIG_2, 0x70),
    (REG_PREAMBLE_LSB, 0x08),
    (REG_PAYLOAD_LENGTH, 0x01),
    (REG_IF_FREQ_2, 0x20),
    (REG_DETECTION_OPTIMIZE, 0xC3),
    (REG_HIGH_BW_OPTIMIZE_1, 0x03),
    (REG_DETECTION_THRESHOLD, 0x0A),
    (REG_HIGH_BW_OPTIMIZE_2, 0x65),
    (REG_VERSION, SX127X_VERSION),
    (REG_PA_DAC, 0x84),
    (REG_MODEM_CONFIG_3, 0x00),
    (REG_FIFO_RX_BASE_ADDR, 0x00),
    (REG_DIO_MAPPING_1, 0x00),
];

struct MockState {
    registers: [u8; 128],
    fifo: [u8; FIFO_SIZE],
    /// Registers whose writes are silently dropped
    locked: HashSet<u8>,
    levels: HashMap<u8, bool>,
    level_history: Vec<(u8, bool)>,
    watches: HashMap<u8, EdgeCallback>,
    transfers: Vec<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    fail_next: Option<HalError>,
    /// Complete transmissions immediately and raise DIO0 on this line
    auto_tx_done: Option<u8>,
}

impl MockState {
    fn new() -> Self {
        let mut registers = [0u8; 128];
        for (address, value) in RESET_VALUES {
            registers[address as usize] = value;
        }

        Self {
            registers,
            fifo: [0u8; FIFO_SIZE],
            locked: HashSet::new(),
            levels: HashMap::new(),
            level_history: Vec::new(),
            watches: HashMap::new(),
            transfers: Vec::new(),
            writes: Vec::new(),
            fail_next: None,
            auto_tx_done: None,
        }
    }

    fn read_byte(&mut self, address: u8) -> u8 {
        if address == REG_FIFO {
            let ptr = self.registers[REG_FIFO_ADDR_PTR as usize];
            self.registers[REG_FIFO_ADDR_PTR as usize] = ptr.wrapping_add(1);
            self.fifo[ptr as usize]
        } else {
            self.registers[(address & 0x7F) as usize]
        }
    }

    fn write_byte(&mut self, address: u8, value: u8) {
        let address = address & 0x7F;
        if self.locked.contains(&address) {
            return;
        }

        match address {
            REG_FIFO => {
                let ptr = self.registers[REG_FIFO_ADDR_PTR as usize];
                self.fifo[ptr as usize] = value;
                self.registers[REG_FIFO_ADDR_PTR as usize] = ptr.wrapping_add(1);
            }
            REG_IRQ_FLAGS => {
                self.registers[address as usize] &= !value;
            }
            REG_VERSION => {}
            REG_OP_MODE => self.write_op_mode(value),
            _ => self.registers[address as usize] = value,
        }
    }

    fn write_op_mode(&mut self, value: u8) {
        let current = self.registers[REG_OP_MODE as usize];
        let mut value = value;

        // LongRangeMode only changes in Sleep
        if current & 0x07 != OperatingMode::Sleep.bits() {
            value = (value & 0x7F) | (current & 0x80);
        }

        if value & 0x07 == OperatingMode::Transmit.bits() {
            if let Some(pin) = self.auto_tx_done {
                self.registers[REG_IRQ_FLAGS as usize] |= IrqFlags::TX_DONE.bits();
                value = (value & !0x07) | OperatingMode::Standby.bits();
                self.registers[REG_OP_MODE as usize] = value;
                if let Some(callback) = self.watches.get_mut(&pin) {
                    callback();
                }
                return;
            }
        }

        self.registers[REG_OP_MODE as usize] = value;
    }

    fn check_failure(&mut self) -> Result<(), HalError> {
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Simulated SX127x implementing [`Hal`]
#[derive(Clone)]
pub struct MockHal {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// A chip reporting `version` in RegVersion (0x00 simulates an empty socket)
    pub fn with_version(version: u8) -> Self {
        let mock = Self::new();
        mock.state().registers[REG_VERSION as usize] = version;
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, address: u8) -> u8 {
        self.state().registers[(address & 0x7F) as usize]
    }

    /// Set a register directly, bypassing write semantics
    pub fn set_register(&self, address: u8, value: u8) {
        self.state().registers[(address & 0x7F) as usize] = value;
    }

    /// Drop all future writes to `address` (a stuck or miswired chip)
    pub fn lock_register(&self, address: u8) {
        self.state().locked.insert(address & 0x7F);
    }

    pub fn fifo(&self, start: usize, len: usize) -> Vec<u8> {
        let state = self.state();
        (0..len).map(|i| state.fifo[(start + i) % FIFO_SIZE]).collect()
    }

    /// Stage a received packet at FIFO offset 0 as the modem would leave it
    pub fn load_rx_packet(&self, payload: &[u8], snr_raw: u8, rssi_raw: u8, irq_flags: u8) {
        let mut state = self.state();
        state.fifo[..payload.len()].copy_from_slice(payload);
        state.registers[REG_FIFO_RX_CURRENT_ADDR as usize] = 0;
        state.registers[REG_RX_NB_BYTES as usize] = payload.len() as u8;
        state.registers[REG_PKT_SNR_VALUE as usize] = snr_raw;
        state.registers[REG_PKT_RSSI_VALUE as usize] = rssi_raw;
        state.registers[REG_IRQ_FLAGS as usize] = irq_flags;
    }

    /// Make the next bus transaction fail with `err`
    pub fn fail_next(&self, err: HalError) {
        self.state().fail_next = Some(err);
    }

    /// Finish every transmission at once and raise `pin`, like a chip with an instant air time
    pub fn set_auto_tx_done(&self, pin: Option<u8>) {
        self.state().auto_tx_done = pin;
    }

    /// Raise a rising edge on `pin`. Returns `false` if nothing was watching it.
    pub fn fire_edge(&self, pin: u8) -> bool {
        let mut state = self.state();
        match state.watches.get_mut(&pin) {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Release the callback on `pin` behind the driver's back, as a faulty HAL would
    pub fn lose_watch(&self, pin: u8) {
        self.state().watches.remove(&pin);
    }

    pub fn is_watched(&self, pin: u8) -> bool {
        self.state().watches.contains_key(&pin)
    }

    pub fn level(&self, pin: u8) -> Option<bool> {
        self.state().levels.get(&pin).copied()
    }

    /// Every `set_level` call in order
    pub fn level_history(&self) -> Vec<(u8, bool)> {
        self.state().level_history.clone()
    }

    /// Full-duplex transactions (register reads) in order
    pub fn transfers(&self) -> Vec<Vec<u8>> {
        self.state().transfers.clone()
    }

    /// Write transactions in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    pub fn transfer_count(&self) -> usize {
        self.state().transfers.len()
    }

    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }

    pub fn bus_call_count(&self) -> usize {
        let state = self.state();
        state.transfers.len() + state.writes.len()
    }

    /// Whether any write transaction targeted `address`
    pub fn was_written(&self, address: u8) -> bool {
        self.state()
            .writes
            .iter()
            .any(|w| w.first().map(|a| a & 0x7F) == Some(address & 0x7F))
    }

    pub fn clear_log(&self) {
        let mut state = self.state();
        state.transfers.clear();
        state.writes.clear();
    }
}

impl Hal for MockHal {
    fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>, HalError> {
        let mut state = self.state();
        state.transfers.push(out.to_vec());
        state.check_failure()?;

        let mut response = vec![0u8; out.len()];
        let Some(&first) = out.first() else {
            return Ok(response);
        };

        let address = first & 0x7F;
        if first & 0x80 != 0 {
            for (i, &byte) in out[1..].iter().enumerate() {
                let target = if address == REG_FIFO {
                    REG_FIFO
                } else {
                    address.wrapping_add(i as u8) & 0x7F
                };
                state.write_byte(target, byte);
            }
        } else {
            for i in 1..out.len() {
                let target = if address == REG_FIFO {
                    REG_FIFO
                } else {
                    address.wrapping_add((i - 1) as u8) & 0x7F
                };
                response[i] = state.read_byte(target);
            }
        }
        Ok(response)
    }

    fn write(&mut self, out: &[u8]) -> Result<(), HalError> {
        let mut state = self.state();
        state.writes.push(out.to_vec());
        state.check_failure()?;

        let Some(&first) = out.first() else {
            return Ok(());
        };
        let address = first & 0x7F;
        for (i, &byte) in out[1..].iter().enumerate() {
            let target = if address == REG_FIFO {
                REG_FIFO
            } else {
                address.wrapping_add(i as u8) & 0x7F
            };
            state.write_byte(target, byte);
        }
        Ok(())
    }

    fn set_level(&mut self, pin: u8, high: bool) -> Result<(), HalError> {
        let mut state = self.state();
        state.levels.insert(pin, high);
        state.level_history.push((pin, high));
        Ok(())
    }

    fn watch_rising_edge(&mut self, pin: u8, callback: EdgeCallback) -> Result<(), HalError> {
        self.state().watches.insert(pin, callback);
        Ok(())
    }

    fn unwatch(&mut self, pin: u8) -> Result<(), HalError> {
        self.state().watches.remove(&pin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_pointer_auto_increment() {
        let mut mock = MockHal::new();
        mock.write(&[0x80 | REG_FIFO_ADDR_PTR, 0x10]).unwrap();
        mock.write(&[0x80 | REG_FIFO, 0xAA, 0xBB]).unwrap();

        assert_eq!(mock.fifo(0x10, 2), vec![0xAA, 0xBB]);
        assert_eq!(mock.register(REG_FIFO_ADDR_PTR), 0x12);
    }

    #[test]
    fn test_irq_flags_write_one_to_clear() {
        let mut mock = MockHal::new();
        mock.set_register(REG_IRQ_FLAGS, 0x58);
        mock.write(&[0x80 | REG_IRQ_FLAGS, 0x50]).unwrap();
        assert_eq!(mock.register(REG_IRQ_FLAGS), 0x08);
    }

    #[test]
    fn test_lora_bit_only_changes_in_sleep() {
        let mut mock = MockHal::new();

        // Standby: LongRangeMode write ignored
        mock.write(&[0x80 | REG_OP_MODE, 0x81]).unwrap();
        assert_eq!(mock.register(REG_OP_MODE), 0x01);

        mock.write(&[0x80 | REG_OP_MODE, 0x00]).unwrap();
        mock.write(&[0x80 | REG_OP_MODE, 0x80]).unwrap();
        assert_eq!(mock.register(REG_OP_MODE), 0x80);
    }

    #[test]
    fn test_edge_watch() {
        let mut mock = MockHal::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();

        assert!(!mock.fire_edge(25));
        mock.watch_rising_edge(25, Box::new(move || *counter.lock().unwrap() += 1))
            .unwrap();
        assert!(mock.fire_edge(25));
        mock.unwatch(25).unwrap();
        assert!(!mock.fire_edge(25));
        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
