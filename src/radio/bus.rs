//! # SX127x Register Bus
//!
//! Frames register accesses onto the SPI transport and implements the bit-field
//! read-modify-write every configuration step goes through.
//!
//! ## Framing
//!
//! ```text
//! read  n bytes:  MOSI  [0aaaaaaa] [00] [00] ... (n)
//!                 MISO  [  echo  ] [d0] [d1] ... (n)
//! write n bytes:  MOSI  [1aaaaaaa] [d0] [d1] ... (n)
//! ```
//!
//! Burst accesses to `REG_FIFO` stream through the FIFO pointer; bursts to any
//! other address auto-increment the address.

use crate::error::{Sx127xError, ValidationError};
use crate::radio::hal::{Hal, HalError};
use crate::radio::registers::{register_label, Field};
use log::debug;

/// Bit 7 of the address byte selects a write access
const WRITE_FLAG: u8 = 0x80;

/// Mask for the 7-bit register address
const ADDRESS_MASK: u8 = 0x7F;

/// Mask of a `width`-bit field at bit `offset`, or an error if it does not fit in a byte
pub fn field_mask(width: u8, offset: u8) -> Result<u8, ValidationError> {
    if !(1..=7).contains(&width) || offset > 7 || width + offset > 8 {
        return Err(ValidationError::BitField { width, offset });
    }
    Ok(((1u8 << width) - 1) << offset)
}

/// Extract a field from a register byte
pub fn extract_field(byte: u8, width: u8, offset: u8) -> Result<u8, ValidationError> {
    let mask = field_mask(width, offset)?;
    Ok((byte & mask) >> offset)
}

/// Replace a field inside a register byte; bits of `value` beyond `width` are dropped
pub fn insert_field(byte: u8, width: u8, offset: u8, value: u8) -> Result<u8, ValidationError> {
    let mask = field_mask(width, offset)?;
    Ok((byte & !mask) | ((value << offset) & mask))
}

/// Diagnostic line for a read: `"REG_VERSION (0x42) read 0x12"`
pub fn read_trace(address: u8, data: &[u8]) -> String {
    match data {
        [value] => format!("{} read 0x{value:02X}", register_label(address)),
        _ => format!(
            "{} read {} bytes {:02X?}",
            register_label(address),
            data.len(),
            data
        ),
    }
}

/// Diagnostic line for a write: `"REG_OP_MODE (0x01) <- 0x81"`
pub fn write_trace(address: u8, data: &[u8]) -> String {
    match data {
        [value] => format!("{} <- 0x{value:02X}", register_label(address)),
        _ => format!("{} <- {} bytes {:02X?}", register_label(address), data.len(), data),
    }
}

/// Diagnostic line for a field write skipped because nothing changed
pub fn unchanged_trace(address: u8, value: u8) -> String {
    format!("{} unchanged (0x{value:02X})", register_label(address))
}

/// Register-level access to one SX127x over a [`Hal`]
pub struct RegisterBus<H: Hal> {
    hal: H,
    /// Report every access at debug level
    diagnostics: bool,
}

impl<H: Hal> RegisterBus<H> {
    pub fn new(hal: H, diagnostics: bool) -> Self {
        Self { hal, diagnostics }
    }

    pub fn set_diagnostics(&mut self, enabled: bool) {
        self.diagnostics = enabled;
    }

    pub fn diagnostics(&self) -> bool {
        self.diagnostics
    }

    /// Access to the lines of the underlying HAL
    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn into_inner(self) -> H {
        self.hal
    }

    /// Read one register
    pub fn read_register(&mut self, address: u8) -> Result<u8, HalError> {
        let data = self.read_buffer(address, 1)?;
        Ok(data[0])
    }

    /// Read `len` bytes starting at `address`
    pub fn read_buffer(&mut self, address: u8, len: usize) -> Result<Vec<u8>, HalError> {
        let mut out = vec![0u8; len + 1];
        out[0] = address & ADDRESS_MASK;

        let response = self.hal.transfer(&out)?;
        if response.len() != out.len() {
            return Err(HalError::ShortTransfer {
                expected: out.len(),
                actual: response.len(),
            });
        }

        // First byte clocked in while the address went out
        let data = response[1..].to_vec();
        if self.diagnostics {
            debug!("{}", read_trace(address, &data));
        }
        Ok(data)
    }

    /// Write one register
    pub fn write_register(&mut self, address: u8, value: u8) -> Result<(), HalError> {
        self.write_buffer(address, &[value])
    }

    /// Write `data` starting at `address`
    pub fn write_buffer(&mut self, address: u8, data: &[u8]) -> Result<(), HalError> {
        let mut out = Vec::with_capacity(1 + data.len());
        out.push((address & ADDRESS_MASK) | WRITE_FLAG);
        out.extend_from_slice(data);

        if self.diagnostics {
            debug!("{}", write_trace(address, data));
        }
        self.hal.write(&out)
    }

    /// Read a `width`-bit field at bit `offset` of `address`
    pub fn read_field(&mut self, address: u8, width: u8, offset: u8) -> Result<u8, Sx127xError> {
        field_mask(width, offset)?;
        let byte = self.read_register(address)?;
        Ok(extract_field(byte, width, offset)?)
    }

    /// Read-modify-write a field. The register is only written back when its
    /// value actually changes.
    pub fn write_field(
        &mut self,
        address: u8,
        width: u8,
        offset: u8,
        value: u8,
    ) -> Result<(), Sx127xError> {
        field_mask(width, offset)?;
        let current = self.read_register(address)?;
        let updated = insert_field(current, width, offset, value)?;

        if updated != current {
            self.write_register(address, updated)?;
        } else if self.diagnostics {
            debug!("{}", unchanged_trace(address, current));
        }
        Ok(())
    }

    pub fn read(&mut self, field: Field) -> Result<u8, Sx127xError> {
        self.read_field(field.register, field.width, field.offset)
    }

    pub fn write(&mut self, field: Field, value: u8) -> Result<(), Sx127xError> {
        self.write_field(field.register, field.width, field.offset, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::hal::MockHal;
    use crate::radio::registers::{
        REG_FIFO, REG_MODEM_CONFIG_1, REG_OP_MODE, REG_PREAMBLE_LSB, REG_VERSION,
    };

    #[test]
    fn test_field_mask() {
        assert_eq!(field_mask(1, 7), Ok(0x80));
        assert_eq!(field_mask(3, 0), Ok(0x07));
        assert_eq!(field_mask(4, 4), Ok(0xF0));
        assert_eq!(field_mask(7, 1), Ok(0xFE));

        assert!(field_mask(0, 0).is_err());
        assert!(field_mask(8, 0).is_err());
        assert!(field_mask(4, 5).is_err());
        assert!(field_mask(1, 8).is_err());
    }

    #[test]
    fn test_insert_and_extract() {
        // Coding rate 4/5 into the default RegModemConfig1
        let byte = insert_field(0x72, 3, 1, 1).unwrap();
        assert_eq!(byte, 0x72);
        let byte = insert_field(0x72, 3, 1, 4).unwrap();
        assert_eq!(byte, 0x78);
        assert_eq!(extract_field(byte, 3, 1), Ok(4));

        // Excess value bits are masked off
        assert_eq!(insert_field(0x00, 2, 6, 0xFF), Ok(0xC0));
    }

    #[test]
    fn test_read_framing() {
        let mock = MockHal::new();
        let mut bus = RegisterBus::new(mock.clone(), false);

        assert_eq!(bus.read_register(REG_VERSION), Ok(0x12));
        assert_eq!(mock.transfers(), vec![vec![REG_VERSION, 0x00]]);
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn test_write_framing() {
        let mock = MockHal::new();
        let mut bus = RegisterBus::new(mock.clone(), false);

        bus.write_buffer(REG_PREAMBLE_LSB, &[0x0C]).unwrap();
        assert_eq!(mock.writes(), vec![vec![0x80 | REG_PREAMBLE_LSB, 0x0C]]);
        assert_eq!(mock.register(REG_PREAMBLE_LSB), 0x0C);
    }

    #[test]
    fn test_unchanged_field_skips_write() {
        let mock = MockHal::new();
        mock.set_register(REG_MODEM_CONFIG_1, 0x72);
        let mut bus = RegisterBus::new(mock.clone(), true);

        bus.write_field(REG_MODEM_CONFIG_1, 4, 4, 7).unwrap();
        assert_eq!(mock.write_count(), 0);
        assert_eq!(mock.transfer_count(), 1);

        bus.write_field(REG_MODEM_CONFIG_1, 4, 4, 8).unwrap();
        assert_eq!(mock.write_count(), 1);
        assert_eq!(mock.register(REG_MODEM_CONFIG_1), 0x82);
    }

    #[test]
    fn test_invalid_field_touches_nothing() {
        let mock = MockHal::new();
        let mut bus = RegisterBus::new(mock.clone(), false);

        let result = bus.write_field(REG_MODEM_CONFIG_1, 5, 4, 1);
        assert!(matches!(
            result,
            Err(Sx127xError::Validation(ValidationError::BitField { width: 5, offset: 4 }))
        ));
        assert_eq!(mock.bus_call_count(), 0);
    }

    #[test]
    fn test_trace_lines() {
        assert_eq!(read_trace(REG_VERSION, &[0x12]), "REG_VERSION (0x42) read 0x12");
        assert_eq!(write_trace(REG_OP_MODE, &[0x81]), "REG_OP_MODE (0x01) <- 0x81");
        assert_eq!(read_trace(0x55, &[0x00]), "0x55 read 0x00");
        // Write flag is stripped from the label
        assert_eq!(write_trace(0x80 | 0x55, &[0x07]), "0x55 <- 0x07");
        assert_eq!(
            unchanged_trace(REG_MODEM_CONFIG_1, 0x72),
            "REG_MODEM_CONFIG_1 (0x1D) unchanged (0x72)"
        );
    }

    #[test]
    fn test_burst_trace_lines() {
        assert_eq!(
            write_trace(REG_FIFO, b"hi!"),
            "REG_FIFO (0x00) <- 3 bytes [68, 69, 21]"
        );
        assert_eq!(
            read_trace(REG_FIFO, &[0xDE, 0xAD]),
            "REG_FIFO (0x00) read 2 bytes [DE, AD]"
        );
    }

    #[test]
    fn test_bus_error_propagates() {
        let mock = MockHal::new();
        mock.fail_next(HalError::Spi("bus fault".to_string()));
        let mut bus = RegisterBus::new(mock.clone(), false);

        let result = bus.read_field(REG_MODEM_CONFIG_1, 4, 4);
        assert!(matches!(result, Err(Sx127xError::Bus(HalError::Spi(_)))));
    }
}
