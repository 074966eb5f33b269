//! # SX127x Register Definitions and Constants
//!
//! Register addresses, bit fields and chip constants for the SX1276/77/78/79 in
//! LoRa mode. Values follow the SX1276 datasheet (rev. 7) and the SX1276/77/78
//! errata note.
//!
//! ## Register Map (LoRa page)
//!
//! - 0x00-0x0F: FIFO, operating mode, carrier frequency, PA, FIFO pointers
//! - 0x10-0x1F: IRQ flags, packet status, modem configuration 1-2
//! - 0x20-0x3F: preamble, payload length, modem configuration 3, errata registers
//! - 0x40-0x4F: DIO mapping, version, PA DAC

use bitflags::bitflags;
use once_cell::sync::Lazy;
use std::collections::HashMap;

// =============================================================================
// Register Addresses
// =============================================================================

/// FIFO read/write access
pub const REG_FIFO: u8 = 0x00;

/// Operating mode and LoRa/FSK selection
pub const REG_OP_MODE: u8 = 0x01;

/// RF carrier frequency (MSB)
pub const REG_FRF_MSB: u8 = 0x06;

/// RF carrier frequency (MID)
pub const REG_FRF_MID: u8 = 0x07;

/// RF carrier frequency (LSB)
pub const REG_FRF_LSB: u8 = 0x08;

/// PA selection and output power control
pub const REG_PA_CONFIG: u8 = 0x09;

/// SPI interface address pointer in FIFO data buffer
pub const REG_FIFO_ADDR_PTR: u8 = 0x0D;

/// Start of the transmit area in the FIFO
pub const REG_FIFO_TX_BASE_ADDR: u8 = 0x0E;

/// Start of the receive area in the FIFO
pub const REG_FIFO_RX_BASE_ADDR: u8 = 0x0F;

/// Start address of the last packet received
pub const REG_FIFO_RX_CURRENT_ADDR: u8 = 0x10;

/// IRQ flags (write 1 to clear)
pub const REG_IRQ_FLAGS: u8 = 0x12;

/// Number of payload bytes of the last packet received
pub const REG_RX_NB_BYTES: u8 = 0x13;

/// SNR of the last packet, signed, in quarter dB
pub const REG_PKT_SNR_VALUE: u8 = 0x19;

/// RSSI of the last packet
pub const REG_PKT_RSSI_VALUE: u8 = 0x1A;

/// Bandwidth, coding rate, implicit header mode
pub const REG_MODEM_CONFIG_1: u8 = 0x1D;

/// Spreading factor, continuous TX, CRC on
pub const REG_MODEM_CONFIG_2: u8 = 0x1E;

/// Preamble length (MSB)
pub const REG_PREAMBLE_MSB: u8 = 0x20;

/// Preamble length (LSB)
pub const REG_PREAMBLE_LSB: u8 = 0x21;

/// Payload length for transmit and implicit header receive
pub const REG_PAYLOAD_LENGTH: u8 = 0x22;

/// Low data rate optimize, AGC auto on
pub const REG_MODEM_CONFIG_3: u8 = 0x26;

/// IF frequency correction (errata 2.3)
pub const REG_IF_FREQ_2: u8 = 0x2F;

/// IF frequency correction (errata 2.3)
pub const REG_IF_FREQ_1: u8 = 0x30;

/// Detection optimize and automatic IF
pub const REG_DETECTION_OPTIMIZE: u8 = 0x31;

/// 500 kHz sensitivity optimization (errata 2.1)
pub const REG_HIGH_BW_OPTIMIZE_1: u8 = 0x36;

/// Detection threshold
pub const REG_DETECTION_THRESHOLD: u8 = 0x37;

/// 500 kHz sensitivity optimization (errata 2.1)
pub const REG_HIGH_BW_OPTIMIZE_2: u8 = 0x3A;

/// DIO0-DIO3 mapping
pub const REG_DIO_MAPPING_1: u8 = 0x40;

/// Silicon revision (read-only)
pub const REG_VERSION: u8 = 0x42;

/// High power settings of the PA_BOOST pin
pub const REG_PA_DAC: u8 = 0x4D;

// =============================================================================
// Chip Constants
// =============================================================================

/// Silicon revision reported by the SX1276/77/78/79
pub const SX127X_VERSION: u8 = 0x12;

/// Crystal oscillator frequency
pub const FXOSC_HZ: f64 = 32_000_000.0;

/// Frequency synthesizer step: FXOSC / 2^19
pub const FSTEP_HZ: f64 = FXOSC_HZ / (1u32 << 19) as f64;

/// FIFO size shared by transmit and receive
pub const FIFO_SIZE: usize = 256;

/// Largest LoRa payload
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Offset subtracted from RegPktRssiValue (HF port)
pub const RSSI_OFFSET_DB: i16 = 137;

/// PA DAC: +20 dBm on PA_BOOST
pub const PA_DAC_BOOST: u8 = 0x87;

/// PA DAC: default power on PA_BOOST
pub const PA_DAC_DEFAULT: u8 = 0x84;

/// Highest power reached without the PA boost DAC
pub const PA_STANDARD_MAX_DB: i8 = 20;

/// Power the boost DAC adds on top of the programmed level
pub const PA_BOOST_STEP_DB: i8 = 3;

/// Lowest transmit power, programmed as output power field 0
pub const PA_OUTPUT_POWER_BASE_DB: i8 = 5;

/// Detection optimize / threshold for SF6
pub const DETECTION_OPTIMIZE_SF6: u8 = 0x05;
pub const DETECTION_THRESHOLD_SF6: u8 = 0x0C;

/// Detection optimize / threshold for SF7-SF12
pub const DETECTION_OPTIMIZE_SF7_12: u8 = 0x03;
pub const DETECTION_THRESHOLD_SF7_12: u8 = 0x0A;

/// IRQ flags bits 7-4 of a good packet: RxDone and ValidHeader, no timeout, no CRC error
pub const RX_VALID_PACKET_PATTERN: u8 = 0b0101;

/// DIO0 mapping values (RegDioMapping1 bits 7-6, LoRa mode)
pub const DIO0_RX_DONE: u8 = 0b00;
pub const DIO0_TX_DONE: u8 = 0b01;

// =============================================================================
// Bit Fields
// =============================================================================

/// A bit field inside one 8-bit register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub register: u8,
    pub width: u8,
    pub offset: u8,
}

impl Field {
    pub const fn new(register: u8, width: u8, offset: u8) -> Self {
        Self {
            register,
            width,
            offset,
        }
    }
}

/// RegOpMode bits 2-0: operating mode
pub const FIELD_MODE: Field = Field::new(REG_OP_MODE, 3, 0);

/// RegOpMode bit 3: low frequency (band 2/3) register access
pub const FIELD_LOW_FREQUENCY_MODE: Field = Field::new(REG_OP_MODE, 1, 3);

/// RegOpMode bit 7: LongRangeMode, writable in Sleep only
pub const FIELD_LORA_MODE: Field = Field::new(REG_OP_MODE, 1, 7);

/// RegPaConfig bit 7: output on PA_BOOST
pub const FIELD_PA_SELECT: Field = Field::new(REG_PA_CONFIG, 1, 7);

/// RegPaConfig bits 3-0: output power
pub const FIELD_OUTPUT_POWER: Field = Field::new(REG_PA_CONFIG, 4, 0);

/// RegModemConfig1 bits 7-4: signal bandwidth
pub const FIELD_BANDWIDTH: Field = Field::new(REG_MODEM_CONFIG_1, 4, 4);

/// RegModemConfig1 bits 3-1: coding rate
pub const FIELD_CODING_RATE: Field = Field::new(REG_MODEM_CONFIG_1, 3, 1);

/// RegModemConfig1 bit 0: implicit header mode
pub const FIELD_IMPLICIT_HEADER: Field = Field::new(REG_MODEM_CONFIG_1, 1, 0);

/// RegModemConfig2 bits 7-4: spreading factor
pub const FIELD_SPREADING_FACTOR: Field = Field::new(REG_MODEM_CONFIG_2, 4, 4);

/// RegModemConfig2 bit 2: payload CRC on
pub const FIELD_CRC_ON: Field = Field::new(REG_MODEM_CONFIG_2, 1, 2);

/// RegModemConfig3 bit 2: AGC auto on
pub const FIELD_AGC_AUTO_ON: Field = Field::new(REG_MODEM_CONFIG_3, 1, 2);

/// RegDetectionOptimize bits 2-0
pub const FIELD_DETECTION_OPTIMIZE: Field = Field::new(REG_DETECTION_OPTIMIZE, 3, 0);

/// RegDetectionOptimize bit 7: automatic IF (set only for 500 kHz)
pub const FIELD_AUTOMATIC_IF: Field = Field::new(REG_DETECTION_OPTIMIZE, 1, 7);

/// RegDioMapping1 bits 7-6: DIO0 source
pub const FIELD_DIO0_MAPPING: Field = Field::new(REG_DIO_MAPPING_1, 2, 6);

/// RegIrqFlags bits 7-4: RxTimeout, RxDone, PayloadCrcError, ValidHeader
pub const FIELD_RX_IRQ_PATTERN: Field = Field::new(REG_IRQ_FLAGS, 4, 4);

// =============================================================================
// Operating Modes
// =============================================================================

/// Operating modes (RegOpMode bits 2-0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Sleep = 0,
    Standby = 1,
    /// Frequency synthesis before TX (transitional)
    FrequencySynthesisTx = 2,
    Transmit = 3,
    /// Frequency synthesis before RX (transitional)
    FrequencySynthesisRx = 4,
    ReceiveContinuous = 5,
    ReceiveSingle = 6,
    ChannelActivityDetect = 7,
}

impl OperatingMode {
    /// Decode the 3-bit mode field
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => OperatingMode::Sleep,
            1 => OperatingMode::Standby,
            2 => OperatingMode::FrequencySynthesisTx,
            3 => OperatingMode::Transmit,
            4 => OperatingMode::FrequencySynthesisRx,
            5 => OperatingMode::ReceiveContinuous,
            6 => OperatingMode::ReceiveSingle,
            _ => OperatingMode::ChannelActivityDetect,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// RegIrqFlags bits (LoRa mode)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqFlags: u8 {
        const RX_TIMEOUT = 0x80;
        const RX_DONE = 0x40;
        const PAYLOAD_CRC_ERROR = 0x20;
        const VALID_HEADER = 0x10;
        const TX_DONE = 0x08;
        const CAD_DONE = 0x04;
        const FHSS_CHANGE_CHANNEL = 0x02;
        const CAD_DETECTED = 0x01;
    }
}

// =============================================================================
// Register Names (diagnostics)
// =============================================================================

static REGISTER_NAMES: Lazy<HashMap<u8, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (REG_FIFO, "REG_FIFO"),
        (REG_OP_MODE, "REG_OP_MODE"),
        (REG_FRF_MSB, "REG_FRF_MSB"),
        (REG_FRF_MID, "REG_FRF_MID"),
        (REG_FRF_LSB, "REG_FRF_LSB"),
        (REG_PA_CONFIG, "REG_PA_CONFIG"),
        (REG_FIFO_ADDR_PTR, "REG_FIFO_ADDR_PTR"),
        (REG_FIFO_TX_BASE_ADDR, "REG_FIFO_TX_BASE_ADDR"),
        (REG_FIFO_RX_BASE_ADDR, "REG_FIFO_RX_BASE_ADDR"),
        (REG_FIFO_RX_CURRENT_ADDR, "REG_FIFO_RX_CURRENT_ADDR"),
        (REG_IRQ_FLAGS, "REG_IRQ_FLAGS"),
        (REG_RX_NB_BYTES, "REG_RX_NB_BYTES"),
        (REG_PKT_SNR_VALUE, "REG_PKT_SNR_VALUE"),
        (REG_PKT_RSSI_VALUE, "REG_PKT_RSSI_VALUE"),
        (REG_MODEM_CONFIG_1, "REG_MODEM_CONFIG_1"),
        (REG_MODEM_CONFIG_2, "REG_MODEM_CONFIG_2"),
        (REG_PREAMBLE_MSB, "REG_PREAMBLE_MSB"),
        (REG_PREAMBLE_LSB, "REG_PREAMBLE_LSB"),
        (REG_PAYLOAD_LENGTH, "REG_PAYLOAD_LENGTH"),
        (REG_MODEM_CONFIG_3, "REG_MODEM_CONFIG_3"),
        (REG_IF_FREQ_2, "REG_IF_FREQ_2"),
        (REG_IF_FREQ_1, "REG_IF_FREQ_1"),
        (REG_DETECTION_OPTIMIZE, "REG_DETECTION_OPTIMIZE"),
        (REG_HIGH_BW_OPTIMIZE_1, "REG_HIGH_BW_OPTIMIZE_1"),
        (REG_DETECTION_THRESHOLD, "REG_DETECTION_THRESHOLD"),
        (REG_HIGH_BW_OPTIMIZE_2, "REG_HIGH_BW_OPTIMIZE_2"),
        (REG_DIO_MAPPING_1, "REG_DIO_MAPPING_1"),
        (REG_VERSION, "REG_VERSION"),
        (REG_PA_DAC, "REG_PA_DAC"),
    ])
});

/// Symbolic name of a register, if it is one the driver knows
pub fn register_name(address: u8) -> Option<&'static str> {
    REGISTER_NAMES.get(&(address & 0x7F)).copied()
}

/// `"REG_OP_MODE (0x01)"` for named registers, `"0x55"` otherwise
pub fn register_label(address: u8) -> String {
    let address = address & 0x7F;
    match register_name(address) {
        Some(name) => format!("{name} (0x{address:02X})"),
        None => format!("0x{address:02X}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fstep() {
        assert_eq!(FSTEP_HZ, 61.03515625);
    }

    #[test]
    fn test_mode_bits() {
        for bits in 0..8u8 {
            assert_eq!(OperatingMode::from_bits(bits).bits(), bits);
        }
        assert_eq!(OperatingMode::from_bits(0x81), OperatingMode::Standby);
    }

    #[test]
    fn test_register_labels() {
        assert_eq!(register_name(REG_VERSION), Some("REG_VERSION"));
        assert_eq!(register_label(REG_OP_MODE), "REG_OP_MODE (0x01)");
        assert_eq!(register_label(0x55), "0x55");
        // The write flag is not part of the address
        assert_eq!(register_label(0x80 | REG_PA_DAC), "REG_PA_DAC (0x4D)");
    }

    #[test]
    fn test_valid_packet_pattern() {
        let flags = IrqFlags::RX_DONE | IrqFlags::VALID_HEADER;
        assert_eq!(flags.bits() >> 4, RX_VALID_PACKET_PATTERN);
        assert_eq!(flags.bits(), 0b0101_0000);
    }
}
