//! # Carrier Frequency and Bandwidth Planning
//!
//! Converts a carrier frequency and signal bandwidth into register values, and
//! applies the SX1276/77/78 errata that depend on them:
//!
//! - **2.1 Sensitivity optimization with a 500 kHz bandwidth**: RegHighBwOptimize1/2
//!   depend on the band the carrier sits in.
//! - **2.3 Receiver spurious reception**: below 500 kHz the automatic IF is turned
//!   off and RegIfFreq2/1 get a bandwidth-specific correction; below 62.5 kHz the
//!   carrier is shifted up by one bandwidth.

use crate::error::Sx127xError;
use crate::radio::bus::RegisterBus;
use crate::radio::hal::Hal;
use crate::radio::registers::*;
use log::debug;

/// Supported LoRa bandwidths in Hz, ascending. The position is the RegModemConfig1
/// bandwidth code.
pub const BANDWIDTH_TABLE_HZ: [u32; 9] = [
    7_800, 10_400, 15_600, 20_800, 31_250, 41_700, 62_500, 125_000, 250_000,
];

/// Index selected when no table entry is wide enough (500 kHz, code 9)
pub const BANDWIDTH_WIDE_INDEX: usize = BANDWIDTH_TABLE_HZ.len();

/// Bandwidth used for the wide index
pub const BANDWIDTH_WIDE_HZ: u32 = 500_000;

/// Bandwidths below this get the carrier offset of errata 2.3
pub const NARROW_BANDWIDTH_LIMIT_HZ: u32 = 62_500;

/// RegIfFreq2 value per bandwidth index (errata 2.3); RegIfFreq1 is always 0x00
pub const IF_FREQ_2_TABLE: [u8; 9] = [0x48, 0x44, 0x44, 0x44, 0x44, 0x44, 0x40, 0x40, 0x40];

/// RegIfFreq1 value below 500 kHz (errata 2.3)
pub const IF_FREQ_1_VALUE: u8 = 0x00;

/// Carriers at or above this frequency use the band 1 (862-1020 MHz) optimization
pub const HIGH_BAND_MIN_MHZ: f64 = 862.0;

/// Carriers at or below this frequency use the band 2/3 (410-525 MHz) optimization
pub const LOW_BAND_MAX_MHZ: f64 = 525.0;

/// RegHighBwOptimize1 with 500 kHz optimization enabled (errata 2.1)
pub const HIGH_BW_OPTIMIZE_1_ON: u8 = 0x02;

/// RegHighBwOptimize1 without optimization (errata 2.1)
pub const HIGH_BW_OPTIMIZE_1_OFF: u8 = 0x03;

/// RegHighBwOptimize2 for 862-1020 MHz (errata 2.1)
pub const HIGH_BW_OPTIMIZE_2_HIGH_BAND: u8 = 0x64;

/// RegHighBwOptimize2 for 410-525 MHz (errata 2.1)
pub const HIGH_BW_OPTIMIZE_2_LOW_BAND: u8 = 0x7F;

/// Frf register bytes (MSB, MID, LSB) for a carrier frequency.
///
/// Bandwidths below 62.5 kHz shift the carrier up by one bandwidth (errata 2.3).
pub fn compute_frequency_registers(frequency_mhz: f64, bandwidth_hz: u32) -> (u8, u8, u8) {
    let mut frequency_hz = frequency_mhz * 1_000_000.0;
    if bandwidth_hz < NARROW_BANDWIDTH_LIMIT_HZ {
        frequency_hz += bandwidth_hz as f64;
    }

    let frf = ((frequency_hz / FSTEP_HZ).round() as u32) & 0x00FF_FFFF;
    ((frf >> 16) as u8, (frf >> 8) as u8, frf as u8)
}

/// Carrier frequency in Hz encoded by three Frf register bytes
pub fn decode_frequency_registers(msb: u8, mid: u8, lsb: u8) -> f64 {
    let frf = ((msb as u32) << 16) | ((mid as u32) << 8) | lsb as u32;
    frf as f64 * FSTEP_HZ
}

/// Smallest table bandwidth ≥ `bandwidth_hz`, or [`BANDWIDTH_WIDE_INDEX`]
pub fn select_bandwidth_index(bandwidth_hz: u32) -> usize {
    BANDWIDTH_TABLE_HZ
        .iter()
        .position(|&bw| bw >= bandwidth_hz)
        .unwrap_or(BANDWIDTH_WIDE_INDEX)
}

/// Bandwidth in Hz a table index stands for
pub fn bandwidth_for_index(index: usize) -> u32 {
    BANDWIDTH_TABLE_HZ
        .get(index)
        .copied()
        .unwrap_or(BANDWIDTH_WIDE_HZ)
}

/// Program carrier frequency, bandwidth and the errata registers that depend on them.
///
/// Returns the bandwidth index that was programmed.
pub fn apply<H: Hal>(
    bus: &mut RegisterBus<H>,
    frequency_mhz: f64,
    bandwidth_hz: u32,
) -> Result<usize, Sx127xError> {
    let (msb, mid, lsb) = compute_frequency_registers(frequency_mhz, bandwidth_hz);
    bus.write_register(REG_FRF_MSB, msb)?;
    bus.write_register(REG_FRF_MID, mid)?;
    bus.write_register(REG_FRF_LSB, lsb)?;

    let index = select_bandwidth_index(bandwidth_hz);
    bus.write(FIELD_BANDWIDTH, index as u8)?;

    if let Some(&if_freq_2) = IF_FREQ_2_TABLE.get(index) {
        bus.write_register(REG_IF_FREQ_2, if_freq_2)?;
        bus.write_register(REG_IF_FREQ_1, IF_FREQ_1_VALUE)?;
        bus.write(FIELD_AUTOMATIC_IF, 0)?;
    } else {
        bus.write(FIELD_AUTOMATIC_IF, 1)?;
        if frequency_mhz >= HIGH_BAND_MIN_MHZ {
            bus.write_register(REG_HIGH_BW_OPTIMIZE_1, HIGH_BW_OPTIMIZE_1_ON)?;
            bus.write_register(REG_HIGH_BW_OPTIMIZE_2, HIGH_BW_OPTIMIZE_2_HIGH_BAND)?;
        } else if frequency_mhz <= LOW_BAND_MAX_MHZ {
            bus.write_register(REG_HIGH_BW_OPTIMIZE_1, HIGH_BW_OPTIMIZE_1_ON)?;
            bus.write_register(REG_HIGH_BW_OPTIMIZE_2, HIGH_BW_OPTIMIZE_2_LOW_BAND)?;
        } else {
            bus.write_register(REG_HIGH_BW_OPTIMIZE_1, HIGH_BW_OPTIMIZE_1_OFF)?;
        }
    }

    debug!(
        "Frequency set to {:.4} MHz (Frf 0x{:02X}{:02X}{:02X}), bandwidth {} Hz (index {})",
        frequency_mhz,
        msb,
        mid,
        lsb,
        bandwidth_for_index(index),
        index
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_entries_select_their_index() {
        for (index, &bw) in BANDWIDTH_TABLE_HZ.iter().enumerate() {
            assert_eq!(select_bandwidth_index(bw), index);
        }
    }

    #[test]
    fn test_bandwidth_rounds_up() {
        assert_eq!(select_bandwidth_index(0), 0);
        assert_eq!(select_bandwidth_index(7_801), 1);
        assert_eq!(select_bandwidth_index(100_000), 7);
        assert_eq!(select_bandwidth_index(250_001), BANDWIDTH_WIDE_INDEX);
        assert_eq!(select_bandwidth_index(500_000), BANDWIDTH_WIDE_INDEX);
        assert_eq!(bandwidth_for_index(BANDWIDTH_WIDE_INDEX), 500_000);
    }

    #[test]
    fn test_known_frequencies() {
        assert_eq!(compute_frequency_registers(915.0, 125_000), (0xE4, 0xC0, 0x00));
        assert_eq!(compute_frequency_registers(868.0, 500_000), (0xD9, 0x00, 0x00));
        assert_eq!(compute_frequency_registers(433.0, 500_000), (0x6C, 0x40, 0x00));
    }

    #[test]
    fn test_narrow_bandwidth_offsets_carrier() {
        // 433 MHz + 7.8 kHz
        assert_eq!(compute_frequency_registers(433.0, 7_800), (0x6C, 0x40, 0x80));

        let (msb, mid, lsb) = compute_frequency_registers(868.1, 41_700);
        let encoded = decode_frequency_registers(msb, mid, lsb);
        assert!((encoded - (868_100_000.0 + 41_700.0)).abs() <= FSTEP_HZ);

        // 62.5 kHz is not narrow
        let (msb, mid, lsb) = compute_frequency_registers(868.1, 62_500);
        let encoded = decode_frequency_registers(msb, mid, lsb);
        assert!((encoded - 868_100_000.0).abs() <= FSTEP_HZ);
    }
}
