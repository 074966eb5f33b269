//! # Initialization Tests
//!
//! Bring-up of `Sx127xDriver` against the simulated chip: reset pulse, version
//! check, LoRa latch, and the register values each configuration produces.

use sx127x_rs::config::DeviceConfiguration;
use sx127x_rs::radio::hal::MockHal;
use sx127x_rs::radio::registers::*;
use sx127x_rs::{OperatingMode, Sx127xDriver, Sx127xError, ValidationError};
use tokio_test::{assert_err, assert_ok};

async fn initialized(config: DeviceConfiguration) -> (Sx127xDriver<MockHal>, MockHal) {
    let mock = MockHal::new();
    let mut driver = Sx127xDriver::new(mock.clone(), config);
    assert_ok!(driver.initialize().await);
    (driver, mock)
}

#[tokio::test]
async fn test_missing_device() {
    let mock = MockHal::with_version(0x00);
    let mut driver = Sx127xDriver::new(mock.clone(), DeviceConfiguration::default());

    let err = assert_err!(driver.initialize().await);
    assert!(matches!(err, Sx127xError::DeviceNotFound));
    assert!(err.is_fatal_init());
    assert!(!driver.is_initialized());
}

#[tokio::test]
async fn test_unsupported_version() {
    let mock = MockHal::with_version(0x13);
    let mut driver = Sx127xDriver::new(mock.clone(), DeviceConfiguration::default());

    let err = assert_err!(driver.initialize().await);
    assert!(matches!(err, Sx127xError::UnsupportedVersion(0x13)));

    // Nothing past the version read was touched
    assert!(!mock.was_written(REG_OP_MODE));
}

#[tokio::test]
async fn test_successful_init_ends_in_standby() {
    let (driver, mock) = initialized(DeviceConfiguration::default()).await;

    assert!(driver.is_initialized());
    assert_eq!(driver.mode().await.unwrap(), OperatingMode::Standby);
    // LoRa, high-frequency port, Standby
    assert_eq!(mock.register(REG_OP_MODE), 0x81);
    assert_eq!(mock.register(REG_FIFO_TX_BASE_ADDR), 0x00);
    assert_eq!(mock.register(REG_FIFO_RX_BASE_ADDR), 0x00);
}

#[tokio::test]
async fn test_low_band_keeps_low_frequency_mode() {
    let (_driver, mock) = initialized(DeviceConfiguration::default().with_frequency(433.0)).await;
    assert_eq!(mock.register(REG_OP_MODE), 0x89);
}

#[tokio::test]
async fn test_reset_pulse() {
    let (_driver, mock) = initialized(DeviceConfiguration::default().with_pins(17, 4)).await;

    assert_eq!(mock.level_history(), vec![(17, false), (17, true)]);
    assert_eq!(mock.level(17), Some(true));
}

#[tokio::test]
async fn test_lora_latch_readback_mismatch() {
    let mock = MockHal::new();
    mock.lock_register(REG_OP_MODE);
    let mut driver = Sx127xDriver::new(mock.clone(), DeviceConfiguration::default());

    let err = assert_err!(driver.initialize().await);
    match err {
        Sx127xError::ConfigurationReadbackMismatch { expected, actual } => {
            assert_eq!(expected, 0x80);
            assert_eq!(actual, 0x01);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_configuration_touches_nothing() {
    let mock = MockHal::new();
    let config = DeviceConfiguration::default().with_spreading_factor(13);
    let mut driver = Sx127xDriver::new(mock.clone(), config);

    let err = assert_err!(driver.initialize().await);
    assert!(matches!(
        err,
        Sx127xError::Validation(ValidationError::SpreadingFactor(13))
    ));
    assert_eq!(mock.bus_call_count(), 0);
    assert!(mock.level_history().is_empty());
}

#[tokio::test]
async fn test_reinitialize_after_failure() {
    let mock = MockHal::with_version(0x00);
    let mut driver = Sx127xDriver::new(mock.clone(), DeviceConfiguration::default());
    assert_err!(driver.initialize().await);

    // Module seated properly this time
    mock.set_register(REG_VERSION, SX127X_VERSION);
    assert_ok!(driver.initialize().await);
    assert_eq!(driver.version().await.unwrap(), 0x12);
}

#[tokio::test]
async fn test_operations_require_initialization() {
    let mock = MockHal::new();
    let mut driver = Sx127xDriver::new(mock.clone(), DeviceConfiguration::default());

    assert!(matches!(driver.begin_receive().await, Err(Sx127xError::NotInitialized)));
    assert!(matches!(driver.send(b"x").await, Err(Sx127xError::NotInitialized)));
    assert!(matches!(driver.mode().await, Err(Sx127xError::NotInitialized)));
    assert!(matches!(driver.standby().await, Err(Sx127xError::NotInitialized)));
    assert_ok!(driver.stop_receive().await);
    assert_eq!(mock.bus_call_count(), 0);

    // Version is readable without initialization
    assert_eq!(driver.version().await.unwrap(), 0x12);
}

#[tokio::test]
async fn test_frequency_and_bandwidth_registers() {
    let (_driver, mock) = initialized(DeviceConfiguration::default()).await;

    assert_eq!(mock.register(REG_FRF_MSB), 0xE4);
    assert_eq!(mock.register(REG_FRF_MID), 0xC0);
    assert_eq!(mock.register(REG_FRF_LSB), 0x00);
    // 125 kHz is bandwidth code 7
    assert_eq!(mock.register(REG_MODEM_CONFIG_1) >> 4, 7);
    assert_eq!(mock.register(REG_IF_FREQ_2), 0x40);
    assert_eq!(mock.register(REG_IF_FREQ_1), 0x00);
    assert_eq!(mock.register(REG_DETECTION_OPTIMIZE) & 0x80, 0);
}

#[tokio::test]
async fn test_narrow_bandwidth_errata() {
    let config = DeviceConfiguration::default()
        .with_frequency(433.0)
        .with_bandwidth(7_800);
    let (_driver, mock) = initialized(config).await;

    assert_eq!(mock.register(REG_FRF_MSB), 0x6C);
    assert_eq!(mock.register(REG_FRF_MID), 0x40);
    assert_eq!(mock.register(REG_FRF_LSB), 0x80);
    assert_eq!(mock.register(REG_MODEM_CONFIG_1) >> 4, 0);
    assert_eq!(mock.register(REG_IF_FREQ_2), 0x48);
}

#[tokio::test]
async fn test_wide_bandwidth_high_band() {
    let config = DeviceConfiguration::default()
        .with_frequency(868.0)
        .with_bandwidth(500_000);
    let (_driver, mock) = initialized(config).await;

    assert_eq!(mock.register(REG_MODEM_CONFIG_1) >> 4, 9);
    assert_eq!(mock.register(REG_DETECTION_OPTIMIZE) & 0x80, 0x80);
    assert_eq!(mock.register(REG_HIGH_BW_OPTIMIZE_1), 0x02);
    assert_eq!(mock.register(REG_HIGH_BW_OPTIMIZE_2), 0x64);
}

#[tokio::test]
async fn test_wide_bandwidth_low_band() {
    let config = DeviceConfiguration::default()
        .with_frequency(433.0)
        .with_bandwidth(500_000);
    let (_driver, mock) = initialized(config).await;

    assert_eq!(mock.register(REG_HIGH_BW_OPTIMIZE_1), 0x02);
    assert_eq!(mock.register(REG_HIGH_BW_OPTIMIZE_2), 0x7F);
}

#[tokio::test]
async fn test_wide_bandwidth_between_bands() {
    let config = DeviceConfiguration::default()
        .with_frequency(600.0)
        .with_bandwidth(500_000);
    let (_driver, mock) = initialized(config).await;

    assert_eq!(mock.register(REG_HIGH_BW_OPTIMIZE_1), 0x03);
    // Left at its reset value
    assert_eq!(mock.register(REG_HIGH_BW_OPTIMIZE_2), 0x65);
}

#[tokio::test]
async fn test_boost_power() {
    let (_driver, mock) = initialized(DeviceConfiguration::default().with_tx_power(23)).await;

    assert_eq!(mock.register(REG_PA_DAC), 0x87);
    assert_eq!(mock.register(REG_PA_CONFIG) & 0x0F, 15);
    assert_eq!(mock.register(REG_PA_CONFIG) & 0x80, 0x80);
}

#[tokio::test]
async fn test_standard_power() {
    let (_driver, mock) = initialized(DeviceConfiguration::default().with_tx_power(18)).await;

    assert_eq!(mock.register(REG_PA_DAC), 0x84);
    assert_eq!(mock.register(REG_PA_CONFIG) & 0x0F, 13);
}

#[tokio::test]
async fn test_spreading_factor_six() {
    let (_driver, mock) =
        initialized(DeviceConfiguration::default().with_spreading_factor(6)).await;

    assert_eq!(mock.register(REG_MODEM_CONFIG_2) >> 4, 6);
    assert_eq!(mock.register(REG_DETECTION_OPTIMIZE) & 0x07, 0x05);
    assert_eq!(mock.register(REG_DETECTION_THRESHOLD), 0x0C);
    assert_eq!(mock.register(REG_MODEM_CONFIG_1) & 0x01, 0x01);
}

#[tokio::test]
async fn test_spreading_factor_twelve() {
    let (_driver, mock) =
        initialized(DeviceConfiguration::default().with_spreading_factor(12)).await;

    assert_eq!(mock.register(REG_MODEM_CONFIG_2) >> 4, 12);
    assert_eq!(mock.register(REG_DETECTION_OPTIMIZE) & 0x07, 0x03);
    assert_eq!(mock.register(REG_DETECTION_THRESHOLD), 0x0A);
    assert_eq!(mock.register(REG_MODEM_CONFIG_1) & 0x01, 0x00);
}

#[tokio::test]
async fn test_modem_flags_and_preamble() {
    let mut config = DeviceConfiguration::default().with_coding_rate(8);
    config.crc_enabled = false;
    config.agc_enabled = false;
    config.preamble_length = 0x0102;
    let (_driver, mock) = initialized(config).await;

    assert_eq!((mock.register(REG_MODEM_CONFIG_1) >> 1) & 0x07, 4);
    assert_eq!(mock.register(REG_MODEM_CONFIG_2) & 0x04, 0);
    assert_eq!(mock.register(REG_MODEM_CONFIG_3) & 0x04, 0);
    assert_eq!(mock.register(REG_PREAMBLE_MSB), 0x01);
    assert_eq!(mock.register(REG_PREAMBLE_LSB), 0x02);
}

#[tokio::test]
async fn test_crc_and_agc_enabled_by_default() {
    let (_driver, mock) = initialized(DeviceConfiguration::default()).await;

    assert_eq!(mock.register(REG_MODEM_CONFIG_2) & 0x04, 0x04);
    assert_eq!(mock.register(REG_MODEM_CONFIG_3) & 0x04, 0x04);
}
