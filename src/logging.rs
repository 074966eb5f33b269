use log::LevelFilter;

/// Initializes the logger with the `env_logger` crate.
///
/// Honors `RUST_LOG`. Calling it more than once is harmless, which lets every
/// test binary call it from each test.
pub fn init_logger() {
    let _ = env_logger::try_init();
}

/// Initializes `env_logger` with a fixed default level, still overridable by `RUST_LOG`.
///
/// # Examples
/// ```rust,no_run
/// use sx127x_rs::logging::init_logger_with_level;
///
/// // Register traces from diagnostic mode are emitted at debug level
/// init_logger_with_level(log::LevelFilter::Debug);
/// ```
pub fn init_logger_with_level(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}
