//! # Utility Modules
//!
//! Small helpers shared by the radio driver: rate-limited logging and payload
//! hex formatting for debug output.

pub mod logging;

pub use logging::{format_hex_compact, log_payload_hex, LogThrottle};
