//! # Logging Utilities
//!
//! Rate limiting for log messages triggered by radio events, and bounded hex
//! dumps of payloads for debug output.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use sx127x_rs::util::logging::LogThrottle;
//!
//! // At most 5 messages per second
//! let mut throttle = LogThrottle::new(Duration::from_secs(1), 5);
//! if throttle.allow() {
//!     log::warn!("CRC error on received packet");
//! }
//! ```

use std::time::{Duration, Instant};

/// Longest payload prefix rendered by [`log_payload_hex`]
const MAX_LOG_BYTES: usize = 32;

/// Throttling structure for rate-limiting log messages
///
/// A noisy channel can raise receive interrupts far faster than anyone wants to
/// read about them; the throttle caps how many messages get through per window
/// and counts the rest.
#[derive(Debug)]
pub struct LogThrottle {
    /// Length of one throttling window
    window: Duration,
    /// Maximum messages allowed per window
    cap: u32,
    /// Messages seen in the current window
    count: u32,
    /// Messages suppressed since the throttle was created
    suppressed: u64,
    /// Start of the current window
    t0: Instant,
}

impl LogThrottle {
    /// Create new throttle with time window and message cap
    pub fn new(window: Duration, cap: u32) -> Self {
        Self {
            window,
            cap,
            count: 0,
            suppressed: 0,
            t0: Instant::now(),
        }
    }

    /// Check if logging is allowed (resets counter after window expires)
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.t0) > self.window {
            self.t0 = now;
            self.count = 0;
        }

        self.count = self.count.saturating_add(1);
        if self.count <= self.cap {
            true
        } else {
            self.suppressed += 1;
            false
        }
    }

    /// Number of messages dropped so far
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

/// Format bytes as compact uppercase hex (`"0A1B2C"`)
pub fn format_hex_compact(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Log payload bytes at debug level, truncated to a bounded prefix
pub fn log_payload_hex(prefix: &str, data: &[u8]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }

    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!("{prefix}: {}{suffix}", format_hex_compact(shown));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_caps_messages_per_window() {
        let mut throttle = LogThrottle::new(Duration::from_secs(60), 3);

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());
        assert!(!throttle.allow());
        assert_eq!(throttle.suppressed(), 2);
    }

    #[test]
    fn test_throttle_window_reset() {
        let mut throttle = LogThrottle::new(Duration::from_millis(1), 1);

        assert!(throttle.allow());
        assert!(!throttle.allow());
        std::thread::sleep(Duration::from_millis(5));
        assert!(throttle.allow());
    }

    #[test]
    fn test_format_hex_compact() {
        assert_eq!(format_hex_compact(&[]), "");
        assert_eq!(format_hex_compact(&[0x0A, 0xFF, 0x00]), "0AFF00");
        assert_eq!(format_hex_compact(&[0xde, 0xad, 0xbe, 0xef]), "DEADBEEF");
    }
}
