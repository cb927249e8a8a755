// Small timing helpers shared by the logger and the frame timing ring buffer.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, used to prefix log lines.
pub fn get_current_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis()
}

/// Microseconds since the Unix epoch, used for frame timing samples where
/// millisecond resolution would hide most of the signal.
pub fn get_current_micros() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_micros()
}

/// Seconds since the Unix epoch as a float, used by the gesture interpreter
/// which reasons about delays in fractional seconds (click-max-delay = 0.25s).
pub fn get_current_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs_f64()
}
