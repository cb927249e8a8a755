// Level-based logging infrastructure
//
// This is used from multiple threads, so it needs to be stateless.

// DVZ_LOG_LEVEL=0..5 per the external interface: trace, debug, info, warn,
// error, fatal. Numerically higher means more severe, matching the env var
// contract (not the teacher's original critical-is-0 scheme).
#[allow(dead_code, non_camel_case_types)]
pub enum LogLevel {
    trace,
    debug,
    info,
    warn,
    error,
    fatal,
}

impl LogLevel {
    pub fn get_name(&self) -> &'static str {
        match self {
            LogLevel::trace => "trace",
            LogLevel::debug => "debug",
            LogLevel::info => "info",
            LogLevel::warn => "warn",
            LogLevel::error => "error",
            LogLevel::fatal => "fatal",
        }
    }

    pub fn get_level(&self) -> u32 {
        match self {
            LogLevel::trace => 0,
            LogLevel::debug => 1,
            LogLevel::info => 2,
            LogLevel::warn => 3,
            LogLevel::error => 4,
            LogLevel::fatal => 5,
        }
    }
}

#[macro_export]
macro_rules! trace {
    ($($format_args:tt)+) => {{
        $crate::log_internal!($crate::logging::LogLevel::trace, $($format_args)+)
    }};
}

#[macro_export]
macro_rules! debug {
    ($($format_args:tt)+) => {{
        $crate::log_internal!($crate::logging::LogLevel::debug, $($format_args)+)
    }};
}

#[macro_export]
macro_rules! info {
    ($($format_args:tt)+) => {{
        $crate::log_internal!($crate::logging::LogLevel::info, $($format_args)+)
    }};
}

#[macro_export]
macro_rules! warn {
    ($($format_args:tt)+) => {{
        $crate::log_internal!($crate::logging::LogLevel::warn, $($format_args)+)
    }};
}

// error and fatal are always emitted, regardless of DVZ_LOG_LEVEL
#[macro_export]
macro_rules! error {
    ($($format_args:tt)+) => {{
        $crate::log_internal!($crate::logging::LogLevel::error, $($format_args)+)
    }};
}

#[macro_export]
macro_rules! fatal {
    ($($format_args:tt)+) => {{
        $crate::log_internal!($crate::logging::LogLevel::fatal, $($format_args)+)
    }};
}

#[allow(unused_macros)]
#[macro_export]
macro_rules! log_internal {
    ($loglevel:expr, $($format_args:tt)+) => ({
        lazy_static::lazy_static! {
            // absent DVZ_LOG_LEVEL, only error/fatal are shown
            static ref DEFAULT_THRESHOLD: u32 = $crate::logging::LogLevel::error.get_level();

            static ref THRESHOLD: u32 = match std::env::var("DVZ_LOG_LEVEL") {
                Ok(val) => match val.trim().parse::<u32>() {
                    Ok(n) if n <= 5 => n,
                    _ => *DEFAULT_THRESHOLD,
                },
                Err(_) => *DEFAULT_THRESHOLD,
            };
        }

        let level = $loglevel;
        // error/fatal are always emitted regardless of the configured threshold
        let is_always_on = level.get_level() >= $crate::logging::LogLevel::error.get_level();
        let should_log = is_always_on || level.get_level() >= *THRESHOLD;

        if should_log {
            eprintln!(
                "[{}]<{}> {}:{} - {}",
                $crate::timing::get_current_millis(),
                level.get_name(),
                file!(),
                line!(),
                format!($($format_args)+)
            );
        }
    })
}
