#![deny(missing_docs)]
//! Shared logging utilities for the decomp workspace.
//!
//! This crate provides the `decomp_*` logging macros used across the codebase,
//! the log target that carries mirrored job output, and a minimal test
//! initializer for the global logger.

/// Log target used when mirroring job log lines to the process output.
///
/// Kept separate from module targets so a logger can route tool output
/// independently of service diagnostics.
pub const JOB_OUTPUT_TARGET: &str = "decomp::job";

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! decomp_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! decomp_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! decomp_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! decomp_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! decomp_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Mirrors one job log line to the process output as `[job_id] line`.
#[macro_export]
macro_rules! decomp_job_line {
    ($job_id:expr, $line:expr) => {{
        log::info!(target: $crate::JOB_OUTPUT_TARGET, "[{}] {}", $job_id, $line);
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
