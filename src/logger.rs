//! Logging utilities with colored output.
//!
//! This module provides:
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `debug!` macro gated on the global verbose flag
//! - `WatchStatus` for single-line watch mode status messages
//!
//! # Example
//!
//! ```ignore
//! log!("build"; "compiling {} components", count);
//! debug!("watch"; "raw event: {:?}", event);
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use std::{
    io::{Write, stdout},
    sync::atomic::{AtomicBool, Ordering},
};

/// Global verbose flag (set by --verbose CLI argument)
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set verbose mode globally
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Log Macros
// ============================================================================

/// Log a message with a colored module prefix
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a debug message (only shown when --verbose is enabled)
///
/// # Usage
/// ```ignore
/// debug!("module"; "debug info: {}", value);
/// ```
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Log a message with a colored module prefix
#[inline]
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);

    let mut stdout = stdout().lock();
    execute!(stdout, Clear(ClearType::UntilNewLine)).ok();
    writeln!(stdout, "{prefix} {message}").ok();
    stdout.flush().ok();
}

/// Apply color to a module prefix based on module type
#[inline]
fn colorize_prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module {
        "serve" => prefix.bright_blue().bold().to_string(),
        "watch" | "scan" => prefix.bright_green().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Watch Status (single-line status with overwrite)
// ============================================================================

/// Get current time formatted as HH:MM:SS
fn now() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let h = (secs / 3600) % 24;
    let m = (secs / 60) % 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Status line for watch mode, overwritten in place on each update.
pub struct WatchStatus {
    wrote_line: bool,
}

impl WatchStatus {
    pub fn new() -> Self {
        Self { wrote_line: false }
    }

    /// Print an "ok" status line (build succeeded).
    pub fn ok(&mut self, message: &str) {
        self.write(&format!(
            "{} {} {}",
            now().dimmed(),
            "✓".bright_green().bold(),
            message
        ));
    }

    /// Print an error status with a detail block.
    pub fn error(&mut self, headline: &str, detail: &str) {
        self.write(&format!(
            "{} {} {}",
            now().dimmed(),
            "✗".bright_red().bold(),
            headline
        ));
        let mut out = stdout().lock();
        for line in detail.lines() {
            writeln!(out, "    {}", line.dimmed()).ok();
        }
        out.flush().ok();
        self.wrote_line = false;
    }

    fn write(&mut self, line: &str) {
        let mut out = stdout().lock();
        if self.wrote_line {
            execute!(out, cursor::MoveUp(1), Clear(ClearType::CurrentLine)).ok();
        }
        writeln!(out, "{line}").ok();
        out.flush().ok();
        self.wrote_line = true;
    }
}

impl Default for WatchStatus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_flag() {
        set_verbose(false);
        assert!(!is_verbose());
        set_verbose(true);
        assert!(is_verbose());
        set_verbose(false);
    }

    #[test]
    fn test_now_format() {
        let t = now();
        assert_eq!(t.len(), 8);
        assert_eq!(t.as_bytes()[2], b':');
        assert_eq!(t.as_bytes()[5], b':');
    }
}
