//! Process-wide state and cancellation primitives.

mod cancel;
mod diag;
mod state;

pub use cancel::CancelToken;
pub use diag::{Diagnostic, Severity};
pub use state::{
    is_healthy, is_serving, is_shutdown, register_server, request_shutdown, set_healthy,
    set_serving, setup_shutdown_handler,
};

/// Exit code for invalid configuration.
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for port binding failure.
pub const EXIT_BIND: i32 = 3;
/// Exit code after an interrupt-initiated shutdown.
pub const EXIT_INTERRUPTED: i32 = 130;
