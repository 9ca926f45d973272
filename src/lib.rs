/*!
 * uplink-warden - connectivity watchdog for a home or small-office uplink
 *
 * Periodically checks that the internet is reachable and, when it stays down,
 * power-cycles the modem through a network relay:
 * - bounded retry loop with a wall-clock budget
 * - sliding-window rate limit on physical reboots
 * - operator snooze, master switch and manual reboot
 * - SMS notifications on every state transition
 * - rotating log file plus a 200-entry in-memory history
 *
 * The state machine lives in `warden-sentinel`; this crate adds settings,
 * logging, the operator surface and the CLI.
 */

pub mod config;
pub mod control;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::SettingsFile;
pub use control::{Watchdog, WatchdogStatus};
pub use error::{Result, WardenError};
pub use logging::{LogRecord, LogSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
