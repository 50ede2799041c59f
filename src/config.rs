//! Behavior of a session that is not part of any particular test.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionOptions {
    /// Query the error queue after every command.
    pub check_errors: bool,
    /// Fail the operation when the error queue reports an error, instead of logging it.
    pub errors_fatal: bool,
    /// Send `*RST` before discovering modules.
    pub reset: bool,
    /// Delay between completion polls.
    pub poll_interval: Duration,
    /// Give up waiting for completion after this long.
    pub timeout: Option<Duration>,
    /// Attempts at reading back a spot measurement before giving up.
    pub read_attempts: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            check_errors: true,
            errors_fatal: false,
            reset: false,
            poll_interval: Duration::ZERO,
            timeout: None,
            read_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RunOptions {
    /// Block until the instrument reports completion.
    pub wait: bool,
    /// Read back the measured data after completion.
    pub auto_read: bool,
    /// Resend global configuration even if it matches what was last applied.
    pub force_new_setup: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            wait: true,
            auto_read: true,
            force_new_setup: false,
        }
    }
}
