// Fixed runtime settings. The program takes no flags and reads no
// environment; everything the user decides goes through the prompts.

use std::time::Duration;

/// Heartbeat interval keeping the server session alive while idle.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Initial value shown in the host prompt.
    pub default_host: Option<String>,
    pub keep_alive: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_host: None,
            keep_alive: KEEP_ALIVE_INTERVAL,
        }
    }
}
