use std::time::Duration;

// Delay between connecting to the gateway and announcing the room join
pub const JOIN_GRACE: Duration = Duration::from_millis(100);
// A remote typing indicator goes away TYPING_EXPIRY after its last refresh
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);
// The local participant is considered done typing TYPING_IDLE after its last keystroke
pub const TYPING_IDLE: Duration = Duration::from_secs(2);
// Max creation date distance for a server comment to supersede a local one with same text
pub const COALESCING_WINDOW: Duration = Duration::from_secs(5);
// Pings will be sent every PING_INTERVAL
pub const PING_INTERVAL: Duration = Duration::from_secs(10);
// If no pong was received for PONG_TIMEOUT, reconnect
pub const PONG_TIMEOUT: Duration = Duration::from_secs(20);
// Space each reconnect attempt by RECONNECT_SPACING
pub const RECONNECT_SPACING: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub join_grace: Duration,
    pub typing_expiry: Duration,
    pub typing_idle: Duration,
    pub coalescing_window: Duration,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub reconnect_spacing: Duration,

    /// Refetch the whole discussion when the gateway connection comes back, as deltas may have
    /// been missed in between
    pub refresh_on_reconnect: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            join_grace: JOIN_GRACE,
            typing_expiry: TYPING_EXPIRY,
            typing_idle: TYPING_IDLE,
            coalescing_window: COALESCING_WINDOW,
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
            reconnect_spacing: RECONNECT_SPACING,
            refresh_on_reconnect: true,
        }
    }
}

impl Config {
    pub fn coalescing_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.coalescing_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(5))
    }
}
