//! Tunable constants and construction-time configuration.
//!
//! Mirrors the teacher crate's habit of grouping protocol timings as
//! top-level `const`s rather than scattering magic numbers through the
//! modules that use them.

use std::time::Duration;

use crate::event::Source;

/// Handshake/connect timeout for a single transport session.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long to wait for the first inbound frame after connecting.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Connect attempts before a session is marked `Dead`.
pub const CONNECT_ATTEMPT_CAP: u32 = 32;

/// Minimum spacing between two outbound `set` frames on one session.
pub const UPLOAD_WAIT_TIME: Duration = Duration::from_millis(150);
/// Pacer/reconnect wakeup interval for a transport session.
pub const PACER_TICK: Duration = Duration::from_millis(25);

/// Coordination window duration for quorum echo suppression.
pub const LISTEN_TIME: Duration = Duration::from_millis(100);
/// Wakeup interval for the fan coordinator's window processor.
pub const WINDOW_TICK: Duration = Duration::from_millis(25);
/// Poll interval for `CloudClient::wait_for_upload`.
pub const UPLOAD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Change-log poll cadence.
pub const LOG_UPDATE_INTERVAL: Duration = Duration::from_millis(100);
/// Anti-starvation guard: only poll while the transport side was active
/// this recently.
pub const LOG_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
/// Page size used for every change-log fetch.
pub const LOG_FETCH_LIMIT: u32 = 25;

/// Login attempts before giving up (non-403 failures only).
pub const LOGIN_ATTEMPT_CAP: u32 = 32;
/// Both activity clocks must be idle this long before the supervisor
/// rebuilds the whole session.
pub const IDLE_RECONNECT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
/// Watchdog wakeup interval.
pub const WATCHDOG_TICK: Duration = Duration::from_secs(30);

pub const DEFAULT_CONNECTIONS: usize = 10;

pub const TRANSPORT_URL: &str = "wss://clouddata.scratch.mit.edu";
pub const CHANGE_LOG_URL: &str = "https://clouddata.scratch.mit.edu/logs";
pub const LOGIN_URL: &str = "https://scratch.mit.edu/login/";

/// Construction-time knobs for [`crate::CloudClient`].
///
/// Follows the teacher pack's builder-config idiom (see the wider
/// example pool's `DhanFeedConfig`/`DhanFeedManagerBuilder`) adapted to
/// this crate's plain-struct-with-`with_*`-methods style.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Number of parallel transport sessions in the fan. Default 10.
    pub connections: usize,
    /// Listen mode assigned to variables observed for the first time.
    pub default_listen_mode: Source,
    pub transport_url: String,
    pub change_log_url: String,
    pub login_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connections: DEFAULT_CONNECTIONS,
            default_listen_mode: Source::ChangeLog,
            transport_url: TRANSPORT_URL.to_string(),
            change_log_url: CHANGE_LOG_URL.to_string(),
            login_url: LOGIN_URL.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_connections(mut self, n: usize) -> Self {
        self.connections = n.max(1);
        self
    }

    pub fn with_default_listen_mode(mut self, mode: Source) -> Self {
        self.default_listen_mode = mode;
        self
    }

    /// Override the transport URL. Only meaningful for tests against a
    /// local mock server.
    pub fn with_transport_url(mut self, url: impl Into<String>) -> Self {
        self.transport_url = url.into();
        self
    }

    pub fn with_change_log_url(mut self, url: impl Into<String>) -> Self {
        self.change_log_url = url.into();
        self
    }

    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = url.into();
        self
    }
}
