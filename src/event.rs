//! Caller-visible event and ingress-source types.
//!
//! Grounded on `scratchcloud::CloudEvent`/`CloudClient::ListenMode` from
//! `examples/original_source` — reimplemented as plain owned data instead
//! of the original's `spimpl` pimpl wrapper.

use std::fmt;

/// Which ingress path produced (or should produce) an event for a
/// variable. Doubles as the per-variable listen mode selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Read via the polled change-log HTTP endpoint. Slower, but carries
    /// setter identity. Default.
    ChangeLog,
    /// Read via the real-time transport fan. Faster, anonymous.
    Transport,
}

impl Default for Source {
    fn default() -> Self {
        Source::ChangeLog
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::ChangeLog => write!(f, "change-log"),
            Source::Transport => write!(f, "transport"),
        }
    }
}

/// A variable update delivered to a caller's subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableChanged {
    pub source: Source,
    /// Setter identity. Only meaningful when `source == ChangeLog`; empty
    /// under `Transport`.
    pub user: String,
    pub name: String,
    pub value: String,
}

impl VariableChanged {
    /// Reads the setter identity, logging a diagnostic if the source
    /// doesn't carry one (mirrors `CloudEvent::user()`'s stderr warning
    /// in the original when called under `Websockets`/`Transport` mode).
    pub fn user(&self) -> &str {
        if self.source == Source::Transport {
            log::warn!(
                "[EVENT] setter identity requested for '{}' under Transport mode; \
                 use ChangeLog mode to read the setter username",
                self.name
            );
        }
        &self.user
    }
}
