//! The public facade: `CloudClient`.
//!
//! Grounded on the teacher's top-level `AsyncElectrumClient`: a thin
//! `Arc`-wrapped handle whose methods delegate to the background
//! supervisor/coordinator/state, never holding a lock across an
//! `.await` and never blocking the caller longer than a documented
//! poll.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::event::{Source, VariableChanged};
use crate::state::CoreState;
use crate::subscribe::{Callback, SubscriberRegistry, SubscriptionHandle};
use crate::supervisor::Supervisor;

struct ClientInner {
    state: Arc<CoreState>,
    subscribers: Arc<SubscriberRegistry>,
    supervisor: Arc<Supervisor>,
}

/// A handle to one Scratch project's cloud variables. Cheap to clone
/// (an `Arc` underneath); every method is safe to call concurrently
/// from multiple tasks.
#[derive(Clone)]
pub struct CloudClient {
    inner: Arc<ClientInner>,
}

impl CloudClient {
    /// Logs in, builds the transport fan, and starts the change-log
    /// poller and idle watchdog. Returns immediately; use
    /// `login_successful()`/`connected()` to observe boot progress.
    pub async fn connect(
        username: impl Into<String>,
        password: impl Into<String>,
        project_id: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        let state = Arc::new(CoreState::new(config.default_listen_mode));
        let subscribers = Arc::new(SubscriberRegistry::new());
        let supervisor = Supervisor::new(
            config,
            username.into(),
            password.into(),
            project_id.into(),
            Arc::clone(&state),
            Arc::clone(&subscribers),
        );
        supervisor.spawn_boot();

        Self {
            inner: Arc::new(ClientInner {
                state,
                subscribers,
                supervisor,
            }),
        }
    }

    pub fn login_successful(&self) -> bool {
        self.inner.supervisor.logged_in()
    }

    pub async fn connected(&self) -> bool {
        self.inner.supervisor.connected().await
    }

    /// Current value, or the empty-string sentinel if `name` has never
    /// been observed.
    pub fn get_variable(&self, name: &str) -> String {
        self.inner.state.get_variable(name)
    }

    /// Enqueues a wire `set` and writes the local store immediately
    /// (optimistic write; see `state::CoreState::set_variable_local`).
    pub async fn set_variable(&self, name: &str, value: &str) {
        self.inner.state.set_variable_local(name, value);
        if let Some(coordinator) = self.inner.supervisor.coordinator().await {
            coordinator.set(name, value);
        } else {
            log::warn!("[CLIENT] set_variable('{name}') called before the fan is built");
        }
    }

    /// Blocks until every transport session's outbound queue has
    /// drained.
    pub async fn wait_for_upload(&self) {
        if let Some(coordinator) = self.inner.supervisor.coordinator().await {
            coordinator.wait_for_upload().await;
        }
    }

    pub fn set_listen_mode(&self, mode: Source) {
        self.inner.state.set_default_listen_mode(mode);
    }

    pub fn set_variable_listen_mode(&self, name: &str, mode: Source) {
        self.inner.state.set_variable_listen_mode(name, mode);
    }

    /// Registers a callback invoked on every accepted `VariableChanged`
    /// event. The callback runs outside the coordination lock and may
    /// legally call back into this client's other methods.
    pub fn on_variable_set(&self, callback: Callback) -> SubscriptionHandle {
        self.inner.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.inner.subscribers.unsubscribe(handle);
    }

    /// Stops the background tasks driving this client. The client
    /// remains constructible again only via a fresh `connect`.
    pub async fn shutdown(&self) {
        self.inner.supervisor.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn set_variable_is_readable_immediately_even_without_a_built_fan() {
        let state = Arc::new(CoreState::new(Source::ChangeLog));
        let subscribers = Arc::new(SubscriberRegistry::new());
        let supervisor = Supervisor::new(
            ClientConfig::default(),
            "user".to_string(),
            "pass".to_string(),
            "1".to_string(),
            Arc::clone(&state),
            Arc::clone(&subscribers),
        );
        let client = CloudClient {
            inner: Arc::new(ClientInner {
                state,
                subscribers,
                supervisor,
            }),
        };

        client.set_variable("score", "10").await;
        assert_eq!(client.get_variable("score"), "10");
    }
}
