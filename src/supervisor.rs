//! The Session Supervisor (spec.md §4.5).
//!
//! Owns the boot sequence, the idle watchdog, and shutdown. Grounded on
//! the teacher's `runtime/orchestrator.rs`: a top-level task that owns
//! the lifecycle of the lower-level workers and reacts to their health
//! rather than driving protocol logic itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::config::{self, ClientConfig};
use crate::fan::FanCoordinator;
use crate::login::{self, LoginError};
use crate::poller::ChangeLogPoller;
use crate::state::CoreState;
use crate::subscribe::SubscriberRegistry;

struct Credentials {
    username: String,
    password: String,
    project_id: String,
}

struct Live {
    coordinator: Arc<FanCoordinator>,
    window_task: JoinHandle<()>,
    poller_task: JoinHandle<()>,
}

/// Boots the session, owns the watchdog, and can tear down and rebuild
/// the Fan Coordinator and Poller without disturbing the caller's
/// subscriber registrations or the coordination state.
pub struct Supervisor {
    http: reqwest::Client,
    config: ClientConfig,
    credentials: Credentials,
    state: Arc<CoreState>,
    subscribers: Arc<SubscriberRegistry>,
    logged_in: AtomicBool,
    session_id: AsyncMutex<String>,
    /// Stashed on successful login per spec.md §3/§4.5. Not read
    /// elsewhere yet, but the session-state model calls for it
    /// alongside `session_id`.
    auth_token: AsyncMutex<String>,
    live: AsyncMutex<Option<Live>>,
}

impl Supervisor {
    pub fn new(
        config: ClientConfig,
        username: String,
        password: String,
        project_id: String,
        state: Arc<CoreState>,
        subscribers: Arc<SubscriberRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            http: reqwest::Client::new(),
            config,
            credentials: Credentials {
                username,
                password,
                project_id,
            },
            state,
            subscribers,
            logged_in: AtomicBool::new(false),
            session_id: AsyncMutex::new(String::new()),
            auth_token: AsyncMutex::new(String::new()),
            live: AsyncMutex::new(None),
        })
    }

    pub fn logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    /// The auth token stashed by the most recent successful login.
    /// Empty before the first login completes.
    pub async fn auth_token(&self) -> String {
        self.auth_token.lock().await.clone()
    }

    pub async fn connected(&self) -> bool {
        match self.live.lock().await.as_ref() {
            Some(live) => live.coordinator.session_count() > 0,
            None => false,
        }
    }

    pub async fn coordinator(&self) -> Option<Arc<FanCoordinator>> {
        self.live.lock().await.as_ref().map(|l| Arc::clone(&l.coordinator))
    }

    /// Boot sequence: login (terminal on 403, bounded retry otherwise),
    /// then build the fan and start the poller. Also spawns the idle
    /// watchdog task. Consumes `self` into a background task; callers
    /// should hold the returned `Arc<Supervisor>` and poll
    /// `logged_in()`/`connected()`.
    pub fn spawn_boot(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if this.login_with_retry().await {
                this.rebuild().await;
                this.spawn_watchdog();
            }
        });
    }

    async fn login_with_retry(self: &Arc<Self>) -> bool {
        for attempt in 1..=config::LOGIN_ATTEMPT_CAP {
            match login::attempt(
                &self.http,
                &self.config.login_url,
                &self.credentials.username,
                &self.credentials.password,
            )
            .await
            {
                Ok(result) => {
                    *self.session_id.lock().await = result.session_id;
                    *self.auth_token.lock().await = result.auth_token;
                    self.logged_in.store(true, Ordering::SeqCst);
                    log::info!("[SUPERVISOR] login succeeded");
                    return true;
                }
                Err(LoginError::Forbidden) => {
                    log::error!("[SUPERVISOR] login rejected, credentials invalid");
                    return false;
                }
                Err(LoginError::Other(e)) => {
                    log::warn!(
                        "[SUPERVISOR] login attempt {attempt} of {} failed: {e}",
                        config::LOGIN_ATTEMPT_CAP
                    );
                }
            }
        }
        log::error!("[SUPERVISOR] exhausted login attempts");
        false
    }

    /// Tears down any existing Fan Coordinator/Poller and builds fresh
    /// ones. Subscriber registrations live on `self.subscribers` and are
    /// untouched.
    async fn rebuild(self: &Arc<Self>) {
        let mut live = self.live.lock().await;
        if let Some(old) = live.take() {
            old.window_task.abort();
            old.poller_task.abort();
            old.coordinator.shutdown();
        }

        let session_id = self.session_id.lock().await.clone();
        let coordinator = loop {
            match FanCoordinator::build(
                &self.config,
                &self.credentials.username,
                &session_id,
                &self.credentials.project_id,
                Arc::clone(&self.state),
            )
            .await
            {
                Ok(c) => break Arc::new(c),
                Err(e) => {
                    log::warn!("[SUPERVISOR] fan build failed, retrying: {e}");
                }
            }
        };

        let window_task = coordinator.spawn_window_task(Arc::clone(&self.subscribers));

        let poller = ChangeLogPoller::new(
            self.http.clone(),
            self.config.change_log_url.clone(),
            self.credentials.project_id.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.subscribers),
        );
        let poller_task = tokio::spawn(poller.run());

        *live = Some(Live {
            coordinator,
            window_task,
            poller_task,
        });
    }

    fn spawn_watchdog(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config::WATCHDOG_TICK);
            loop {
                ticker.tick().await;
                let idle = this.state.transport_idle_for() >= config::IDLE_RECONNECT_TIMEOUT
                    && this.state.upload_idle_for() >= config::IDLE_RECONNECT_TIMEOUT;
                if !idle {
                    continue;
                }
                log::warn!("[SUPERVISOR] both activity clocks idle past threshold, reconnecting");
                this.logged_in.store(false, Ordering::SeqCst);
                if this.login_with_retry().await {
                    this.rebuild().await;
                }
            }
        });
    }

    /// Stops the window processor and poller tasks. The login state and
    /// coordination lock are left intact (a subsequent `spawn_boot`
    /// rebuilds from scratch if needed).
    pub async fn shutdown(&self) {
        let mut live = self.live.lock().await;
        if let Some(live) = live.take() {
            live.window_task.abort();
            live.poller_task.abort();
            live.coordinator.shutdown();
        }
    }
}
