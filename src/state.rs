//! The single coordination lock.
//!
//! spec.md §5 requires one lock guarding the variable store, the
//! per-variable listen-mode map, per-session accumulation vectors, the
//! quorum window clock/flag, and the two activity clocks — with short
//! hold times and subscriber callbacks always invoked after releasing
//! it. `CoreState` is that lock, grounded on the teacher's
//! `Arc<Mutex<SharedState>>` pattern (`async_client/client.rs`,
//! `asynchronous/adapter.rs`) generalized from "one struct per transport
//! connection" to "one struct shared by the whole client".

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::event::{Source, VariableChanged};

struct Inner {
    store: HashMap<String, String>,
    listen_modes: HashMap<String, Source>,
    default_mode: Source,
    accum: HashMap<usize, Vec<(String, String)>>,
    listening: bool,
    listen_start: Instant,
    last_transport_activity: Instant,
    last_upload: Instant,
}

pub struct CoreState {
    inner: Mutex<Inner>,
}

impl CoreState {
    pub fn new(default_mode: Source) -> Self {
        let now = Instant::now();
        Self {
            inner: Mutex::new(Inner {
                store: HashMap::new(),
                listen_modes: HashMap::new(),
                default_mode,
                accum: HashMap::new(),
                listening: false,
                listen_start: now,
                last_transport_activity: now,
                last_upload: now,
            }),
        }
    }

    // ---- variable store -------------------------------------------------

    /// Returns the current value, or the empty-string sentinel (with a
    /// diagnostic) if `name` has never been observed.
    pub fn get_variable(&self, name: &str) -> String {
        let inner = self.inner.lock().unwrap();
        match inner.store.get(name) {
            Some(v) => v.clone(),
            None => {
                log::error!("[STORE] variable '{name}' not found in project");
                String::new()
            }
        }
    }

    /// Optimistic local write: mirrors a caller's `set_variable` into the
    /// store immediately, ahead of the wire send completing. Per spec.md
    /// §9's open question, this is "last writer wins locally" and a
    /// subsequent accepted remote event for the same name can still
    /// overwrite it — preserved intentionally, not a bug.
    pub fn set_variable_local(&self, name: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.store.insert(name.to_string(), value.to_string());
    }

    // ---- listen mode ------------------------------------------------------

    pub fn set_default_listen_mode(&self, mode: Source) {
        self.inner.lock().unwrap().default_mode = mode;
    }

    pub fn set_variable_listen_mode(&self, name: &str, mode: Source) {
        self.inner
            .lock()
            .unwrap()
            .listen_modes
            .insert(name.to_string(), mode);
    }

    // ---- activity clocks ----------------------------------------------

    pub fn touch_upload(&self) {
        self.inner.lock().unwrap().last_upload = Instant::now();
    }

    pub fn touch_transport_activity(&self) {
        self.inner.lock().unwrap().last_transport_activity = Instant::now();
    }

    pub fn transport_idle_for(&self) -> Duration {
        self.inner.lock().unwrap().last_transport_activity.elapsed()
    }

    pub fn upload_idle_for(&self) -> Duration {
        self.inner.lock().unwrap().last_upload.elapsed()
    }

    // ---- quorum window --------------------------------------------------

    /// Records one inbound observation on `session_id`. Opens a new
    /// coordination window if none is in progress.
    pub fn record_observation(&self, session_id: usize, name: String, value: String) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.listening {
            inner.listening = true;
            inner.listen_start = Instant::now();
        }
        inner.accum.entry(session_id).or_default().push((name, value));
    }

    /// If a window is open and has been open for at least `listen_time`,
    /// closes it and returns the accumulated per-session observations,
    /// clearing all bookkeeping for the next window. Returns `None`
    /// otherwise (including when no window is open).
    pub fn take_window_if_elapsed(
        &self,
        listen_time: Duration,
    ) -> Option<HashMap<usize, Vec<(String, String)>>> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.listening || inner.listen_start.elapsed() < listen_time {
            return None;
        }
        inner.listening = false;
        Some(std::mem::take(&mut inner.accum))
    }

    // ---- arbitration ------------------------------------------------------

    /// Runs the Source Arbitrator gate (spec.md §4.4) and, on acceptance,
    /// writes the store. The coordination lock is held only for the
    /// duration of this call; the returned event must be delivered to
    /// subscribers by the caller, outside the lock.
    pub fn arbitrate(
        &self,
        source: Source,
        user: &str,
        name: &str,
        value: &str,
    ) -> Option<VariableChanged> {
        let mut inner = self.inner.lock().unwrap();
        let default_mode = inner.default_mode;
        let mode = *inner
            .listen_modes
            .entry(name.to_string())
            .or_insert(default_mode);

        if mode != source {
            log::trace!(
                "[ARBITER] dropping '{name}' from {source} (listen mode is {mode})"
            );
            return None;
        }

        inner.store.insert(name.to_string(), value.to_string());
        Some(VariableChanged {
            source,
            user: user.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn missing_variable_returns_empty_sentinel() {
        let state = CoreState::new(Source::ChangeLog);
        assert_eq!(state.get_variable("score"), "");
    }

    #[test]
    fn local_set_is_immediately_readable() {
        let state = CoreState::new(Source::ChangeLog);
        state.set_variable_local("score", "10");
        assert_eq!(state.get_variable("score"), "10");
    }

    #[test]
    fn window_closes_only_after_listen_time_elapses() {
        let state = CoreState::new(Source::Transport);
        state.record_observation(0, "lives".into(), "3".into());
        assert!(state.take_window_if_elapsed(Duration::from_millis(50)).is_none());
        sleep(Duration::from_millis(60));
        let window = state.take_window_if_elapsed(Duration::from_millis(50)).unwrap();
        assert_eq!(window.get(&0).unwrap(), &vec![("lives".to_string(), "3".to_string())]);
    }

    #[test]
    fn arbitrate_drops_events_from_non_selected_source() {
        let state = CoreState::new(Source::ChangeLog);
        // first observation for "x" under Transport: lazily assigned
        // default mode (ChangeLog), so a Transport-sourced event is
        // dropped.
        assert!(state.arbitrate(Source::Transport, "", "x", "1").is_none());
        assert_eq!(state.get_variable("x"), "");
    }

    #[test]
    fn arbitrate_accepts_matching_source_and_writes_store() {
        let state = CoreState::new(Source::Transport);
        let evt = state.arbitrate(Source::Transport, "", "lives", "3").unwrap();
        assert_eq!(evt.name, "lives");
        assert_eq!(state.get_variable("lives"), "3");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_reconnect_requires_both_clocks_past_the_threshold() {
        let state = CoreState::new(Source::Transport);
        let threshold = Duration::from_secs(2 * 60 * 60);

        tokio::time::advance(threshold + Duration::from_secs(1)).await;
        assert!(state.transport_idle_for() >= threshold);
        assert!(state.upload_idle_for() >= threshold);

        // Touching one clock keeps the pair from tripping the watchdog.
        state.touch_transport_activity();
        assert!(state.transport_idle_for() < threshold);
        assert!(state.upload_idle_for() >= threshold);
    }
}
