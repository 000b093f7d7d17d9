//! In-memory `Transport` stand-in for Fan Coordinator tests.
//!
//! Mirrors the teacher's `MockElectrumClient` (`electrum/mock/client.rs`):
//! a pure, synchronously-driven double that lets tests push inbound
//! frames and inspect the outbound queue without any real I/O.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::transport::{InboundCallback, Transport};

pub struct MockTransport {
    id: usize,
    connected: Mutex<bool>,
    queue: Mutex<VecDeque<(String, String)>>,
    callback: Mutex<Option<InboundCallback>>,
}

impl MockTransport {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            connected: Mutex::new(true),
            queue: Mutex::new(VecDeque::new()),
            callback: Mutex::new(None),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        *self.connected.lock().unwrap() = connected;
    }

    /// Simulates the server delivering one inbound record, invoking
    /// whatever callback the Fan Coordinator registered.
    pub fn push_inbound(&self, name: &str, value: &str) {
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb(name.to_string(), value.to_string());
        }
    }

    /// Drains and returns the outbound queue, simulating the pacer
    /// having sent everything.
    pub fn drain_outbound(&self) -> Vec<(String, String)> {
        self.queue.lock().unwrap().drain(..).collect()
    }
}

impl Transport for MockTransport {
    fn id(&self) -> usize {
        self.id
    }

    fn connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn queue_size(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn enqueue(&self, name: String, value: String) {
        self.queue.lock().unwrap().push_back((name, value));
    }

    fn on_variable_set(&self, callback: InboundCallback) {
        *self.callback.lock().unwrap() = Some(callback);
    }
}
