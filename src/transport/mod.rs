//! The Transport Session abstraction (spec.md §4.1).
//!
//! `Transport` is the trait the Fan Coordinator programs against —
//! analogous to the teacher's `ElectrumApi` trait, which is implemented
//! both by the real async client and by `MockElectrumClient` for tests.
//! Here `live::TransportSession` is the real WebSocket-backed session and
//! `mock::MockTransport` is the in-memory stand-in used throughout the
//! Fan Coordinator's unit tests.

mod live;
pub mod mock;

pub use live::TransportSession;
pub use mock::MockTransport;

/// Invoked once per parsed inbound variable record, with `(name, value)`.
pub type InboundCallback = Box<dyn Fn(String, String) + Send + Sync>;

/// One duplex real-time channel to the cloud endpoint, or a stand-in for
/// one in tests. The Fan Coordinator owns a `Vec<Arc<dyn Transport>>` and
/// never sees whether it's live or mocked.
pub trait Transport: Send + Sync {
    fn id(&self) -> usize;

    /// True once the handshake completed and no unrecovered close has
    /// been observed since.
    fn connected(&self) -> bool;

    /// Non-blocking snapshot of the outbound queue depth.
    fn queue_size(&self) -> usize;

    /// Appends `(name, value)` to the outbound queue. Never blocks, never
    /// fails.
    fn enqueue(&self, name: String, value: String);

    /// Registers the receiver invoked once per parsed inbound record.
    /// Replaces any previously registered callback.
    fn on_variable_set(&self, callback: InboundCallback);

    /// Signals the session to stop reconnecting and close its socket.
    /// A no-op for transports with nothing to close.
    fn stop(&self) {}
}
