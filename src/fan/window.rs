//! Pure quorum-window computation (spec.md §4.2).
//!
//! Split out of `fan::Coordinator` the way the teacher splits
//! `engine/logic.rs` out of `engine/mod.rs`: no I/O, no locks, fully
//! deterministic, and the natural unit to test the echo-suppression
//! algorithm against without standing up any transports at all.

use std::collections::{HashMap, HashSet};

/// Given the per-session observations accumulated during one
/// coordination window and the set of currently connected session ids,
/// returns the accepted (quorum-confirmed) `(name, value)` pairs in
/// first-seen order.
///
/// An observation is accepted iff every connected session saw it the
/// same positive number of times. Echoes of this client's own writes
/// land on all-but-one connected session, so their per-session counts
/// differ and they are suppressed; genuine third-party events (and
/// genuine duplicates of them) land uniformly on every session.
pub fn accepted_observations(
    accum: &HashMap<usize, Vec<(String, String)>>,
    connected: &HashSet<usize>,
) -> Vec<(String, String)> {
    if connected.is_empty() {
        return Vec::new();
    }

    let mut union_order: Vec<(String, String)> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for session_id in accum.keys().collect::<std::collections::BTreeSet<_>>() {
        for message in &accum[session_id] {
            if seen.insert(message.clone()) {
                union_order.push(message.clone());
            }
        }
    }

    union_order
        .into_iter()
        .filter(|message| is_quorum_accepted(message, accum, connected))
        .collect()
}

fn is_quorum_accepted(
    message: &(String, String),
    accum: &HashMap<usize, Vec<(String, String)>>,
    connected: &HashSet<usize>,
) -> bool {
    let mut expected: Option<usize> = None;
    for session_id in connected {
        let count = accum
            .get(session_id)
            .map(|msgs| msgs.iter().filter(|m| *m == message).count())
            .unwrap_or(0);
        if count == 0 {
            return false;
        }
        match expected {
            None => expected = Some(count),
            Some(e) if e != count => return false,
            _ => {}
        }
    }
    true
}
