//! Process-wide monotonic id counters for listeners and connections.
//!
//! These are the only shared mutable state in the whole proxy
//! — plain atomic increments, no locks.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next listener id.
pub fn next_listener_id() -> u64 {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Allocate the next connection id.
pub fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// The `[L#n]` log-line tag for a listener.
pub fn tag(listener_id: u64) -> String {
    format!("[L#{listener_id}]")
}

/// The `[L#n] [C#m]` log-line tag for a connection.
pub fn tag_conn(listener_id: u64, connection_id: u64) -> String {
    format!("[L#{listener_id}] [C#{connection_id}]")
}
