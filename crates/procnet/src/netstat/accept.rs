//! Ready-made entry predicates for [`Netstat::run`](super::Netstat::run).
//!
//! Any `Fn(&SocketEntry) -> bool` works as a predicate; these cover the
//! common listing modes.

use super::types::SocketEntry;

/// Accept every entry.
pub fn all(_entry: &SocketEntry) -> bool {
    true
}

/// Accept entries with no remote peer (listening sockets and unconnected
/// datagram sockets).
pub fn listening(entry: &SocketEntry) -> bool {
    entry.remote.is_unspecified()
}

/// Accept entries with a remote peer; the complement of [`listening`].
pub fn connected(entry: &SocketEntry) -> bool {
    !listening(entry)
}
