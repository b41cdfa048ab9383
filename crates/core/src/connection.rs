//! Heuristic classification of remote failures.
//!
//! Submission errors surface as plain messages from several layers
//! (reqwest, hyper, the OS). When one looks like a broken connection the
//! executor marks itself disconnected so the reconnect tick takes over.

/// Lower-case fragments that indicate the backend is unreachable.
pub const CONNECTION_ERROR_MARKERS: &[&str] = &[
    "connection refused",
    "reset",
    "eof",
    "broken pipe",
    "network",
    "dial",
    "timeout",
    "timed out",
];

/// Whether `message` looks like a connection-level failure (case-insensitive).
pub fn is_connection_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    CONNECTION_ERROR_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}
