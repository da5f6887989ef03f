//! Deciding whether a failure is worth retrying.
//!
//! Errors that know what they are report an [`ErrorKind`] through the
//! [`Classify`] trait, and the policy checks that tag against its
//! retryable set. Errors that don't (plain strings, opaque third-party
//! errors) fall back to a substring match of their message against
//! [`TRANSIENT_PHRASES`].

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Broad failure categories a policy can opt into retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote end couldn't be reached or the link dropped.
    Connectivity,
    /// The call didn't complete in time.
    Timeout,
    /// The remote end asked us to slow down.
    RateLimited,
    /// The remote end is up but temporarily refusing work.
    ServiceUnavailable,
    /// A concurrent writer won; trying again may succeed.
    Conflict,
    /// Local I/O failed.
    Io,
}

/// Lower-cased message fragments that mark a failure as transient when the
/// error carries no [`ErrorKind`].
pub const TRANSIENT_PHRASES: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connection",
    "failed to fetch",
    "temporarily unavailable",
    "service unavailable",
    "econnreset",
    "econnrefused",
    "rate limit",
    "too many requests",
];

/// Errors the retry executor can classify.
///
/// Only [`error_kind`](Self::error_kind) needs overriding; the default
/// returns `None`, which sends classification to the phrase heuristic.
pub trait Classify: fmt::Display {
    /// The error's category, if it knows it.
    fn error_kind(&self) -> Option<ErrorKind> {
        None
    }
}

impl Classify for String {}

impl Classify for str {}

impl Classify for io::Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(match self.kind() {
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe => ErrorKind::Connectivity,
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                ErrorKind::ServiceUnavailable
            }
            _ => ErrorKind::Io,
        })
    }
}

/// `true` if the message contains any of [`TRANSIENT_PHRASES`].
pub(crate) fn looks_transient(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_PHRASES.iter().any(|phrase| message.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_transient_matches_case_insensitively() {
        assert!(looks_transient("Network request failed"));
        assert!(looks_transient("upstream TIMED OUT after 30s"));
        assert!(looks_transient("429 Too Many Requests"));
    }

    #[test]
    fn test_looks_transient_rejects_permanent_messages() {
        assert!(!looks_transient("invalid refresh token"));
        assert!(!looks_transient("permission denied"));
    }

    #[test]
    fn test_io_error_kinds_map_to_categories() {
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        let missing = io::Error::from(io::ErrorKind::NotFound);

        assert_eq!(timed_out.error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(reset.error_kind(), Some(ErrorKind::Connectivity));
        assert_eq!(missing.error_kind(), Some(ErrorKind::Io));
    }

    #[test]
    fn test_string_has_no_kind() {
        assert_eq!(String::from("boom").error_kind(), None);
    }
}
