//! Error types for the session layer.

use portico_protocol::{SessionId, UserId};

use crate::socket::SocketError;

/// Errors that can occur during session registry operations.
///
/// Every variant is a recoverable, caller-reportable condition: a failed
/// bind or unbind is final for that call, and whether to retry is the
/// caller's decision. Nothing here ever escalates to a process-level
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is registered under the given session id.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The session is already bound to a different user.
    /// Binding twice to the *same* user is a no-op success, not an error.
    #[error("session {sid} is already bound to {current}")]
    AlreadyBound {
        sid: SessionId,
        current: UserId,
    },

    /// The session's current user is absent or differs from the one the
    /// caller asked to unbind.
    #[error("session {sid} is not bound to {uid}")]
    NotBound { sid: SessionId, uid: UserId },

    /// The single-session policy is enabled and the user already has a
    /// bound session.
    #[error("single-session policy: {0} already has a bound session")]
    SingleSessionViolation(UserId),

    /// Forwarding a message to the session's socket failed.
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// The session service behind a weak handle has been dropped.
    /// Only reachable during process teardown.
    #[error("session service is no longer available")]
    ServiceUnavailable,
}
