//! Core identity and state types for the Portico session layer.
//!
//! Everything here is either an identifier or a serializable projection
//! of session state. These are the only shapes that ever leave the
//! frontend process, so their serialized form is part of the contract
//! with other servers.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a live session on one frontend process.
///
/// Assigned by the transport layer when a connection is accepted, and
/// unique among currently live sessions for the lifetime of the process.
///
/// `#[serde(transparent)]` keeps the wire form a plain number, so a
/// `SessionId(42)` serializes as `42` and not `{"0":42}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-{}", self.0)
    }
}

/// An application-level user identifier.
///
/// Produced by the authentication layer (out of scope here) and bound to
/// one or more sessions by the session service. A session that has not
/// been authenticated yet simply has no `UserId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u-{}", self.0)
    }
}

/// Identifier of the frontend server instance that owns a session.
///
/// Static for the lifetime of a process — every session created on the
/// same frontend carries the same `FrontendId`. Backend servers use it
/// to route messages back to the connection's owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrontendId(pub String);

impl FrontendId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FrontendId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FrontendId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for FrontendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// A single value in a session's settings store.
///
/// The store is schema-free: handlers stash whatever per-connection data
/// they need (scores, room ids, feature flags, nested objects). The
/// tagged [`serde_json::Value`] variant covers strings, numbers,
/// booleans, sequences, and nested mappings while staying serializable.
pub type SettingsValue = serde_json::Value;

/// The free-form key/value store attached to every session.
pub type SettingsMap = HashMap<String, SettingsValue>;

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// The serializable subset of a session's state.
///
/// This is what `FrontendSession::export()` produces and what travels to
/// backend servers: identity plus settings, nothing that could reach
/// back into the transport. The field set is exact — consumers rely on
/// these four fields and no others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The session's unique ID.
    pub id: SessionId,
    /// The frontend instance that owns the session.
    pub frontend_id: FrontendId,
    /// The bound user, if the session has been authenticated.
    pub uid: Option<UserId>,
    /// Point-in-time copy of the settings store.
    pub settings: SettingsMap,
}

// =========================================================================
// Tests
// =========================================================================
