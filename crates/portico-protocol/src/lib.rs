//! Identity types and serializable session state for Portico.
//!
//! This crate defines the vocabulary shared by every layer of a Portico
//! frontend server:
//!
//! - **Identity** ([`SessionId`], [`UserId`], [`FrontendId`]) — who a
//!   connection is and which server instance owns it.
//! - **Settings** ([`SettingsValue`], [`SettingsMap`]) — the free-form
//!   per-connection key/value store.
//! - **Snapshot** ([`SessionSnapshot`]) — the restricted, serializable
//!   view of a session that is safe to ship across a process boundary
//!   or into logs.
//!
//! # Architecture
//!
//! The protocol layer sits below the session layer. It knows nothing
//! about sockets or registries — it only defines the data shapes they
//! exchange.
//!
//! ```text
//! Session layer (registry, lifecycle) → Protocol layer (this crate)
//! ```

mod types;

pub use types::{
    FrontendId, SessionId, SessionSnapshot, SettingsMap, SettingsValue,
    UserId,
};
