//! Session identity layer for Portico frontend servers.
//!
//! This crate tracks every live client connection and its identity:
//!
//! 1. **Registry** — the process-wide [`SessionService`]: sid table,
//!    uid index, bind/unbind invariants, kick semantics
//! 2. **Identity** — one [`Session`] per connection: optional bound
//!    user, free-form settings store, two-phase close protocol
//! 3. **Projection** — the [`FrontendSession`] view handed to handler
//!    code, so handlers can never mutate transport internals directly
//!
//! # How it fits in the stack
//!
//! ```text
//! Handler layer (above)  ← sees FrontendSession projections only
//!     ↕
//! Session layer (this crate)  ← owns identity and lifecycle
//!     ↕
//! Transport layer (below)  ← implements Socket, assigns session ids
//! ```
//!
//! The transport layer is an external collaborator: it accepts
//! connections, calls [`SessionService::create`] with a [`Socket`]
//! handle, and routes socket errors into [`Session::closed`].

mod error;
mod events;
mod frontend;
mod service;
mod session;
mod socket;

pub use error::SessionError;
pub use events::{
    EventListener, Notifiable, Notifier, SessionEvent, SessionEventKind,
};
pub use frontend::FrontendSession;
pub use service::{SessionService, SessionServiceConfig};
pub use session::{Session, SessionState};
pub use socket::{Socket, SocketError};
