//! TCS Core - session lifecycle for Terminal Connect.
//!
//! This crate implements:
//! - The session record, its key material and pairing phrase
//! - Resume decisions and the per-session watcher
//! - Authorization payloads for password and macaroon sessions
//! - The lifecycle controller with idempotent, draining shutdown
//! - Translation to and from the wire records
//! - Storage and tunnel abstractions with in-process implementations

#![forbid(unsafe_code)]

// Lifecycle
pub mod controller;
pub mod watcher;

// Collaborators
pub mod store;
pub mod tunnel;
pub mod macaroon;

// Supporting modules
pub mod credentials;
pub mod errors;
pub mod keys;
pub mod marshal;
pub mod mnemonic;
pub mod types;
pub mod harness;

// Optional storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use controller::{ControllerConfig, ResumeOutcome, ResumeReport, SessionController};
pub use errors::{ErrorCategory, SessionRpcError, ValidationError};
pub use store::{InMemorySessionStore, SessionStore, StoreError};
pub use tunnel::{AuthData, LoopbackTunnel, SessionClosed, TunnelError, TunnelServer};
pub use types::{Session, SessionState, SessionType};
