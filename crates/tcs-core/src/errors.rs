//! Error types surfaced by the session controller.
//!
//! Every failure a caller can see is one of four kinds: bad input, a store
//! failure, a tunnel failure while starting a session, or a translation
//! failure at the wire boundary. Teardown failures (stopping an already
//! stopped tunnel, revoking on expiry) are only logged and never reach this
//! type.

use thiserror::Error;

use crate::keys::KeyError;
use crate::marshal::MarshalError;
use crate::store::StoreError;
use crate::tunnel::TunnelError;
use crate::types::SessionType;

/// Rejected caller input. Raised before any mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expiry must be in the future")]
    ExpiryNotInFuture,

    #[error("expiry timestamp {0} is out of range")]
    ExpiryOutOfRange(u64),

    #[error("invalid session type {0:?}, only UI password, admin and readonly macaroon types are supported")]
    UnsupportedType(SessionType),

    #[error("error parsing public key: {0}")]
    InvalidPublicKey(#[from] KeyError),
}

/// Broad classification of a [`SessionRpcError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Storage,
    Collaborator,
    Translation,
}

/// Errors returned by the controller's public operations.
#[derive(Debug, Error)]
pub enum SessionRpcError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("session store error: {0}")]
    Storage(StoreError),

    #[error("error starting session: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("error marshaling session: {0}")]
    Translation(#[from] MarshalError),
}

// A stored record that does not translate is a translation failure, not a
// storage one.
impl From<StoreError> for SessionRpcError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Translation(err) => SessionRpcError::Translation(err),
            other => SessionRpcError::Storage(other),
        }
    }
}

impl SessionRpcError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionRpcError::Validation(_) => ErrorCategory::Validation,
            SessionRpcError::Storage(_) => ErrorCategory::Storage,
            SessionRpcError::Tunnel(_) => ErrorCategory::Collaborator,
            SessionRpcError::Translation(_) => ErrorCategory::Translation,
        }
    }

    /// True when the store reported that the session does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionRpcError::Storage(StoreError::NotFound(_)))
    }
}
