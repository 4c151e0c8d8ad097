//! Storage abstraction for session records.
//!
//! This module defines the `SessionStore` trait and provides an in-memory
//! implementation for tests and single-process deployments.

use std::sync::Arc;

use async_trait::async_trait;
use k256::PublicKey;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::keys::key_hex;
use crate::marshal::MarshalError;
use crate::types::{Session, SessionState};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("data corruption detected: {0}")]
    DataCorruption(String),

    /// A stored enum value has no counterpart in this build.
    #[error("stored session does not translate: {0}")]
    Translation(#[from] MarshalError),
}

// ============================================================================
// Store Trait
// ============================================================================

/// Durable home of session records.
///
/// Sessions are keyed by their local public key. Implementations are shared
/// across the controller, the watchers and the tunnel (which uses the store
/// to persist its own state changes, such as moving a session to `InUse`).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session record.
    ///
    /// A stored session that is already revoked or expired keeps its state;
    /// only the other fields are replaced.
    async fn store_session(&self, session: Session) -> Result<(), StoreError>;

    /// All sessions, in a stable order.
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    /// Mark a session as revoked.
    ///
    /// # Returns
    /// * `Ok(())` on success, including when the session was already revoked
    /// * `Err(StoreError::NotFound)` if no session has this local key
    async fn revoke_session(&self, local_public_key: &PublicKey) -> Result<(), StoreError>;

    /// Record a completed pairing: set the remote key and move the session to
    /// `InUse`, but only while it is still created or in use.
    ///
    /// # Returns
    /// * `Ok(true)` if the session was updated
    /// * `Ok(false)` if it is already revoked or expired (nothing is written)
    /// * `Err(StoreError::NotFound)` if no session has this local key
    async fn mark_in_use(
        &self,
        local_public_key: &PublicKey,
        remote_public_key: &PublicKey,
    ) -> Result<bool, StoreError>;

    /// Look up a single session by its local key.
    async fn get_session(&self, local_public_key: &PublicKey) -> Result<Option<Session>, StoreError> {
        Ok(self
            .list_sessions()
            .await?
            .into_iter()
            .find(|s| &s.local_public_key == local_public_key))
    }
}

// ============================================================================
// In-Memory Store Implementation
// ============================================================================

/// Thread-safe in-memory store keeping sessions in insertion order.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<Vec<Session>>>,
}

impl InMemorySessionStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn store_session(&self, mut session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions
            .iter_mut()
            .find(|s| s.local_public_key == session.local_public_key)
        {
            Some(existing) => {
                if existing.state.is_terminal() {
                    session.state = existing.state;
                }
                *existing = session;
            }
            None => sessions.push(session),
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions.read().await.clone())
    }

    async fn revoke_session(&self, local_public_key: &PublicKey) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions
            .iter_mut()
            .find(|s| &s.local_public_key == local_public_key)
        {
            Some(session) => {
                session.state = SessionState::Revoked;
                Ok(())
            }
            None => Err(StoreError::NotFound(key_hex(local_public_key))),
        }
    }

    async fn mark_in_use(
        &self,
        local_public_key: &PublicKey,
        remote_public_key: &PublicKey,
    ) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .iter_mut()
            .find(|s| &s.local_public_key == local_public_key)
            .ok_or_else(|| StoreError::NotFound(key_hex(local_public_key)))?;

        if session.state.is_terminal() {
            return Ok(false);
        }
        session.state = SessionState::InUse;
        session.remote_public_key = Some(*remote_public_key);
        Ok(true)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
