//! Collaborator doubles for exercising the controller.
//!
//! The doubles wrap the real in-process implementations and add call
//! counters plus switches for injecting failures.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k256::PublicKey;
use tokio::sync::Mutex;

use crate::controller::{ControllerConfig, SessionController};
use crate::credentials::encode_basic_auth;
use crate::macaroon::{BakeError, MacaroonBaker, MacaroonRecipe};
use crate::store::{InMemorySessionStore, SessionStore, StoreError};
use crate::tunnel::{AuthData, LoopbackTunnel, SessionClosed, TunnelError, TunnelServer};
use crate::types::{Session, SessionState, SessionType};

pub const TEST_PASSWORD: &str = "terminal-connect-test";

/// Baker returning a deterministic token per root key id and tier.
#[derive(Default)]
pub struct StaticBaker {
    calls: AtomicUsize,
}

impl StaticBaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_for(root_key_id: u64, read_only: bool) -> String {
        let tier = if read_only { "readonly" } else { "admin" };
        format!("{tier}-{root_key_id:016x}")
    }

    pub fn bake_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MacaroonBaker for StaticBaker {
    async fn bake(&self, root_key_id: u64, recipe: &MacaroonRecipe) -> Result<String, BakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let read_only = recipe.permissions.iter().all(|p| p.is_read());
        Ok(Self::token_for(root_key_id, read_only))
    }
}

/// Baker that always fails.
pub struct FailingBaker;

#[async_trait]
impl MacaroonBaker for FailingBaker {
    async fn bake(&self, _root_key_id: u64, _recipe: &MacaroonRecipe) -> Result<String, BakeError> {
        Err(BakeError::Unavailable("baker offline".into()))
    }
}

/// In-memory store with switchable failures and call counters.
///
/// Holding `pairing_gate` parks every `mark_in_use` call after it has been
/// counted, so a test can land other operations in the middle of a pairing.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemorySessionStore,
    pub fail_store: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_revoke: AtomicBool,
    pub pairing_gate: Mutex<()>,
    store_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    pairing_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    pub fn pairing_calls(&self) -> usize {
        self.pairing_calls.load(Ordering::SeqCst)
    }

    fn injected(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::OperationFailed(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn store_session(&self, session: Session) -> Result<(), StoreError> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_store, "store")?;
        self.inner.store_session(session).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        Self::injected(&self.fail_list, "list")?;
        self.inner.list_sessions().await
    }

    async fn revoke_session(&self, local_public_key: &PublicKey) -> Result<(), StoreError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_revoke, "revoke")?;
        self.inner.revoke_session(local_public_key).await
    }

    async fn mark_in_use(
        &self,
        local_public_key: &PublicKey,
        remote_public_key: &PublicKey,
    ) -> Result<bool, StoreError> {
        self.pairing_calls.fetch_add(1, Ordering::SeqCst);
        let _gate = self.pairing_gate.lock().await;
        Self::injected(&self.fail_store, "store")?;
        self.inner
            .mark_in_use(local_public_key, remote_public_key)
            .await
    }
}

/// Loopback tunnel that counts calls and can refuse to start.
#[derive(Default)]
pub struct RecordingTunnel {
    pub inner: LoopbackTunnel,
    pub fail_start: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl RecordingTunnel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TunnelServer for RecordingTunnel {
    async fn start_session(
        &self,
        session: Session,
        auth: AuthData,
        store: Arc<dyn SessionStore>,
    ) -> Result<SessionClosed, TunnelError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TunnelError::StartFailed("injected start failure".into()));
        }
        self.inner.start_session(session, auth, store).await
    }

    async fn stop_session(&self, local_public_key: &PublicKey) -> Result<(), TunnelError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.stop_session(local_public_key).await
    }
}

/// A controller wired to doubles, with handles to each of them.
pub struct TestRig {
    pub controller: SessionController,
    pub store: Arc<FlakyStore>,
    pub tunnel: Arc<RecordingTunnel>,
    pub baker: Arc<StaticBaker>,
}

impl TestRig {
    pub fn new() -> Self {
        let store = Arc::new(FlakyStore::new());
        let tunnel = Arc::new(RecordingTunnel::new());
        let baker = Arc::new(StaticBaker::new());
        let controller = SessionController::new(
            ControllerConfig {
                basic_auth: encode_basic_auth(TEST_PASSWORD),
            },
            store.clone(),
            tunnel.clone(),
            baker.clone(),
        );
        Self {
            controller,
            store,
            tunnel,
            baker,
        }
    }

    /// Put a session straight into the store, bypassing Add.
    pub async fn seed(
        &self,
        session_type: SessionType,
        state: SessionState,
        expiry: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let mut session = Session::new("seeded", session_type, expiry, "mailbox.test:443", true);
        session.state = state;
        self.store.store_session(session.clone()).await?;
        Ok(session)
    }

    pub async fn stored_state(&self, local_public_key: &PublicKey) -> Option<SessionState> {
        self.store
            .get_session(local_public_key)
            .await
            .ok()
            .flatten()
            .map(|s| s.state)
    }
}

impl Default for TestRig {
    fn default() -> Self {
        Self::new()
    }
}
