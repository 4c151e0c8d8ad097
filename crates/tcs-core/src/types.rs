//! Session record and the enums that describe it.

use chrono::{DateTime, Utc};
use k256::{PublicKey, SecretKey};

use crate::keys::{generate_pairing_secret, generate_session_keys, serialize_compressed};

/// Size of the pairing secret entropy in bytes.
pub const PAIRING_SECRET_SIZE: usize = 14;

/// Raw pairing secret entropy. Only ever shown to users as a mnemonic.
pub type PairingSecret = [u8; PAIRING_SECRET_SIZE];

/// Upper four bytes of every session-scoped macaroon root key id.
pub const SESSION_ROOT_KEY_PREFIX: [u8; 4] = [0xff, 0xee, 0xdd, 0xcc];

/// Authorization mode of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionType {
    MacaroonReadonly,
    MacaroonAdmin,
    MacaroonCustom,
    UiPassword,
}

impl SessionType {
    /// Types that can be created through this controller.
    pub fn is_supported_for_add(self) -> bool {
        matches!(
            self,
            SessionType::UiPassword | SessionType::MacaroonAdmin | SessionType::MacaroonReadonly
        )
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Created,
    InUse,
    Revoked,
    Expired,
}

impl SessionState {
    /// Only created and in-use sessions may be started again.
    pub fn is_resumable(self) -> bool {
        matches!(self, SessionState::Created | SessionState::InUse)
    }

    /// Revoked and expired sessions never move to another state.
    pub fn is_terminal(self) -> bool {
        !self.is_resumable()
    }
}

/// A time-bounded, credentialed grant of remote access.
///
/// Sessions are identified by their local public key. The store owns the
/// persisted copy; everything else works on clones.
#[derive(Clone, Debug)]
pub struct Session {
    pub label: String,
    pub session_type: SessionType,
    pub state: SessionState,
    /// Absolute expiry, second precision. Never changes after creation.
    pub expiry: DateTime<Utc>,
    pub server_addr: String,
    pub dev_server: bool,
    pub pairing_secret: PairingSecret,
    pub local_private_key: SecretKey,
    pub local_public_key: PublicKey,
    /// Set by the tunnel once a remote peer has paired.
    pub remote_public_key: Option<PublicKey>,
    pub macaroon_root_key: u64,
}

impl Session {
    /// Create a fresh session in the `Created` state with newly generated
    /// pairing secret and local key pair.
    pub fn new(
        label: impl Into<String>,
        session_type: SessionType,
        expiry: DateTime<Utc>,
        server_addr: impl Into<String>,
        dev_server: bool,
    ) -> Self {
        let (local_private_key, local_public_key) = generate_session_keys();
        let macaroon_root_key = session_root_key_id(&local_public_key);

        Self {
            label: label.into(),
            session_type,
            state: SessionState::Created,
            expiry,
            server_addr: server_addr.into(),
            dev_server,
            pairing_secret: generate_pairing_secret(),
            local_private_key,
            local_public_key,
            remote_public_key: None,
            macaroon_root_key,
        }
    }

    /// Whether the expiry has been reached at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// Compressed local public key bytes, the session's identity.
    pub fn id_bytes(&self) -> Vec<u8> {
        serialize_compressed(&self.local_public_key)
    }
}

/// Derive the macaroon root key id for a session: a fixed prefix followed by
/// four bytes of the compressed local key (skipping the parity byte).
pub fn session_root_key_id(local_public_key: &PublicKey) -> u64 {
    let compressed = serialize_compressed(local_public_key);
    let mut id = [0u8; 8];
    id[..4].copy_from_slice(&SESSION_ROOT_KEY_PREFIX);
    id[4..].copy_from_slice(&compressed[1..5]);
    u64::from_be_bytes(id)
}
