//! Translation between session records and their wire form.

use chrono::{DateTime, Utc};
use k256::PublicKey;
use tcs_proto::v1::{SessionStateV1, SessionTypeV1, SessionV1};
use thiserror::Error;

use crate::keys::{parse_public_key, serialize_compressed, KeyError};
use crate::mnemonic::pairing_secret_to_mnemonic;
use crate::types::{PairingSecret, Session, SessionState, SessionType, PAIRING_SECRET_SIZE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("unknown {field} value {value}")]
    UnknownEnumValue { field: &'static str, value: i32 },

    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error("pairing secret must be {PAIRING_SECRET_SIZE} bytes, got {0}")]
    InvalidPairingSecret(usize),

    #[error("expiry timestamp {0} is out of range")]
    InvalidExpiry(u64),
}

pub fn session_state_to_wire(state: SessionState) -> SessionStateV1 {
    match state {
        SessionState::Created => SessionStateV1::Created,
        SessionState::InUse => SessionStateV1::InUse,
        SessionState::Revoked => SessionStateV1::Revoked,
        SessionState::Expired => SessionStateV1::Expired,
    }
}

pub fn session_type_to_wire(session_type: SessionType) -> SessionTypeV1 {
    match session_type {
        SessionType::MacaroonReadonly => SessionTypeV1::MacaroonReadonly,
        SessionType::MacaroonAdmin => SessionTypeV1::MacaroonAdmin,
        SessionType::MacaroonCustom => SessionTypeV1::MacaroonCustom,
        SessionType::UiPassword => SessionTypeV1::UiPassword,
    }
}

/// Decode a raw wire state value.
pub fn session_state_from_wire(value: i32) -> Result<SessionState, MarshalError> {
    match SessionStateV1::try_from(value) {
        Ok(SessionStateV1::Created) => Ok(SessionState::Created),
        Ok(SessionStateV1::InUse) => Ok(SessionState::InUse),
        Ok(SessionStateV1::Revoked) => Ok(SessionState::Revoked),
        Ok(SessionStateV1::Expired) => Ok(SessionState::Expired),
        Err(_) => Err(MarshalError::UnknownEnumValue {
            field: "session_state",
            value,
        }),
    }
}

/// Decode a raw wire type value.
pub fn session_type_from_wire(value: i32) -> Result<SessionType, MarshalError> {
    match SessionTypeV1::try_from(value) {
        Ok(SessionTypeV1::MacaroonReadonly) => Ok(SessionType::MacaroonReadonly),
        Ok(SessionTypeV1::MacaroonAdmin) => Ok(SessionType::MacaroonAdmin),
        Ok(SessionTypeV1::MacaroonCustom) => Ok(SessionType::MacaroonCustom),
        Ok(SessionTypeV1::UiPassword) => Ok(SessionType::UiPassword),
        Err(_) => Err(MarshalError::UnknownEnumValue {
            field: "session_type",
            value,
        }),
    }
}

/// Unix seconds, clamped at zero for pre-epoch times.
pub fn expiry_to_wire(expiry: DateTime<Utc>) -> u64 {
    u64::try_from(expiry.timestamp()).unwrap_or(0)
}

pub fn expiry_from_wire(seconds: u64) -> Result<DateTime<Utc>, MarshalError> {
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or(MarshalError::InvalidExpiry(seconds))
}

/// Wire form of a session. The private key never leaves the process.
pub fn session_to_wire(session: &Session) -> SessionV1 {
    SessionV1 {
        label: session.label.clone(),
        session_state: session_state_to_wire(session.state) as i32,
        session_type: session_type_to_wire(session.session_type) as i32,
        expiry_timestamp_seconds: expiry_to_wire(session.expiry),
        mailbox_server_addr: session.server_addr.clone(),
        dev_server: session.dev_server,
        pairing_secret: session.pairing_secret.to_vec(),
        pairing_secret_mnemonic: pairing_secret_to_mnemonic(&session.pairing_secret),
        local_public_key: serialize_compressed(&session.local_public_key),
        remote_public_key: session
            .remote_public_key
            .as_ref()
            .map(serialize_compressed)
            .unwrap_or_default(),
    }
}

/// Public view of a session, as recovered from the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub label: String,
    pub session_type: SessionType,
    pub state: SessionState,
    pub expiry: DateTime<Utc>,
    pub server_addr: String,
    pub dev_server: bool,
    pub pairing_secret: PairingSecret,
    pub local_public_key: PublicKey,
    pub remote_public_key: Option<PublicKey>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            label: session.label.clone(),
            session_type: session.session_type,
            state: session.state,
            // The wire carries whole seconds.
            expiry: DateTime::<Utc>::from_timestamp(session.expiry.timestamp(), 0)
                .unwrap_or(session.expiry),
            server_addr: session.server_addr.clone(),
            dev_server: session.dev_server,
            pairing_secret: session.pairing_secret,
            local_public_key: session.local_public_key,
            remote_public_key: session.remote_public_key,
        }
    }
}

/// Parse a wire session back into its public view.
pub fn session_from_wire(wire: &SessionV1) -> Result<SessionInfo, MarshalError> {
    let pairing_secret: PairingSecret = wire
        .pairing_secret
        .as_slice()
        .try_into()
        .map_err(|_| MarshalError::InvalidPairingSecret(wire.pairing_secret.len()))?;

    let remote_public_key = if wire.remote_public_key.is_empty() {
        None
    } else {
        Some(parse_public_key(&wire.remote_public_key)?)
    };

    Ok(SessionInfo {
        label: wire.label.clone(),
        session_type: session_type_from_wire(wire.session_type)?,
        state: session_state_from_wire(wire.session_state)?,
        expiry: expiry_from_wire(wire.expiry_timestamp_seconds)?,
        server_addr: wire.mailbox_server_addr.clone(),
        dev_server: wire.dev_server,
        pairing_secret,
        local_public_key: parse_public_key(&wire.local_public_key)?,
        remote_public_key,
    })
}
