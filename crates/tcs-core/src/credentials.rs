//! Authorization payloads handed to the tunnel.
//!
//! Password sessions carry a basic-auth header line built from the
//! server-wide password. Macaroon sessions carry a freshly baked credential
//! scoped to the session's root key id.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::macaroon::{BakeError, MacaroonBaker, MacaroonRecipe};
use crate::tunnel::AuthData;
use crate::types::{Session, SessionType};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential can be built for session type {0:?}")]
    UnsupportedType(SessionType),

    #[error(transparent)]
    Bake(#[from] BakeError),
}

/// Basic-auth value for a password: base64 of `password:password`.
pub fn encode_basic_auth(password: &str) -> String {
    STANDARD.encode(format!("{password}:{password}"))
}

/// Build the authorization payload for a session.
pub async fn build_auth_data(
    session: &Session,
    basic_auth: &str,
    baker: &dyn MacaroonBaker,
) -> Result<AuthData, CredentialError> {
    let read_only = match session.session_type {
        SessionType::UiPassword => {
            return Ok(AuthData::new(format!("Authorization: Basic {basic_auth}")));
        }
        SessionType::MacaroonAdmin => false,
        SessionType::MacaroonReadonly => true,
        other => return Err(CredentialError::UnsupportedType(other)),
    };

    let recipe = MacaroonRecipe::for_session(read_only);
    let mac = baker.bake(session.macaroon_root_key, &recipe).await?;
    Ok(AuthData::new(format!("Macaroon: {mac}")))
}
