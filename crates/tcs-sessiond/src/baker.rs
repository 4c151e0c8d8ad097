//! HMAC-signed session credentials.
//!
//! Tokens are `hex(payload) "." hex(tag)` where the payload names the root
//! key id and the granted permissions, and the tag is HMAC-SHA256 over the
//! payload with the daemon's root secret.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tcs_core::macaroon::{BakeError, MacaroonBaker, MacaroonRecipe};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";

pub struct HmacMacaroonBaker {
    root_secret: Vec<u8>,
}

/// Reasons a token fails [`HmacMacaroonBaker::verify`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("token tag does not match")]
    BadTag,

    #[error("unsupported token version")]
    UnknownVersion,

    #[error("unusable root secret: {0}")]
    Secret(String),
}

/// Contents of a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub root_key_id: u64,
    pub permissions: Vec<(String, String)>,
}

impl HmacMacaroonBaker {
    pub fn new(root_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            root_secret: root_secret.into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.root_secret).map_err(|e| TokenError::Secret(e.to_string()))
    }

    fn payload(root_key_id: u64, recipe: &MacaroonRecipe) -> String {
        let perms: Vec<String> = recipe
            .permissions
            .iter()
            .map(|p| format!("{}:{}", p.entity, p.action))
            .collect();
        format!("{TOKEN_VERSION}|{root_key_id:016x}|{}", perms.join(","))
    }

    /// Check a token's tag and decode what it grants.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let (payload_hex, tag_hex) = token
            .split_once('.')
            .ok_or(TokenError::Malformed("no tag"))?;
        let payload = hex::decode(payload_hex).map_err(|_| TokenError::Malformed("payload not hex"))?;
        let tag = hex::decode(tag_hex).map_err(|_| TokenError::Malformed("tag not hex"))?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&tag).map_err(|_| TokenError::BadTag)?;

        let payload =
            String::from_utf8(payload).map_err(|_| TokenError::Malformed("payload not utf-8"))?;
        let mut parts = payload.splitn(3, '|');
        if parts.next() != Some(TOKEN_VERSION) {
            return Err(TokenError::UnknownVersion);
        }
        let root_key_id = parts
            .next()
            .and_then(|id| u64::from_str_radix(id, 16).ok())
            .ok_or(TokenError::Malformed("bad root key id"))?;
        let permissions = parts
            .next()
            .unwrap_or_default()
            .split(',')
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.split_once(':'))
            .map(|(entity, action)| (entity.to_string(), action.to_string()))
            .collect();

        Ok(VerifiedToken {
            root_key_id,
            permissions,
        })
    }
}

#[async_trait]
impl MacaroonBaker for HmacMacaroonBaker {
    async fn bake(&self, root_key_id: u64, recipe: &MacaroonRecipe) -> Result<String, BakeError> {
        let payload = Self::payload(root_key_id, recipe);
        let mut mac = self.mac().map_err(|e| BakeError::Failed(e.to_string()))?;
        mac.update(payload.as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(format!("{}.{}", hex::encode(payload), hex::encode(tag)))
    }
}
