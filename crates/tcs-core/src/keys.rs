use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand_core::{OsRng, RngCore};
use thiserror::Error;

use crate::types::{PairingSecret, PAIRING_SECRET_SIZE};

/// Size of a compressed secp256k1 public key.
pub const COMPRESSED_PUBKEY_SIZE: usize = 33;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
}

/// Generate a fresh local key pair for a session.
pub fn generate_session_keys() -> (SecretKey, PublicKey) {
    let secret = SecretKey::random(&mut OsRng);
    let public = secret.public_key();
    (secret, public)
}

/// Generate fresh pairing secret entropy.
pub fn generate_pairing_secret() -> PairingSecret {
    let mut secret = [0u8; PAIRING_SECRET_SIZE];
    OsRng.fill_bytes(&mut secret);
    secret
}

/// Serialize a public key as a 33-byte compressed point.
pub fn serialize_compressed(key: &PublicKey) -> Vec<u8> {
    key.to_encoded_point(true).as_bytes().to_vec()
}

/// Parse a SEC1-encoded public key.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    PublicKey::from_sec1_bytes(bytes).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

/// Parse a raw 32-byte private key scalar.
pub fn parse_private_key(bytes: &[u8]) -> Result<SecretKey, KeyError> {
    SecretKey::from_slice(bytes).map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))
}

/// Hex form of the compressed key, used in logs.
pub fn key_hex(key: &PublicKey) -> String {
    hex::encode(serialize_compressed(key))
}
