//! WireGuard key handling
//!
//! Keys are 32-byte x25519 values exchanged as standard base64. UAPI wants them
//! hex encoded.

use crate::error::{OverlayError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

/// Generate a keypair, returning `(private_key, public_key)` in base64
pub fn generate_keypair() -> (String, String) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    (
        STANDARD.encode(secret.to_bytes()),
        STANDARD.encode(public.as_bytes()),
    )
}

/// Derive the base64 public key for a base64 private key
pub fn public_key_from_private(private_key: &str) -> Result<String> {
    let bytes = decode_key(private_key)?;
    let secret = StaticSecret::from(bytes);
    Ok(STANDARD.encode(PublicKey::from(&secret).as_bytes()))
}

/// Convert a base64-encoded key to hex (UAPI requires hex-encoded keys)
pub fn key_to_hex(base64_key: &str) -> Result<String> {
    Ok(hex::encode(decode_key(base64_key)?))
}

fn decode_key(base64_key: &str) -> Result<[u8; 32]> {
    let bytes = STANDARD
        .decode(base64_key.trim())
        .map_err(|e| OverlayError::InvalidKey(e.to_string()))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        OverlayError::InvalidKey(format!(
            "Invalid key length: expected 32 bytes, got {}",
            bytes.len()
        ))
    })
}
