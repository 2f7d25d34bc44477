//! Nonce challenge: the client proves it holds the private half of its
//! claimed key by returning the nonce transformed with that private key
//! (PKCS#1 v1.5 type 1 padding, no digest prefix).
//!
//! Credential assertions carry a PKCS#1 v1.5 signature over the SHA-256 of
//! their text, made with the authorizer's key.

use base64::Engine as _;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unrecognized key format")]
    UnknownFormat,
    #[error("malformed key: {0}")]
    Key(String),
    #[error("malformed signature: {0}")]
    Signature(String),
    #[error("does not verify")]
    Mismatch,
}

/// Key handling needed by the nonce challenge and credential checks.
pub trait PublicKeyCrypto {
    type Key;

    fn decode_key(&self, text: &str) -> Result<Self::Key, CryptoError>;

    /// Public-decrypt `blob` and require the payload to equal `expected`.
    fn verify_blob(&self, key: &Self::Key, expected: &[u8], blob: &[u8]) -> Result<(), CryptoError>;

    fn verify_signature(
        &self,
        key: &Self::Key,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError>;
}

/// RSA keys given as PEM (PKCS#1 or SubjectPublicKeyInfo), `rsa-hex:<DER>` or
/// `rsa-base64:<DER>`, optionally wrapped in double quotes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaCrypto;

const HEX_PREFIX: &str = "rsa-hex:";
const BASE64_PREFIX: &str = "rsa-base64:";

pub const SIG_HEX_PREFIX: &str = "sig-rsa-sha256-hex:";
pub const SIG_BASE64_PREFIX: &str = "sig-rsa-sha256-base64:";

fn unquoted(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .trim()
}

fn from_der(der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_pkcs1_der(der)
        .or_else(|_| RsaPublicKey::from_public_key_der(der))
        .map_err(|e| CryptoError::Key(e.to_string()))
}

impl PublicKeyCrypto for RsaCrypto {
    type Key = RsaPublicKey;

    fn decode_key(&self, text: &str) -> Result<RsaPublicKey, CryptoError> {
        let text = unquoted(text);

        if let Some(h) = text.strip_prefix(HEX_PREFIX) {
            let der = hex::decode(h.trim()).map_err(|e| CryptoError::Key(e.to_string()))?;
            return from_der(&der);
        }
        if let Some(b) = text.strip_prefix(BASE64_PREFIX) {
            let der = base64::engine::general_purpose::STANDARD
                .decode(b.trim())
                .map_err(|e| CryptoError::Key(e.to_string()))?;
            return from_der(&der);
        }
        if text.starts_with("-----BEGIN RSA PUBLIC KEY-----") {
            return RsaPublicKey::from_pkcs1_pem(text).map_err(|e| CryptoError::Key(e.to_string()));
        }
        if text.starts_with("-----BEGIN PUBLIC KEY-----") {
            return RsaPublicKey::from_public_key_pem(text)
                .map_err(|e| CryptoError::Key(e.to_string()));
        }
        Err(CryptoError::UnknownFormat)
    }

    fn verify_blob(&self, key: &RsaPublicKey, expected: &[u8], blob: &[u8]) -> Result<(), CryptoError> {
        key.verify(Pkcs1v15Sign::new_unprefixed(), expected, blob)
            .map_err(|_| CryptoError::Mismatch)
    }

    fn verify_signature(
        &self,
        key: &RsaPublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        key.verify(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(message), signature)
            .map_err(|_| CryptoError::Mismatch)
    }
}

/// Raw bytes of a `sig-rsa-sha256-hex:` or `sig-rsa-sha256-base64:` value.
pub fn decode_signature(text: &str) -> Result<Vec<u8>, CryptoError> {
    let text = unquoted(text);
    if let Some(h) = text.strip_prefix(SIG_HEX_PREFIX) {
        return hex::decode(h.trim()).map_err(|e| CryptoError::Signature(e.to_string()));
    }
    if let Some(b) = text.strip_prefix(SIG_BASE64_PREFIX) {
        return base64::engine::general_purpose::STANDARD
            .decode(b.trim())
            .map_err(|e| CryptoError::Signature(e.to_string()));
    }
    Err(CryptoError::Signature(format!("unsupported algorithm in {text:?}")))
}

/// Check that `signature` over `body` was made with the key given as `key_text`.
pub fn verify_assertion<C: PublicKeyCrypto>(
    crypto: &C,
    key_text: &str,
    body: &str,
    signature: &str,
) -> Result<(), CryptoError> {
    let key = crypto.decode_key(key_text)?;
    let raw = decode_signature(signature)?;
    crypto.verify_signature(&key, body.as_bytes(), &raw)
}

/// Check `blob` against `nonce` (little-endian) for the key given as `key_text`.
pub fn authenticate<C: PublicKeyCrypto>(
    crypto: &C,
    key_text: &str,
    nonce: u32,
    blob: &[u8],
) -> Result<(), CryptoError> {
    let key = crypto.decode_key(key_text)?;
    crypto.verify_blob(&key, &nonce.to_le_bytes(), blob)
}
