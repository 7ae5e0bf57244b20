use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::RelayError;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Seals refresh tokens for the database (AES-256-GCM) and signs the OAuth
/// `state` that ties a consent round-trip to the user who started it
/// (HMAC-SHA256).
pub struct CryptoEngine {
    cipher: Aes256Gcm,
    state_key: Vec<u8>,
}

impl CryptoEngine {
    /// Keys as configured through `MASTER_KEY` and `HMAC_SECRET` (base64).
    pub fn new(master_key_b64: &str, hmac_secret_b64: &str) -> Result<Self, RelayError> {
        let master_key = decode_key("MASTER_KEY", master_key_b64)?;
        if master_key.len() != KEY_LEN {
            return Err(RelayError::CryptoError(format!(
                "MASTER_KEY decodes to {} bytes, AES-256 needs {KEY_LEN}",
                master_key.len()
            )));
        }
        let state_key = decode_key("HMAC_SECRET", hmac_secret_b64)?;
        if state_key.is_empty() {
            return Err(RelayError::CryptoError("HMAC_SECRET is empty".into()));
        }

        Self::from_raw(&master_key, state_key)
    }

    /// Random keys that live as long as the process. Anything sealed or
    /// signed with them is unreadable after a restart.
    pub fn ephemeral() -> Result<Self, RelayError> {
        let mut master_key = [0u8; KEY_LEN];
        let mut state_key = vec![0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut master_key);
        rand::thread_rng().fill_bytes(&mut state_key);
        Self::from_raw(&master_key, state_key)
    }

    fn from_raw(master_key: &[u8], state_key: Vec<u8>) -> Result<Self, RelayError> {
        let cipher = Aes256Gcm::new_from_slice(master_key)
            .map_err(|e| RelayError::CryptoError(format!("bad token cipher key: {e}")))?;
        Ok(Self { cipher, state_key })
    }

    // ── Refresh tokens at rest ───────────────────────────────────────────

    /// `base64(nonce || ciphertext)`, fresh nonce per call.
    pub fn seal(&self, refresh_token: &str) -> Result<String, RelayError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), refresh_token.as_bytes())
            .map_err(|_| RelayError::CryptoError("could not seal refresh token".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Inverse of [`seal`](Self::seal). Fails if the value was sealed under
    /// another master key.
    pub fn open(&self, sealed: &str) -> Result<String, RelayError> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|_| RelayError::CryptoError("stored token is not base64".into()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(RelayError::CryptoError("stored token is truncated".into()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                RelayError::CryptoError("stored token does not open with MASTER_KEY".into())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| RelayError::CryptoError("stored token is not UTF-8".into()))
    }

    // ── OAuth state ──────────────────────────────────────────────────────

    /// `base64url(payload).base64url(tag)`; URL-safe as is.
    pub fn sign_state(&self, payload: &str) -> Result<String, RelayError> {
        let mut mac = self.state_mac()?;
        mac.update(payload.as_bytes());
        let tag = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// The payload of a state produced by [`sign_state`](Self::sign_state)
    /// with the same key.
    pub fn verify_state(&self, signed: &str) -> Result<String, RelayError> {
        let (payload_b64, tag_b64) = signed
            .split_once('.')
            .ok_or_else(|| invalid_state("missing signature"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| invalid_state("payload is not base64url"))?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|_| invalid_state("signature is not base64url"))?;

        let mut mac = self.state_mac()?;
        mac.update(&payload);
        mac.verify_slice(&tag)
            .map_err(|_| invalid_state("signature mismatch"))?;

        String::from_utf8(payload).map_err(|_| invalid_state("payload is not UTF-8"))
    }

    fn state_mac(&self) -> Result<HmacSha256, RelayError> {
        <HmacSha256 as Mac>::new_from_slice(&self.state_key)
            .map_err(|e| RelayError::CryptoError(format!("bad state signing key: {e}")))
    }
}

fn decode_key(name: &str, b64: &str) -> Result<Vec<u8>, RelayError> {
    STANDARD
        .decode(b64.trim())
        .map_err(|e| RelayError::CryptoError(format!("{name} is not valid base64: {e}")))
}

fn invalid_state(reason: &str) -> RelayError {
    RelayError::InvalidState(reason.into())
}
