//! Per-layer ephemeral–static ECDH + AEAD.
//!
//! Curve is X25519, AEAD is ChaCha20-Poly1305 with a 12-byte nonce sampled
//! fresh from the CSPRNG on every call — both are deployment-wide constants
//! and must match across every node. The raw 32-byte ECDH shared secret is
//! used directly as the AEAD key; no KDF is applied.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Encrypts `plaintext` as one onion layer addressed to `recipient_static_pub`.
///
/// Output layout: `[keylen:1][ephemeral_pubkey:keylen][nonce:12][ciphertext]`.
pub fn encrypt_layer(plaintext: &[u8], recipient_static_pub: &PublicKey) -> Vec<u8> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(recipient_static_pub);
    let mut key_bytes = *shared_secret.as_bytes();

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
    // Fresh ephemeral key + fresh CSPRNG nonce; encryption of well-formed
    // plaintext under a valid key cannot fail.
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("chacha20poly1305 encryption with a valid key cannot fail");

    key_bytes.zeroize();

    let ephemeral_bytes = ephemeral_public.to_bytes();
    let mut layer = Vec::with_capacity(1 + ephemeral_bytes.len() + NONCE_LEN + ciphertext.len());
    layer.push(ephemeral_bytes.len() as u8);
    layer.extend_from_slice(&ephemeral_bytes);
    layer.extend_from_slice(&nonce_bytes);
    layer.extend_from_slice(&ciphertext);
    layer
}

/// Peels one onion layer using this hop's static secret.
///
/// Failure to authenticate produces [`CryptoError::DecryptFailed`]; callers
/// MUST treat this as a silent drop, never a partial application.
pub fn decrypt_layer(layer: &[u8], static_secret: &StaticSecret) -> Result<Vec<u8>, CryptoError> {
    if layer.is_empty() {
        return Err(CryptoError::TruncatedLayer);
    }
    let key_len = layer[0] as usize;
    if key_len != KEY_LEN {
        return Err(CryptoError::InvalidKeyLength);
    }
    if layer.len() < 1 + key_len + NONCE_LEN {
        return Err(CryptoError::TruncatedLayer);
    }

    let ephemeral_bytes: [u8; KEY_LEN] = layer[1..1 + key_len]
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength)?;
    let ephemeral_public = PublicKey::from(ephemeral_bytes);

    let nonce_start = 1 + key_len;
    let nonce_bytes = &layer[nonce_start..nonce_start + NONCE_LEN];
    let nonce = Nonce::from_slice(nonce_bytes);

    let ciphertext = &layer[nonce_start + NONCE_LEN..];

    let shared_secret = static_secret.diffie_hellman(&ephemeral_public);
    let mut key_bytes = *shared_secret.as_bytes();
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::DecryptFailed);

    key_bytes.zeroize();
    plaintext
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair() -> (StaticSecret, PublicKey) {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        (secret, public)
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips() {
        let (secret, public) = keypair();
        let layer = encrypt_layer(b"inner body", &public);
        let plaintext = decrypt_layer(&layer, &secret).unwrap();
        assert_eq!(plaintext, b"inner body");
    }

    #[test]
    fn wrong_recipient_fails_to_decrypt() {
        let (_secret, public) = keypair();
        let (wrong_secret, _wrong_public) = keypair();
        let layer = encrypt_layer(b"inner body", &public);
        let result = decrypt_layer(&layer, &wrong_secret);
        assert_eq!(result.unwrap_err(), CryptoError::DecryptFailed);
    }

    #[test]
    fn tampered_tag_fails_closed() {
        let (secret, public) = keypair();
        let mut layer = encrypt_layer(b"inner body", &public);
        *layer.last_mut().unwrap() ^= 0xFF;
        assert_eq!(
            decrypt_layer(&layer, &secret).unwrap_err(),
            CryptoError::DecryptFailed
        );
    }

    #[test]
    fn repeated_encryptions_use_distinct_nonces_and_ephemeral_keys() {
        let (_secret, public) = keypair();
        let a = encrypt_layer(b"same plaintext", &public);
        let b = encrypt_layer(b"same plaintext", &public);
        assert_ne!(a, b);
        // ephemeral pubkey lives right after the 1-byte length prefix
        assert_ne!(&a[1..33], &b[1..33]);
    }

    #[test]
    fn rejects_truncated_layer() {
        assert_eq!(
            decrypt_layer(&[32], &StaticSecret::random_from_rng(rand::rngs::OsRng)).unwrap_err(),
            CryptoError::TruncatedLayer
        );
    }
}
