//! One ephemeral-for-session static ECDH keypair per `Core`.
//!
//! No persistence — a fresh keypair is generated on every `Core::init`. The
//! curve is X25519, chosen deployment-wide and consistent with the AEAD
//! layer in [`crate::crypto`].

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// Session identity: a static X25519 keypair plus its derived address token.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
    address: String,
}

impl Identity {
    /// Generates a fresh ephemeral-for-session keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        let address = derive_address(public.as_bytes());
        Self {
            secret,
            public,
            address,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    /// Human-visible address of the form `taior://<hex>`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The opaque peer id (≤32 bytes) this node identifies itself as when
    /// it registers with another node's directory: the hex encoding of the
    /// first 16 bytes of the public key, 32 ASCII bytes wide — it fits the
    /// next-hop field exactly and its first 16 bytes (the AORP destination
    /// field) are exactly the first 16 hex characters.
    pub fn peer_id(&self) -> String {
        hex::encode(&self.public.to_bytes()[..16])
    }
}

/// How a node decides an AORP frame's `destination` field refers to
/// itself: `destination == first 16 bytes of peer id, right-padded with
/// zeros`.
pub fn destination_bytes_for(peer_id: &str) -> [u8; 16] {
    let mut dest = [0u8; 16];
    let bytes = peer_id.as_bytes();
    let take = bytes.len().min(16);
    dest[..take].copy_from_slice(&bytes[..take]);
    dest
}

/// Derives the same peer id a node computes for itself via [`Identity::peer_id`],
/// but from a static public key obtained out of band (a handshake-delivered
/// key stored against a directory entry). A sender must use this — not the
/// directory's own label for that peer — to compute the destination field of
/// a circuit's terminal hop, since the label a peer is registered under is an
/// arbitrary, substrate-local routing address that has no reason to agree
/// with the hop's own view of its `peer_id()`. Deriving from the public key
/// both sides actually share makes the two views agree by construction.
pub fn peer_id_from_static_key(static_public_key: &[u8]) -> String {
    let take = static_public_key.len().min(16);
    hex::encode(&static_public_key[..take])
}

impl Drop for Identity {
    fn drop(&mut self) {
        // StaticSecret does not implement Zeroize directly across all
        // versions; explicitly wipe our view of the public address string,
        // the secret's own Drop handles the scalar.
        self.address.zeroize();
    }
}

/// Derives the `taior://<hex>` address token from a public key: hash it,
/// hex-encode the digest, and truncate to 32 hex chars for display.
pub fn derive_address(public_key: &[u8; 32]) -> String {
    let digest = blake3::hash(public_key);
    let hex = hex::encode(digest.as_bytes());
    format!("taior://{}", &hex[..32])
}
