//! Error types for the onion overlay core.
//!
//! Mirrors the error-kind taxonomy of the upward API: failures that originate
//! from the caller's own `send` are always surfaced (`CoreError`); failures
//! that happen while processing inbound substrate frames are always local
//! drops and never escape the router (`CodecError`, `CryptoError`).

use thiserror::Error;

/// Errors observable by callers of the upward API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("core not initialized")]
    NotInitialized,

    #[error("no usable circuit and none could be built")]
    NoCircuit,

    #[error("circuit would be shorter than the configured minimum hop count")]
    InsufficientAnonymity,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("operation cancelled by disconnect")]
    Cancelled,
}

/// Internal errors raised while parsing or building wire frames.
///
/// These never propagate to the upward API; a malformed inbound frame is
/// always a silent drop at the router.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload exceeds maximum AORP payload size (65535 bytes)")]
    PayloadTooLarge,

    #[error("destination id exceeds 16 bytes")]
    DestinationTooLong,

    #[error("frame is malformed or too short to contain a valid header")]
    MalformedFrame,

    #[error("unexpected magic byte {0:#04x}")]
    UnexpectedMagic(u8),

    #[error("declared payload length is inconsistent with frame length")]
    LengthMismatch,
}

/// Internal errors raised while peeling or building onion layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("ephemeral public key length out of range")]
    InvalidKeyLength,

    #[error("layer is too short to contain a header and tag")]
    TruncatedLayer,

    #[error("AEAD authentication failed")]
    DecryptFailed,
}

/// Internal errors raised by the peer directory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("peer {0} is unknown")]
    UnknownPeer(String),

    #[error("static public key shorter than the curve-expected length")]
    KeyTooShort,
}

/// Internal errors raised by the circuit manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CircuitError {
    #[error("fewer than {needed} eligible candidates (have {available})")]
    InsufficientPeers { needed: usize, available: usize },

    #[error("mode requests {requested} hops, below the enforced minimum of {min}")]
    BelowMinimumHops { requested: usize, min: usize },

    #[error("invalid circuit configuration: {0}")]
    InvalidConfig(String),
}
