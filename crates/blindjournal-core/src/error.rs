//! Error types for the Blind Journal envelope protocol

use thiserror::Error;

/// Main error type for envelope protocol operations
///
/// Messages never include payload plaintext; identifiers and sequence
/// numbers are the only context carried into logs.
#[derive(Error, Debug)]
pub enum SealError {
    /// Malformed input encoding (bad hex, wrong-length key material)
    #[error("Format error: {0}")]
    Format(String),

    /// The OS entropy source failed; there is no safe fallback
    #[error("Entropy source failure: {0}")]
    Entropy(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Payload encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// AEAD tag verification failed (wrong key, corrupted ciphertext, or
    /// tampering); no partial plaintext is ever returned
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Envelope signature does not verify; the entry must never be trusted
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    /// Chain link does not connect to the last observed entry; the
    /// predecessor is missing and may be recoverable by fetching history
    #[error("Chain gap: expected sequence {expected}, entry claims {found}")]
    ChainGap { expected: u64, found: u64 },

    /// Two entries make conflicting claims about the same chain position;
    /// always fatal, indicates a compromised or malfunctioning author
    #[error("Chain fork detected for agent {agent} at sequence {sequence}")]
    ChainFork { agent: String, sequence: u64 },

    /// Caller holds no wrapped key in the access policy; an expected,
    /// non-exceptional outcome for unauthorized readers
    #[error("Access denied: no wrapped key for this grantee")]
    AccessDenied,

    /// Concurrent-write race on an agent's own chain; retry with
    /// refreshed state, never auto-merge
    #[error("Stale chain state: cursor is at sequence {current}, caller provided {provided}")]
    StaleChainState { current: u64, provided: u64 },

    /// Envelope protocol version not supported
    #[error("Envelope version {0} is not supported")]
    VersionUnsupported(u8),
}

/// Result type alias using SealError
pub type SealResult<T> = Result<T, SealError>;
