//! Blind Journal Core Library
//!
//! Cryptographic envelope protocol for publishing agent activity records
//! to a relay that must never be able to read them, while still letting
//! the relay order, deduplicate, authenticate, and selectively index
//! those records.
//!
//! ## Overview
//!
//! An agent derives all of its keys from one [`MasterSecret`], seals
//! each plaintext [`JournalPayload`] into an immutable [`SecureEntry`]
//! (encrypt, chain-link, sign), and hands the envelope to an external
//! relay. The relay acts as a **blind, append-only, verifiable store**:
//! it sees ciphertext, hashes, a signature, and whatever attributes the
//! author chose to disclose, and nothing else.
//!
//! ## Core Principles
//!
//! - **Blind relay**: the relay-facing boundary ([`relay`]) cannot reach
//!   any decryption or key-derivation function
//! - **Tamper evidence**: per-agent hash chains make reordering,
//!   dropping, or forking entries detectable
//! - **Selective disclosure**: per-grantee wrapped keys share single
//!   entries without re-encryption
//!
//! ## Quick Start
//!
//! ```
//! use blindjournal_core::{
//!     AgentId, AgentKeys, ChainCursor, DisclosedAttributes, JournalPayload, MasterSecret,
//! };
//!
//! # fn main() -> Result<(), blindjournal_core::SealError> {
//! let secret = MasterSecret::generate()?;
//! let keys = AgentKeys::derive(&secret, &AgentId::new("agent-alpha")?);
//!
//! let cursor = ChainCursor::genesis();
//! let payload = JournalPayload::new("message_sent", "bob", "hi");
//! let entry = cursor.seal(&payload, &keys, &[], DisclosedAttributes::new())?;
//!
//! // The relay stores `entry` unmodified; only we can open it.
//! assert!(entry.verify(&keys.verifying_key(), &Default::default()).is_verified());
//! assert_eq!(entry.open(&keys)?.summary, "hi");
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod cipher;
pub mod codec;
pub mod entry;
pub mod error;
pub mod keys;
pub mod payload;
pub mod policy;
pub mod relay;
pub mod secret;
pub mod signer;

// Re-exports
pub use chain::{chain_link, genesis_hash, verify_chain_link, ChainState};
pub use cipher::{derive_entry_nonce, EntryKey, NONCE_SIZE};
pub use codec::{ChainCursor, ChainFault, Verification};
pub use entry::{DisclosedAttributes, EntryId, SecureEntry, ENVELOPE_VERSION, SIGNATURE_SIZE};
pub use error::{SealError, SealResult};
pub use keys::{verifying_key_from_hex, AgentId, AgentKeys};
pub use payload::JournalPayload;
pub use policy::{hash_grantee_key, AccessPolicy, WrappedKey};
pub use relay::{ChainHead, MemoryRelay, Relay};
pub use secret::{MasterSecret, MASTER_SECRET_SIZE};
pub use signer::{require_valid_signature, sign_entry, verify_entry_signature};
