//! Per-agent tamper-evident hash chain
//!
//! Every sealed entry binds itself to its predecessor:
//!
//! ```text
//! chain_link_n = BLAKE3(chain_link_{n-1} || content_commitment_n || sequence_n)
//! ```
//!
//! Chains are per-agent and start from a fixed genesis value, so entries
//! cannot be reordered, dropped invisibly, or forked without detection.
//! Chains for different agents are fully independent.

use serde::{Deserialize, Serialize};

/// Context string for the fixed genesis hash
const GENESIS_CONTEXT: &str = "blindjournal-chain-genesis-v1";

/// Per-agent chain cursor: the last link hash and how many entries have
/// been sealed.
///
/// Mutated only by the agent producing entries for that identity, and
/// advanced exactly once per created entry. Passed explicitly through
/// function arguments (never ambient global state) so tests stay
/// deterministic and agents stay isolated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Hash of the most recently sealed entry's chain link
    pub last_chain_hash: [u8; 32],

    /// Sequence number of the most recently sealed entry (0 = none yet)
    pub sequence_number: u64,
}

impl ChainState {
    /// The starting cursor for a fresh agent chain.
    ///
    /// `last_chain_hash` is the fixed genesis value; the first sealed
    /// entry will carry sequence number 1.
    pub fn genesis() -> Self {
        Self {
            last_chain_hash: genesis_hash(),
            sequence_number: 0,
        }
    }

    /// The cursor after sealing an entry with the given link.
    pub fn advanced(&self, chain_link: [u8; 32]) -> Self {
        Self {
            last_chain_hash: chain_link,
            sequence_number: self.sequence_number + 1,
        }
    }
}

impl Default for ChainState {
    fn default() -> Self {
        Self::genesis()
    }
}

/// The fixed 32-byte genesis value all agent chains start from.
pub fn genesis_hash() -> [u8; 32] {
    blake3::derive_key(GENESIS_CONTEXT, b"")
}

/// Compute the chain link binding an entry to its predecessor.
///
/// `BLAKE3(previous || commitment || sequence_le)`. The sequence number
/// is included so an attacker cannot splice an entry into a different
/// position even with a matching predecessor hash.
pub fn chain_link(previous: &[u8; 32], commitment: &[u8; 32], sequence: u64) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(previous);
    hasher.update(commitment);
    hasher.update(&sequence.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Check whether a claimed chain link connects to a known predecessor.
///
/// Recomputes the expected link from `previous_chain_hash` and compares.
/// Returns `false` rather than erroring so callers can decide whether a
/// mismatch is fatal or merely "predecessor not yet observed".
pub fn verify_chain_link(
    claimed_link: &[u8; 32],
    previous_chain_hash: &[u8; 32],
    commitment: &[u8; 32],
    sequence: u64,
) -> bool {
    let expected = chain_link(previous_chain_hash, commitment, sequence);
    expected == *claimed_link
}
