//! The blind relay boundary
//!
//! A relay stores and serves sealed entries it cannot read. This module
//! defines the collaborator interface ([`Relay`]) plus an in-memory
//! reference implementation used in tests and tools.
//!
//! The module deliberately imports nothing from `cipher`, `keys`
//! (beyond the public [`AgentId`] identity type), `secret`, or
//! `policy`'s unwrap path: the blind-relay trust model is enforced by
//! this capability split, not by convention. A relay implementation
//! written against this trait has no way to reach a decryption or
//! key-derivation function.

use crate::entry::SecureEntry;
use crate::error::{SealError, SealResult};
use crate::keys::AgentId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// The last stored chain position for one agent, as the relay sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Highest stored sequence number
    pub sequence_number: u64,

    /// Chain link of that entry
    pub chain_link: [u8; 32],
}

/// Storage/forwarding interface for sealed entries.
///
/// The relay never calls any decryption or key-derivation function; it
/// handles opaque envelopes and the disclosed attribute subset only.
pub trait Relay {
    /// Store a sealed entry, unmodified.
    ///
    /// # Errors
    ///
    /// - `SealError::ChainFork` if a DIFFERENT entry already occupies
    ///   this `(agent_id, sequence_number)` slot
    /// - `SealError::ChainGap` if the entry does not extend the stored
    ///   chain contiguously
    fn store(&self, entry: SecureEntry) -> SealResult<()>;

    /// Fetch stored entries for an agent with sequence numbers strictly
    /// greater than `since_sequence`, in sequence order.
    fn fetch(&self, agent_id: &AgentId, since_sequence: u64) -> SealResult<Vec<SecureEntry>>;

    /// Fetch the last stored chain position for an agent, if any.
    fn fetch_chain_head(&self, agent_id: &AgentId) -> SealResult<Option<ChainHead>>;
}

/// In-memory reference relay.
///
/// Keeps one ordered map of entries per agent and enforces the
/// append-only discipline: exactly one entry per `(agent, sequence)`,
/// contiguous sequence numbers, byte-identical re-stores deduplicated
/// via the content commitment.
#[derive(Debug, Default)]
pub struct MemoryRelay {
    chains: RwLock<HashMap<AgentId, BTreeMap<u64, SecureEntry>>>,
}

impl MemoryRelay {
    /// Create an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored entries across all agents.
    pub fn len(&self) -> usize {
        self.chains.read().values().map(BTreeMap::len).sum()
    }

    /// Whether the relay holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Relay for MemoryRelay {
    fn store(&self, entry: SecureEntry) -> SealResult<()> {
        let mut chains = self.chains.write();
        let chain = chains.entry(entry.agent_id.clone()).or_default();

        if let Some(existing) = chain.get(&entry.sequence_number) {
            // Idempotent re-store of the identical envelope is fine;
            // anything else claims a conflicting chain position. A
            // re-sealed copy of the same payload (fresh id, signature,
            // or policy) is a conflict too: the relay must keep exactly
            // one envelope per slot
            if *existing == entry {
                debug!(
                    agent = %entry.agent_id,
                    sequence = entry.sequence_number,
                    "deduplicated re-stored entry"
                );
                return Ok(());
            }
            return Err(SealError::ChainFork {
                agent: entry.agent_id.to_string(),
                sequence: entry.sequence_number,
            });
        }

        let expected = chain.keys().next_back().copied().unwrap_or(0) + 1;
        if entry.sequence_number != expected {
            return Err(SealError::ChainGap {
                expected,
                found: entry.sequence_number,
            });
        }

        debug!(
            agent = %entry.agent_id,
            sequence = entry.sequence_number,
            entry_id = %entry.id,
            "stored sealed entry"
        );
        chain.insert(entry.sequence_number, entry);
        Ok(())
    }

    fn fetch(&self, agent_id: &AgentId, since_sequence: u64) -> SealResult<Vec<SecureEntry>> {
        let chains = self.chains.read();
        Ok(chains
            .get(agent_id)
            .map(|chain| {
                chain
                    .range(since_sequence + 1..)
                    .map(|(_, entry)| entry.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_chain_head(&self, agent_id: &AgentId) -> SealResult<Option<ChainHead>> {
        let chains = self.chains.read();
        Ok(chains.get(agent_id).and_then(|chain| {
            chain.values().next_back().map(|entry| ChainHead {
                sequence_number: entry.sequence_number,
                chain_link: entry.chain_link,
            })
        }))
    }
}
