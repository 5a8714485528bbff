//! Sealing, verifying, and opening secure entries
//!
//! This is the orchestration layer over the leaf modules. Sealing runs
//! the full pipeline:
//!
//! 1. Commit: hash the canonical plaintext ([`JournalPayload::commitment`])
//! 2. Derive the per-entry key and nonce from the chain position
//! 3. Encrypt the payload (XChaCha20-Poly1305)
//! 4. Compute the chain link and advance the sequence number by one
//! 5. Sign the assembled envelope (Ed25519 over `signed_data()`)
//! 6. Attach per-grantee wrapped keys and disclosed attributes
//!
//! Opening runs the reverse order: signature, chain continuity, access
//! policy, decryption. The relay only ever handles the finished
//! [`SecureEntry`]; nothing here is exposed across the relay boundary.
//!
//! ## Concurrency
//!
//! Two concurrent seals for one agent must not both read the same
//! [`ChainState`], or the chain forks. [`ChainCursor`] provides the
//! per-agent critical section; the free-standing [`SecureEntry::seal`]
//! stays a pure function for callers who manage their own
//! serialization.

use crate::chain::{chain_link, verify_chain_link, ChainState};
use crate::cipher::{decrypt_payload, derive_entry_nonce, encrypt_payload, EntryKey};
use crate::entry::{DisclosedAttributes, EntryId, SecureEntry, ENVELOPE_VERSION};
use crate::error::{SealError, SealResult};
use crate::keys::AgentKeys;
use crate::payload::JournalPayload;
use crate::policy::AccessPolicy;
use crate::signer::{sign_entry, verify_entry_signature};
use ed25519_dalek::VerifyingKey;
use parking_lot::Mutex;
use tracing::{debug, warn};
use x25519_dalek::PublicKey as ExchangePublicKey;

/// Why a chain-continuity check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFault {
    /// The entry's sequence number does not follow the last observed
    /// entry; the predecessor is missing and may be recoverable by
    /// fetching more history
    Gap { expected: u64, found: u64 },

    /// The sequence number matches but the link does not: the entry
    /// claims a different predecessor than the one observed. Always
    /// security-relevant.
    Fork,
}

/// Typed outcome of verifying a sealed entry.
///
/// Distinguishes "signature invalid" from "chain broken" so callers can
/// apply different policies (reject vs. flag-and-accept-for-audit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Signature and chain link both check out
    Verified,

    /// The envelope carries a protocol version this build cannot
    /// evaluate; no signature or chain judgment was made
    VersionUnsupported(u8),

    /// The envelope signature does not verify; the entry must never be
    /// trusted
    SignatureInvalid,

    /// The signature is valid but the entry does not extend the
    /// verifier's known chain
    ChainBroken(ChainFault),
}

impl Verification {
    /// Whether the entry passed both checks.
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }

    /// Convert into the error taxonomy for callers that treat any
    /// failure as fatal.
    pub fn into_result(self, entry: &SecureEntry) -> SealResult<()> {
        match self {
            Verification::Verified => Ok(()),
            Verification::VersionUnsupported(version) => {
                Err(SealError::VersionUnsupported(version))
            }
            Verification::SignatureInvalid => Err(SealError::SignatureInvalid(format!(
                "Signature verification failed for agent {} entry {}",
                entry.agent_id, entry.id
            ))),
            Verification::ChainBroken(ChainFault::Gap { expected, found }) => {
                Err(SealError::ChainGap { expected, found })
            }
            Verification::ChainBroken(ChainFault::Fork) => Err(SealError::ChainFork {
                agent: entry.agent_id.to_string(),
                sequence: entry.sequence_number,
            }),
        }
    }
}

impl SecureEntry {
    /// Seal a plaintext payload into an immutable envelope.
    ///
    /// Pure with respect to chain state: the caller's `ChainState` is
    /// read, never mutated, and the advanced state is returned alongside
    /// the entry. The two must be persisted atomically; see
    /// [`ChainCursor`] for the serialized variant.
    ///
    /// # Arguments
    ///
    /// * `payload` - The plaintext journal record
    /// * `keys` - The author's derived key set
    /// * `chain_state` - The author's current chain cursor
    /// * `grantees` - Exchange public keys to wrap the entry key for
    /// * `disclosed` - Plaintext attributes to expose for relay indexing
    ///
    /// # Errors
    ///
    /// - `SealError::Format` if the payload fails validation
    /// - `SealError::Encryption` / `SealError::Entropy` on cipher or
    ///   entropy failure
    pub fn seal(
        payload: &JournalPayload,
        keys: &AgentKeys,
        chain_state: &ChainState,
        grantees: &[ExchangePublicKey],
        disclosed: DisclosedAttributes,
    ) -> SealResult<(SecureEntry, ChainState)> {
        let agent_id = keys.agent_id();
        let sequence = chain_state.sequence_number + 1;

        // 1. Commit to the plaintext before anything touches it
        let content_commitment = payload.commitment()?;

        // 2. Per-entry key and nonce from the chain position
        let entry_key = EntryKey::derive(keys.encryption_root(), agent_id, sequence);
        let nonce = derive_entry_nonce(agent_id, sequence);

        // 3. Encrypt the canonical encoding
        let plaintext = payload.encode()?;
        let ciphertext = encrypt_payload(&plaintext, &entry_key, &nonce)?;

        // 4. Chain the entry to its predecessor
        let link = chain_link(&chain_state.last_chain_hash, &content_commitment, sequence);

        // 5. Wrap the entry key for each grantee
        let access_policy = AccessPolicy::wrap(&entry_key, grantees)?;

        // 6. Assemble and sign
        let mut entry = SecureEntry {
            version: ENVELOPE_VERSION,
            id: EntryId::new(),
            agent_id: agent_id.clone(),
            sequence_number: sequence,
            content_commitment,
            chain_link: link,
            nonce,
            ciphertext,
            signature: Vec::new(),
            disclosed_attributes: disclosed,
            access_policy,
        };
        entry.signature = sign_entry(&entry, keys.signing_key());

        debug!(
            agent = %agent_id,
            sequence,
            entry_id = %entry.id,
            grantees = entry.access_policy.len(),
            "sealed journal entry"
        );

        Ok((entry, chain_state.advanced(link)))
    }

    /// Verify signature and chain continuity.
    ///
    /// `previous` is the verifier's last observed chain state for this
    /// agent (genesis if none). Returns a typed [`Verification`] rather
    /// than an error so callers can quarantine, reject, or retry per
    /// outcome.
    pub fn verify(&self, verifying_key: &VerifyingKey, previous: &ChainState) -> Verification {
        if self.version != ENVELOPE_VERSION {
            warn!(version = self.version, "rejecting unsupported envelope version");
            return Verification::VersionUnsupported(self.version);
        }

        if !verify_entry_signature(self, verifying_key) {
            warn!(agent = %self.agent_id, entry_id = %self.id, "signature check failed");
            return Verification::SignatureInvalid;
        }

        let expected_sequence = previous.sequence_number + 1;
        if self.sequence_number != expected_sequence {
            debug!(
                agent = %self.agent_id,
                expected = expected_sequence,
                found = self.sequence_number,
                "chain gap"
            );
            return Verification::ChainBroken(ChainFault::Gap {
                expected: expected_sequence,
                found: self.sequence_number,
            });
        }

        if !verify_chain_link(
            &self.chain_link,
            &previous.last_chain_hash,
            &self.content_commitment,
            self.sequence_number,
        ) {
            warn!(
                agent = %self.agent_id,
                sequence = self.sequence_number,
                "chain fork: conflicting predecessor claim"
            );
            return Verification::ChainBroken(ChainFault::Fork);
        }

        Verification::Verified
    }

    /// Decrypt the payload as the author, re-deriving the entry key from
    /// the author's root key and the entry's chain position.
    ///
    /// # Errors
    ///
    /// - `SealError::Authentication` on AEAD failure
    /// - `SealError::Format` if the recovered plaintext does not match
    ///   the content commitment
    pub fn open(&self, keys: &AgentKeys) -> SealResult<JournalPayload> {
        let entry_key =
            EntryKey::derive(keys.encryption_root(), &self.agent_id, self.sequence_number);
        self.open_with_key(&entry_key)
    }

    /// Decrypt the payload as a grantee, first unwrapping the entry key
    /// from the access policy.
    ///
    /// # Errors
    ///
    /// - `SealError::AccessDenied` if the caller holds no wrapped key
    /// - `SealError::Authentication` on unwrap or AEAD failure
    pub fn open_as_grantee(&self, grantee_keys: &AgentKeys) -> SealResult<JournalPayload> {
        let entry_key = self.access_policy.unwrap(grantee_keys)?;
        self.open_with_key(&entry_key)
    }

    /// Decrypt with an already-recovered entry key.
    pub fn open_with_key(&self, entry_key: &EntryKey) -> SealResult<JournalPayload> {
        let plaintext = decrypt_payload(&self.ciphertext, entry_key, &self.nonce)?;

        // The commitment was signed; the plaintext must match it
        let commitment = *blake3::hash(&plaintext).as_bytes();
        if commitment != self.content_commitment {
            return Err(SealError::Format(
                "Decrypted payload does not match content commitment".to_string(),
            ));
        }

        JournalPayload::decode(&plaintext)
    }
}

/// Serialized per-agent chain head.
///
/// Wraps a [`ChainState`] in a mutex so concurrent seals for one agent
/// cannot observe the same cursor and fork the chain. One cursor per
/// agent identity; chains for different agents need no coordination.
#[derive(Debug)]
pub struct ChainCursor {
    state: Mutex<ChainState>,
}

impl ChainCursor {
    /// Create a cursor over an existing chain state.
    pub fn new(state: ChainState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Create a cursor for a fresh agent chain.
    pub fn genesis() -> Self {
        Self::new(ChainState::genesis())
    }

    /// Snapshot the current chain state.
    pub fn state(&self) -> ChainState {
        self.state.lock().clone()
    }

    /// Seal an entry inside the cursor's critical section.
    ///
    /// The read-modify-write of the chain state happens under the lock,
    /// so the cursor advances exactly once per sealed entry and races
    /// are structurally impossible.
    pub fn seal(
        &self,
        payload: &JournalPayload,
        keys: &AgentKeys,
        grantees: &[ExchangePublicKey],
        disclosed: DisclosedAttributes,
    ) -> SealResult<SecureEntry> {
        let mut state = self.state.lock();
        let (entry, new_state) = SecureEntry::seal(payload, keys, &state, grantees, disclosed)?;
        *state = new_state;
        Ok(entry)
    }

    /// Commit a state advanced outside the lock (the pure
    /// [`SecureEntry::seal`] flow).
    ///
    /// Compare-and-advance: succeeds only if `expected` still matches
    /// the cursor, so a lost race surfaces as an error instead of a
    /// fork.
    ///
    /// # Errors
    ///
    /// Returns `SealError::StaleChainState` if another seal advanced the
    /// cursor first; the caller must re-read and retry, never merge.
    pub fn commit(&self, expected: &ChainState, new_state: ChainState) -> SealResult<()> {
        let mut state = self.state.lock();
        if *state != *expected {
            return Err(SealError::StaleChainState {
                current: state.sequence_number,
                provided: expected.sequence_number,
            });
        }
        *state = new_state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::AgentId;
    use crate::secret::MasterSecret;

    fn author_keys() -> AgentKeys {
        AgentKeys::derive(
            &MasterSecret::random(),
            &AgentId::new("agent-alpha").unwrap(),
        )
    }

    fn payload() -> JournalPayload {
        JournalPayload::new("message_sent", "bob", "hi")
    }

    #[test]
    fn test_seal_verify_open_roundtrip() {
        let keys = author_keys();
        let state = ChainState::genesis();

        let (entry, new_state) =
            SecureEntry::seal(&payload(), &keys, &state, &[], DisclosedAttributes::new())
                .unwrap();

        assert_eq!(entry.sequence_number, 1);
        assert_eq!(new_state.sequence_number, 1);
        assert_eq!(new_state.last_chain_hash, entry.chain_link);

        let verification = entry.verify(&keys.verifying_key(), &state);
        assert!(verification.is_verified());

        let opened = entry.open(&keys).unwrap();
        assert_eq!(opened, payload().with_timestamp(opened.timestamp));
        assert_eq!(opened.action, "message_sent");
    }

    #[test]
    fn test_verify_distinguishes_signature_from_chain() {
        let keys = author_keys();
        let state = ChainState::genesis();
        let (entry, _) =
            SecureEntry::seal(&payload(), &keys, &state, &[], DisclosedAttributes::new())
                .unwrap();

        // Wrong key: signature failure
        let other = author_keys();
        assert_eq!(
            entry.verify(&other.verifying_key(), &state),
            Verification::SignatureInvalid
        );

        // Wrong predecessor at the right sequence: fork
        let forked = ChainState {
            last_chain_hash: [0xAB; 32],
            sequence_number: 0,
        };
        assert_eq!(
            entry.verify(&keys.verifying_key(), &forked),
            Verification::ChainBroken(ChainFault::Fork)
        );

        // Verifier is behind: gap
        let behind = ChainState {
            last_chain_hash: entry.chain_link,
            sequence_number: 5,
        };
        assert_eq!(
            entry.verify(&keys.verifying_key(), &behind),
            Verification::ChainBroken(ChainFault::Gap {
                expected: 6,
                found: 1
            })
        );
    }

    #[test]
    fn test_unsupported_version_is_not_a_signature_failure() {
        let keys = author_keys();
        let state = ChainState::genesis();
        let (mut entry, _) =
            SecureEntry::seal(&payload(), &keys, &state, &[], DisclosedAttributes::new())
                .unwrap();
        entry.version = 99;

        // A future version gets its own outcome, not a misleading
        // signature verdict
        assert_eq!(
            entry.verify(&keys.verifying_key(), &state),
            Verification::VersionUnsupported(99)
        );
        assert!(matches!(
            Verification::VersionUnsupported(99).into_result(&entry),
            Err(SealError::VersionUnsupported(99))
        ));
    }

    #[test]
    fn test_into_result_maps_the_taxonomy() {
        let keys = author_keys();
        let state = ChainState::genesis();
        let (entry, _) =
            SecureEntry::seal(&payload(), &keys, &state, &[], DisclosedAttributes::new())
                .unwrap();

        assert!(Verification::Verified.into_result(&entry).is_ok());
        assert!(matches!(
            Verification::SignatureInvalid.into_result(&entry),
            Err(SealError::SignatureInvalid(_))
        ));
        assert!(matches!(
            Verification::ChainBroken(ChainFault::Fork).into_result(&entry),
            Err(SealError::ChainFork { .. })
        ));
        assert!(matches!(
            Verification::ChainBroken(ChainFault::Gap {
                expected: 2,
                found: 9
            })
            .into_result(&entry),
            Err(SealError::ChainGap {
                expected: 2,
                found: 9
            })
        ));
    }

    #[test]
    fn test_grantee_can_open_outsider_cannot() {
        let author = author_keys();
        let grantee = AgentKeys::derive(
            &MasterSecret::random(),
            &AgentId::new("grantee-b").unwrap(),
        );
        let outsider = AgentKeys::derive(
            &MasterSecret::random(),
            &AgentId::new("outsider-c").unwrap(),
        );

        let (entry, _) = SecureEntry::seal(
            &payload(),
            &author,
            &ChainState::genesis(),
            &[grantee.exchange_public_key()],
            DisclosedAttributes::new(),
        )
        .unwrap();

        let opened = entry.open_as_grantee(&grantee).unwrap();
        assert_eq!(opened.summary, "hi");

        assert!(matches!(
            entry.open_as_grantee(&outsider),
            Err(SealError::AccessDenied)
        ));
    }

    #[test]
    fn test_disclosed_attributes_survive_sealing() {
        let keys = author_keys();
        let mut disclosed = DisclosedAttributes::new();
        disclosed.insert("target_type".to_string(), "agent".to_string());

        let (entry, _) =
            SecureEntry::seal(&payload(), &keys, &ChainState::genesis(), &[], disclosed).unwrap();

        assert_eq!(
            entry.disclosed().get("target_type").map(String::as_str),
            Some("agent")
        );
    }

    #[test]
    fn test_tampered_ciphertext_fails_open() {
        let keys = author_keys();
        let (mut entry, _) = SecureEntry::seal(
            &payload(),
            &keys,
            &ChainState::genesis(),
            &[],
            DisclosedAttributes::new(),
        )
        .unwrap();

        entry.ciphertext[0] ^= 0x01;
        assert!(matches!(
            entry.open(&keys),
            Err(SealError::Authentication(_))
        ));
    }

    #[test]
    fn test_cursor_seals_sequentially() {
        let keys = author_keys();
        let cursor = ChainCursor::genesis();

        let e1 = cursor
            .seal(&payload(), &keys, &[], DisclosedAttributes::new())
            .unwrap();
        let e2 = cursor
            .seal(&payload(), &keys, &[], DisclosedAttributes::new())
            .unwrap();

        assert_eq!(e1.sequence_number, 1);
        assert_eq!(e2.sequence_number, 2);
        assert_eq!(cursor.state().sequence_number, 2);
        assert_eq!(cursor.state().last_chain_hash, e2.chain_link);
    }

    #[test]
    fn test_cursor_commit_detects_stale_state() {
        let keys = author_keys();
        let cursor = ChainCursor::genesis();
        let snapshot = cursor.state();

        // First writer wins
        let (_, new_state) = SecureEntry::seal(
            &payload(),
            &keys,
            &snapshot,
            &[],
            DisclosedAttributes::new(),
        )
        .unwrap();
        cursor.commit(&snapshot, new_state).unwrap();

        // Second writer raced on the same snapshot
        let (_, racy_state) = SecureEntry::seal(
            &payload(),
            &keys,
            &snapshot,
            &[],
            DisclosedAttributes::new(),
        )
        .unwrap();
        assert!(matches!(
            cursor.commit(&snapshot, racy_state),
            Err(SealError::StaleChainState { current: 1, provided: 0 })
        ));
    }

    #[test]
    fn test_concurrent_cursor_seals_never_fork() {
        use std::sync::Arc;

        let keys = Arc::new(author_keys());
        let cursor = Arc::new(ChainCursor::genesis());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = Arc::clone(&keys);
                let cursor = Arc::clone(&cursor);
                std::thread::spawn(move || {
                    cursor
                        .seal(&payload(), &keys, &[], DisclosedAttributes::new())
                        .unwrap()
                        .sequence_number
                })
            })
            .collect();

        let mut sequences: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=8).collect::<Vec<u64>>());
    }
}
