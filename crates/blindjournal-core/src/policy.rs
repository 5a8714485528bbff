//! Selective-disclosure access policies
//!
//! An [`AccessPolicy`] lets the author share one entry's symmetric key
//! with a chosen set of grantees without re-encrypting the payload. The
//! entry key is wrapped separately for each grantee:
//!
//! ```text
//! 1. Ephemeral X25519 keypair per grantee
//! 2. shared = x25519(ephemeral_sk, grantee_exchange_pk)
//! 3. wrap_key = HKDF-SHA256(shared, "blindjournal-key-wrap-v1")
//! 4. wrapped = XChaCha20-Poly1305(wrap_key, entry_key)
//! ```
//!
//! The policy stores a BLAKE3 hash of the grantee's exchange public key,
//! not the grantee identity, so an observer holding the envelope cannot
//! enumerate who has access. Grantees locate their own wrap by hashing
//! their own key; a miss is the non-fatal [`SealError::AccessDenied`].

use crate::cipher::{EntryKey, NONCE_SIZE};
use crate::error::{SealError, SealResult};
use crate::keys::AgentKeys;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey as ExchangePublicKey, StaticSecret as ExchangeSecret};

/// Domain separation string for the wrap-key HKDF
const WRAP_INFO: &[u8] = b"blindjournal-key-wrap-v1";

/// Context string for hashing grantee exchange keys
const GRANTEE_HASH_CONTEXT: &str = "blindjournal-grantee-v1";

/// One grantee's wrapped copy of an entry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// BLAKE3 hash of the grantee's X25519 public key (lookup handle,
    /// reveals nothing to parties who don't already know that key)
    pub grantee_id_hash: [u8; 32],

    /// Ephemeral X25519 public key used for this wrap
    pub ephemeral_public_key: [u8; 32],

    /// Nonce for the wrap encryption
    pub nonce: [u8; NONCE_SIZE],

    /// Entry key encrypted under the HKDF-derived wrap key (32 bytes of
    /// key + 16-byte tag)
    pub wrapped_key: Vec<u8>,
}

/// The full set of per-grantee wrapped keys attached to one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Wrapped entry keys, one per authorized grantee
    pub grants: Vec<WrappedKey>,
}

impl AccessPolicy {
    /// An empty policy: only the author can read the entry.
    pub fn author_only() -> Self {
        Self::default()
    }

    /// Wrap an entry key for each grantee exchange key.
    ///
    /// Each grantee gets an independent ephemeral keypair and nonce, so
    /// grants reveal nothing about one another.
    ///
    /// # Errors
    ///
    /// Returns `SealError::Entropy` if ephemeral key generation fails,
    /// or `SealError::Encryption` if a wrap fails.
    pub fn wrap(entry_key: &EntryKey, grantees: &[ExchangePublicKey]) -> SealResult<Self> {
        let mut grants = Vec::with_capacity(grantees.len());
        for grantee in grantees {
            grants.push(wrap_for_grantee(entry_key, grantee)?);
        }
        Ok(Self { grants })
    }

    /// Recover the entry key as a grantee.
    ///
    /// Scans the grants for the caller's hashed exchange key and unwraps
    /// the match.
    ///
    /// # Errors
    ///
    /// - `SealError::AccessDenied` if no grant carries the caller's hash
    ///   (expected outcome for unauthorized readers)
    /// - `SealError::Authentication` if a matching grant fails to unwrap
    ///   (corrupted or forged policy entry)
    pub fn unwrap(&self, grantee_keys: &AgentKeys) -> SealResult<EntryKey> {
        let own_hash = hash_grantee_key(&grantee_keys.exchange_public_key());

        let grant = self
            .grants
            .iter()
            .find(|g| g.grantee_id_hash == own_hash)
            .ok_or(SealError::AccessDenied)?;

        unwrap_grant(grant, grantee_keys.exchange_secret())
    }

    /// Number of grantees in this policy.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether the policy grants access to nobody beyond the author.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Hash a grantee's exchange public key into its policy lookup handle.
pub fn hash_grantee_key(exchange_public_key: &ExchangePublicKey) -> [u8; 32] {
    blake3::derive_key(GRANTEE_HASH_CONTEXT, exchange_public_key.as_bytes())
}

fn wrap_for_grantee(
    entry_key: &EntryKey,
    grantee: &ExchangePublicKey,
) -> SealResult<WrappedKey> {
    // Fresh ephemeral keypair per grant
    let mut ephemeral_seed = [0u8; 32];
    getrandom::getrandom(&mut ephemeral_seed)
        .map_err(|e| SealError::Entropy(format!("Failed to generate ephemeral key: {}", e)))?;
    let ephemeral_secret = ExchangeSecret::from(ephemeral_seed);
    let ephemeral_public = ExchangePublicKey::from(&ephemeral_secret);

    let shared = ephemeral_secret.diffie_hellman(grantee);
    let wrap_key = derive_wrap_key(shared.as_bytes());

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new((&wrap_key).into());
    let wrapped_key = cipher
        .encrypt(XNonce::from_slice(&nonce), entry_key.as_bytes().as_slice())
        .map_err(|e| SealError::Encryption(format!("Key wrap failed: {}", e)))?;

    Ok(WrappedKey {
        grantee_id_hash: hash_grantee_key(grantee),
        ephemeral_public_key: *ephemeral_public.as_bytes(),
        nonce,
        wrapped_key,
    })
}

fn unwrap_grant(grant: &WrappedKey, exchange_secret: &ExchangeSecret) -> SealResult<EntryKey> {
    let ephemeral_public = ExchangePublicKey::from(grant.ephemeral_public_key);
    let shared = exchange_secret.diffie_hellman(&ephemeral_public);
    let wrap_key = derive_wrap_key(shared.as_bytes());

    let cipher = XChaCha20Poly1305::new((&wrap_key).into());
    let key_bytes = cipher
        .decrypt(XNonce::from_slice(&grant.nonce), grant.wrapped_key.as_slice())
        .map_err(|e| SealError::Authentication(format!("Key unwrap failed: {}", e)))?;

    let arr: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| SealError::Format("Unwrapped entry key has wrong length".to_string()))?;
    Ok(EntryKey::from_bytes(arr))
}

/// Derive the 32-byte wrap key from an X25519 shared secret.
fn derive_wrap_key(shared_secret: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut output = [0u8; 32];
    hkdf.expand(WRAP_INFO, &mut output)
        .expect("HKDF expand should never fail with 32-byte output");
    output
}
