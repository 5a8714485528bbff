//! Blind Journal CLI
//!
//! Thin wrapper around blindjournal-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Generate a master secret and show the derived public keys
//! blindjournal keygen --agent-id agent-alpha
//!
//! # Seal a journal entry (reads/advances the local chain state file)
//! blindjournal seal --secret <hex> --agent-id agent-alpha \
//!     --action message_sent --target bob --summary "hi" \
//!     --disclose target_type=agent --grant <exchange-pk-hex> \
//!     --out entry.json
//!
//! # Verify an entry against the author's public key
//! blindjournal verify --entry entry.json --public-key <hex>
//!
//! # Open an entry as the author (or as a grantee)
//! blindjournal open --entry entry.json --secret <hex> --agent-id agent-alpha
//! blindjournal open --entry entry.json --secret <hex> --agent-id agent-beta --as-grantee
//!
//! # Show only the disclosed (relay-indexable) attributes
//! blindjournal attrs --entry entry.json
//!
//! # Show the local chain head
//! blindjournal chain-head --agent-id agent-alpha
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use blindjournal_core::{
    AgentId, AgentKeys, ChainState, DisclosedAttributes, JournalPayload, MasterSecret,
    SecureEntry, Verification,
};
use clap::{Parser, Subcommand};

/// Blind Journal - sealed activity records for blind relays
#[derive(Parser)]
#[command(name = "blindjournal")]
#[command(version = "0.1.0")]
#[command(about = "Seal, verify, and open encrypted journal envelopes")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// State directory for chain cursors (default: ~/.blindjournal)
    #[arg(short, long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh master secret and show the derived public keys
    Keygen {
        /// Agent identity to derive keys for
        #[arg(short, long)]
        agent_id: String,

        /// Derive from an existing master secret (hex) instead of
        /// generating a new one
        #[arg(long)]
        secret: Option<String>,
    },

    /// Seal a plaintext payload into a secure entry
    Seal {
        /// Master secret (lowercase hex, 64 chars)
        #[arg(long)]
        secret: String,

        /// Author agent identity
        #[arg(short, long)]
        agent_id: String,

        /// Action performed (e.g. message_sent)
        #[arg(long)]
        action: String,

        /// Target of the action
        #[arg(long)]
        target: String,

        /// Human-readable summary
        #[arg(long)]
        summary: String,

        /// Encrypted metadata entries, key=value (repeatable)
        #[arg(long = "meta")]
        metadata: Vec<String>,

        /// Disclosed plaintext attributes, key=value (repeatable)
        #[arg(long = "disclose")]
        disclosed: Vec<String>,

        /// Grantee X25519 public keys (hex, repeatable)
        #[arg(long = "grant")]
        grantees: Vec<String>,

        /// Output file for the sealed entry (JSON)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Verify an entry's signature and chain continuity
    Verify {
        /// Sealed entry file (JSON)
        #[arg(short, long)]
        entry: PathBuf,

        /// Author's Ed25519 verifying key (hex)
        #[arg(short, long)]
        public_key: String,

        /// Chain state file holding the last verified position
        /// (defaults to genesis: verifying the agent's first entry)
        #[arg(long)]
        prev_state: Option<PathBuf>,
    },

    /// Decrypt an entry's payload
    Open {
        /// Sealed entry file (JSON)
        #[arg(short, long)]
        entry: PathBuf,

        /// Master secret (lowercase hex, 64 chars)
        #[arg(long)]
        secret: String,

        /// Reader agent identity
        #[arg(short, long)]
        agent_id: String,

        /// Unwrap the entry key from the access policy instead of
        /// re-deriving it as the author
        #[arg(long)]
        as_grantee: bool,
    },

    /// Show the disclosed (unencrypted) attributes of an entry
    Attrs {
        /// Sealed entry file (JSON)
        #[arg(short, long)]
        entry: PathBuf,
    },

    /// Show the local chain head for an agent
    ChainHead {
        /// Agent identity
        #[arg(short, long)]
        agent_id: String,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default state directory (~/.blindjournal)
fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".blindjournal")
}

/// Path of the chain state file for one agent
fn chain_state_path(state_dir: &PathBuf, agent_id: &AgentId) -> PathBuf {
    state_dir.join(format!("{}.chain.json", agent_id))
}

/// Load a chain state file, or start from genesis if it doesn't exist
fn load_chain_state(path: &PathBuf) -> Result<ChainState> {
    if !path.exists() {
        return Ok(ChainState::genesis());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read chain state {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Malformed chain state {}", path.display()))
}

fn save_chain_state(path: &PathBuf, state: &ChainState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(state)?)
        .with_context(|| format!("Failed to write chain state {}", path.display()))
}

fn load_entry(path: &PathBuf) -> Result<SecureEntry> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read entry {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Malformed entry {}", path.display()))
}

/// Parse repeated key=value arguments
fn parse_pairs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Expected key=value, got '{}'", pair))
        })
        .collect()
}

/// Parse a grantee X25519 public key from hex
fn parse_exchange_key(s: &str) -> Result<x25519_dalek::PublicKey> {
    let bytes = hex::decode(s).map_err(|e| anyhow::anyhow!("Invalid hex format: {}", e))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("Exchange key must be 32 bytes"))?;
    Ok(x25519_dalek::PublicKey::from(array))
}

fn derive_keys(secret_hex: &str, agent_id: &str) -> Result<AgentKeys> {
    let secret = MasterSecret::from_hex(secret_hex)?;
    let agent_id = AgentId::new(agent_id)?;
    Ok(AgentKeys::derive(&secret, &agent_id))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let state_dir = cli.state_dir.unwrap_or_else(default_state_dir);

    match cli.command {
        Commands::Keygen { agent_id, secret } => {
            let secret = match secret {
                Some(hex) => MasterSecret::from_hex(&hex)?,
                None => MasterSecret::generate()?,
            };
            let keys = AgentKeys::derive(&secret, &AgentId::new(agent_id)?);

            println!("Agent:        {}", keys.agent_id());
            println!("Master secret (back this up, never share it):");
            println!("  {}", secret.to_hex());
            println!("Verifying key (register with the relay):");
            println!("  {}", keys.verifying_key_hex());
            println!("Exchange key (share with authors who grant you access):");
            println!("  {}", hex::encode(keys.exchange_public_key().as_bytes()));
        }

        Commands::Seal {
            secret,
            agent_id,
            action,
            target,
            summary,
            metadata,
            disclosed,
            grantees,
            out,
        } => {
            let keys = derive_keys(&secret, &agent_id)?;

            let mut payload = JournalPayload::new(action, target, summary);
            for (key, value) in parse_pairs(&metadata)? {
                payload.metadata.insert(key, value);
            }

            let mut attributes = DisclosedAttributes::new();
            for (key, value) in parse_pairs(&disclosed)? {
                attributes.insert(key, value);
            }

            let grantee_keys = grantees
                .iter()
                .map(|g| parse_exchange_key(g))
                .collect::<Result<Vec<_>>>()?;

            let state_path = chain_state_path(&state_dir, keys.agent_id());
            let state = load_chain_state(&state_path)?;

            let (entry, new_state) =
                SecureEntry::seal(&payload, &keys, &state, &grantee_keys, attributes)?;

            // Entry and cursor must land together; write the entry
            // first so a failure leaves the cursor untouched
            std::fs::write(&out, serde_json::to_string_pretty(&entry)?)
                .with_context(|| format!("Failed to write entry {}", out.display()))?;
            save_chain_state(&state_path, &new_state)?;

            println!("Sealed entry {}", entry.id);
            println!("  agent:     {}", entry.agent_id);
            println!("  sequence:  {}", entry.sequence_number);
            println!("  chain link: {}", hex::encode(entry.chain_link));
            println!("  grantees:  {}", entry.access_policy.len());
            println!("  written to {}", out.display());
        }

        Commands::Verify {
            entry,
            public_key,
            prev_state,
        } => {
            let entry = load_entry(&entry)?;
            let verifying_key = blindjournal_core::verifying_key_from_hex(&public_key)?;
            let previous = match prev_state {
                Some(path) => load_chain_state(&path)?,
                None => ChainState::genesis(),
            };

            match entry.verify(&verifying_key, &previous) {
                Verification::Verified => {
                    println!("OK: signature valid, chain link verified");
                }
                outcome => {
                    println!("FAILED: {:?}", outcome);
                    std::process::exit(1);
                }
            }
        }

        Commands::Open {
            entry,
            secret,
            agent_id,
            as_grantee,
        } => {
            let entry = load_entry(&entry)?;
            let keys = derive_keys(&secret, &agent_id)?;

            let payload = if as_grantee {
                entry.open_as_grantee(&keys)?
            } else {
                entry.open(&keys)?
            };

            println!("{}", serde_json::to_string_pretty(&payload)?);
        }

        Commands::Attrs { entry } => {
            let entry = load_entry(&entry)?;
            println!("{}", serde_json::to_string_pretty(entry.disclosed())?);
        }

        Commands::ChainHead { agent_id } => {
            let agent_id = AgentId::new(agent_id)?;
            let state = load_chain_state(&chain_state_path(&state_dir, &agent_id))?;

            println!("Agent:     {}", agent_id);
            println!("Sequence:  {}", state.sequence_number);
            println!("Last link: {}", hex::encode(state.last_chain_hash));
        }
    }

    Ok(())
}
