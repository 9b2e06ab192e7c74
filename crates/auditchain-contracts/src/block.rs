//! The audit block: one immutable link in the chain.
//!
//! An `AuditBlock` is created exactly once, when an auditable action has
//! completed, and is never updated or deleted afterwards.  Its `hash` and
//! `signature` are always computed by the ledger, never supplied by callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Arbitrary structured event payload.  Opaque to the chain logic.
pub type Metadata = Map<String, Value>;

/// A single persisted entry in the audit hash chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditBlock {
    /// Position in the chain, starting at 1 with no gaps.
    pub block_number: u64,

    /// Event type, e.g. `CREATE_USER`.
    pub action: String,

    /// Identifier of the domain object the event concerns.
    pub entity_id: String,

    /// Identifier of the actor who triggered the event.
    pub user_id: String,

    /// UTC creation instant as naive ISO-8601 text with microseconds.
    ///
    /// Kept as text because the exact characters are part of the hashed
    /// payload; see [`AuditBlock::format_timestamp`].
    pub timestamp: String,

    /// Event payload.  Always an object, possibly empty; a stored `null`
    /// reads back as `{}`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: Metadata,

    /// SHA-256 (hex) of the canonical event payload.
    pub content_hash: String,

    /// `hash` of the preceding block, or [`AuditBlock::GENESIS_HASH`].
    pub previous_hash: String,

    /// SHA-256 (hex) of `previous_hash + ":" + content_hash`.
    pub hash: String,

    /// HMAC-SHA256 (hex) of `hash` under the process secret.
    pub signature: String,
}

impl AuditBlock {
    /// The `previous_hash` of the first block: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// Render `instant` the way block timestamps are stored and hashed:
    /// `YYYY-MM-DDTHH:MM:SS.ffffff`, UTC, no offset suffix.
    pub fn format_timestamp(instant: DateTime<Utc>) -> String {
        instant.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }

    /// Returns true if this block claims to be the first in the chain.
    pub fn is_genesis(&self) -> bool {
        self.block_number == 1
    }
}

/// Action names emitted by the inventory/helpdesk backend.
///
/// The ledger does not restrict actions to this list.
pub mod actions {
    pub const CREATE_USER: &str = "CREATE_USER";
    pub const UPDATE_USER: &str = "UPDATE_USER";
    pub const CREATE_DEVICE: &str = "CREATE_DEVICE";
    pub const UPDATE_DEVICE: &str = "UPDATE_DEVICE";
    pub const GRANT_INVENTORY_ACCESS: &str = "GRANT_INVENTORY_ACCESS";
    pub const REVOKE_INVENTORY_ACCESS: &str = "REVOKE_INVENTORY_ACCESS";
    pub const BACKUP: &str = "BACKUP";
    pub const CLOSE_TICKET: &str = "CLOSE_TICKET";
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Metadata, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Metadata>::deserialize(deserializer)?.unwrap_or_default())
}
