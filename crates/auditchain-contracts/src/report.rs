//! Verification and recording outcomes.
//!
//! Corruption is a reportable fact, not an error: the verifier returns a
//! `VerificationReport` listing every suspicious block instead of failing.

use serde::{Deserialize, Serialize};

use crate::block::AuditBlock;

/// Why a block was flagged during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionKind {
    /// Stored `hash` differs from the hash recomputed over the stored content
    /// and the preceding stored hash.
    ChainHashMismatch,
    /// Stored `signature` differs from the HMAC of the expected chain hash.
    SignatureMismatch,
    /// Stored `content_hash` differs from the recomputed content hash.
    ContentHashMismatch,
    /// Stored `previous_hash` does not equal the preceding block's `hash`.
    BrokenLink,
    /// `block_number` is not one more than the preceding block's number.
    NumberingGap,
}

/// One block that failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorruptedBlock {
    pub block_number: u64,
    /// The `hash` value found in the store.
    pub stored_hash: String,
    /// The chain hash the verifier recomputed.
    pub expected_hash: String,
    pub kinds: Vec<CorruptionKind>,
}

/// Result of a full walk over the stored chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub total_blocks: u64,
    pub corrupted_blocks: Vec<CorruptedBlock>,
}

impl VerificationReport {
    /// The report for a chain with no blocks.
    pub fn empty() -> Self {
        Self {
            valid: true,
            total_blocks: 0,
            corrupted_blocks: Vec::new(),
        }
    }

    /// Build a report from the walk results; `valid` follows from `corrupted`.
    pub fn from_walk(total_blocks: u64, corrupted_blocks: Vec<CorruptedBlock>) -> Self {
        Self {
            valid: corrupted_blocks.is_empty(),
            total_blocks,
            corrupted_blocks,
        }
    }

    /// Block numbers of every corrupted block, in chain order.
    pub fn corrupted_numbers(&self) -> Vec<u64> {
        self.corrupted_blocks.iter().map(|c| c.block_number).collect()
    }
}

/// Result of the public hash lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashLookup {
    /// True when the block exists and its signature checks out.
    pub valid: bool,
    /// The stored block, if any.
    pub block: Option<AuditBlock>,
}

/// Outcome of an audit write made after the business operation committed.
///
/// Returned by `ChainRecorder::record_after_commit`, which never fails.  A
/// `Failed` receipt must be surfaced to the caller as a warning.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditReceipt {
    Recorded(AuditBlock),
    Failed { reason: String },
}

impl AuditReceipt {
    pub fn is_recorded(&self) -> bool {
        matches!(self, AuditReceipt::Recorded(_))
    }

    /// The recorded block, if the write succeeded.
    pub fn block(&self) -> Option<&AuditBlock> {
        match self {
            AuditReceipt::Recorded(block) => Some(block),
            AuditReceipt::Failed { .. } => None,
        }
    }
}
