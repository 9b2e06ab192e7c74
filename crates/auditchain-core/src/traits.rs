//! The record-store port.
//!
//! `ChainStore` is the only seam through which the ledger touches persisted
//! blocks.  Implementations are **trusted-but-fallible**: they may be
//! unreachable or reject writes, but they never compute hashes themselves.
//!
//! Every method is an awaitable, cancellable operation; callers wrap each one
//! in their own timeout.

use async_trait::async_trait;

use auditchain_contracts::{block::AuditBlock, error::ChainResult};

/// Ordered, append-only storage for audit blocks.
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// The `hash` of the block with the highest `block_number`, or
    /// `AuditBlock::GENESIS_HASH` when the chain is empty.
    async fn tail_hash(&self) -> ChainResult<String>;

    /// Total number of persisted blocks.  Zero for an empty chain.
    async fn block_count(&self) -> ChainResult<u64>;

    /// Insert one fully formed block.
    ///
    /// This is a conditional insert.  Implementations must return
    /// `ChainError::ConcurrencyConflict` when `block.block_number` is not
    /// `block_count() + 1` or `block.previous_hash` is not `tail_hash()` at
    /// the moment of the write, and `ChainError::Storage` when the store is
    /// unreachable or rejects the record (e.g. a duplicate `hash`).
    async fn append_block(&self, block: &AuditBlock) -> ChainResult<()>;

    /// Every block, ascending by `block_number`.
    async fn list_blocks(&self) -> ChainResult<Vec<AuditBlock>>;

    /// Blocks concerning `entity_id`, descending by `block_number`.
    async fn blocks_by_entity(&self, entity_id: &str) -> ChainResult<Vec<AuditBlock>>;

    /// Point lookup by chain hash.
    async fn block_by_hash(&self, hash: &str) -> ChainResult<Option<AuditBlock>>;
}
