//! In-memory implementation of `ChainStore`.
//!
//! `InMemoryChainStore` keeps every block in a `Vec` behind a Tokio
//! `RwLock`.  It enforces the same conditional-insert contract as a real
//! record store, so recorder races surface as `ConcurrencyConflict` here too.
//!
//! An availability switch lets callers simulate an unreachable backend.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use auditchain_contracts::{
    block::AuditBlock,
    error::{ChainError, ChainResult},
};
use auditchain_core::traits::ChainStore;

/// A volatile, process-local record store.
pub struct InMemoryChainStore {
    /// All blocks in append order, which is also `block_number` order.
    pub(crate) blocks: RwLock<Vec<AuditBlock>>,
    available: AtomicBool,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent call succeed (`true`) or fail with
    /// `ChainError::Storage` (`false`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> ChainResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChainError::storage("in-memory store is unavailable"))
        }
    }
}

impl Default for InMemoryChainStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the conditional-insert rules to `block` against the current chain.
///
/// Shared by every store implementation in this crate.
pub(crate) fn check_append(blocks: &[AuditBlock], block: &AuditBlock) -> ChainResult<()> {
    let expected_number = blocks.len() as u64 + 1;
    if block.block_number != expected_number {
        return Err(ChainError::ConcurrencyConflict {
            block_number: block.block_number,
            reason: format!("expected block number {}", expected_number),
        });
    }

    let tail = blocks
        .last()
        .map(|b| b.hash.as_str())
        .unwrap_or(AuditBlock::GENESIS_HASH);
    if block.previous_hash != tail {
        return Err(ChainError::ConcurrencyConflict {
            block_number: block.block_number,
            reason: "previous_hash does not match the current tail".to_string(),
        });
    }

    if blocks.iter().any(|b| b.hash == block.hash) {
        return Err(ChainError::storage(format!(
            "duplicate block hash {}",
            block.hash
        )));
    }

    Ok(())
}

/// Blocks for `entity_id`, newest first.
pub(crate) fn entity_blocks(blocks: &[AuditBlock], entity_id: &str) -> Vec<AuditBlock> {
    blocks
        .iter()
        .rev()
        .filter(|b| b.entity_id == entity_id)
        .cloned()
        .collect()
}

#[async_trait]
impl ChainStore for InMemoryChainStore {
    async fn tail_hash(&self) -> ChainResult<String> {
        self.ensure_available()?;
        let blocks = self.blocks.read().await;
        Ok(blocks
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_else(|| AuditBlock::GENESIS_HASH.to_string()))
    }

    async fn block_count(&self) -> ChainResult<u64> {
        self.ensure_available()?;
        Ok(self.blocks.read().await.len() as u64)
    }

    async fn append_block(&self, block: &AuditBlock) -> ChainResult<()> {
        self.ensure_available()?;
        let mut blocks = self.blocks.write().await;
        check_append(&blocks, block)?;
        blocks.push(block.clone());

        debug!(block_number = block.block_number, "block appended to in-memory store");
        Ok(())
    }

    async fn list_blocks(&self) -> ChainResult<Vec<AuditBlock>> {
        self.ensure_available()?;
        Ok(self.blocks.read().await.clone())
    }

    async fn blocks_by_entity(&self, entity_id: &str) -> ChainResult<Vec<AuditBlock>> {
        self.ensure_available()?;
        Ok(entity_blocks(&self.blocks.read().await, entity_id))
    }

    async fn block_by_hash(&self, hash: &str) -> ChainResult<Option<AuditBlock>> {
        self.ensure_available()?;
        Ok(self
            .blocks
            .read()
            .await
            .iter()
            .find(|b| b.hash == hash)
            .cloned())
    }
}
