//! The chain verifier: an independent, read-only pass over stored blocks.
//!
//! Nothing stored is trusted.  For every block the verifier recomputes the
//! content hash from the stored event fields, the chain hash from the
//! *previous stored* hash, and the signature from the recomputed chain hash.
//!
//! After checking a block the walk advances with that block's stored `hash`,
//! not the recomputed one.  A single tampered block is therefore reported on
//! its own instead of flagging every block after it.

use std::sync::Arc;

use tracing::{info, warn};

use auditchain_contracts::{
    block::AuditBlock,
    config::ChainConfig,
    error::ChainResult,
    report::{CorruptedBlock, CorruptionKind, HashLookup, VerificationReport},
};
use auditchain_core::{
    hash::{compute_chain_hash, compute_content_hash, verify_signature},
    traits::ChainStore,
};

use crate::recorder::with_timeout;

/// Verifies the integrity of the chain held in a `ChainStore`.
pub struct ChainVerifier {
    store: Arc<dyn ChainStore>,
    config: ChainConfig,
}

impl ChainVerifier {
    pub fn new(store: Arc<dyn ChainStore>, config: ChainConfig) -> Self {
        if config.secret.is_placeholder() {
            warn!("audit chain is verified with the placeholder secret; set AUDIT_SECRET in production");
        }
        Self { store, config }
    }

    /// Walk the whole chain and report every corrupted block.
    ///
    /// Corruption never produces an `Err`; only a failing store does.
    pub async fn verify_chain(&self) -> ChainResult<VerificationReport> {
        let blocks = with_timeout(
            self.config.store_timeout,
            "list_blocks",
            self.store.list_blocks(),
        )
        .await?;

        if blocks.is_empty() {
            info!("audit chain is empty; nothing to verify");
            return Ok(VerificationReport::empty());
        }

        let mut corrupted = Vec::new();
        let mut expected_previous = AuditBlock::GENESIS_HASH.to_string();
        let mut previous_number = 0u64;

        for block in &blocks {
            if let Some(finding) = self.check_block(block, &expected_previous, previous_number) {
                warn!(
                    block_number = finding.block_number,
                    stored_hash = %finding.stored_hash,
                    expected_hash = %finding.expected_hash,
                    kinds = ?finding.kinds,
                    "corrupted audit block"
                );
                corrupted.push(finding);
            }

            expected_previous = block.hash.clone();
            previous_number = block.block_number;
        }

        let report = VerificationReport::from_walk(blocks.len() as u64, corrupted);
        info!(
            valid = report.valid,
            total_blocks = report.total_blocks,
            corrupted = report.corrupted_blocks.len(),
            "audit chain verified"
        );
        Ok(report)
    }

    /// Recompute everything derivable for `block` and compare.
    fn check_block(
        &self,
        block: &AuditBlock,
        expected_previous: &str,
        previous_number: u64,
    ) -> Option<CorruptedBlock> {
        let content_hash = compute_content_hash(
            &block.action,
            &block.entity_id,
            &block.user_id,
            &block.timestamp,
            &block.metadata,
        );
        let expected_hash = compute_chain_hash(expected_previous, &content_hash);

        let mut kinds = Vec::new();
        if block.hash != expected_hash {
            kinds.push(CorruptionKind::ChainHashMismatch);
        }
        if !verify_signature(&self.config.secret, &expected_hash, &block.signature) {
            kinds.push(CorruptionKind::SignatureMismatch);
        }
        if block.content_hash != content_hash {
            kinds.push(CorruptionKind::ContentHashMismatch);
        }
        if block.previous_hash != expected_previous {
            kinds.push(CorruptionKind::BrokenLink);
        }
        if block.block_number != previous_number + 1 {
            kinds.push(CorruptionKind::NumberingGap);
        }

        if kinds.is_empty() {
            return None;
        }
        Some(CorruptedBlock {
            block_number: block.block_number,
            stored_hash: block.hash.clone(),
            expected_hash,
            kinds,
        })
    }

    /// Look up `hash` and check the stored signature against it.
    pub async fn lookup_hash(&self, hash: &str) -> ChainResult<HashLookup> {
        let block = with_timeout(
            self.config.store_timeout,
            "block_by_hash",
            self.store.block_by_hash(hash),
        )
        .await?;

        let valid = block
            .as_ref()
            .is_some_and(|b| verify_signature(&self.config.secret, hash, &b.signature));

        Ok(HashLookup { valid, block })
    }

    /// True when a block with this `hash` exists and carries the signature
    /// the secret produces for it.  An unknown hash is `false`, not an error.
    pub async fn verify_block_signature(&self, hash: &str) -> ChainResult<bool> {
        Ok(self.lookup_hash(hash).await?.valid)
    }

    /// The audit history of one entity, newest block first.
    pub async fn entity_history(&self, entity_id: &str) -> ChainResult<Vec<AuditBlock>> {
        with_timeout(
            self.config.store_timeout,
            "blocks_by_entity",
            self.store.blocks_by_entity(entity_id),
        )
        .await
    }
}
