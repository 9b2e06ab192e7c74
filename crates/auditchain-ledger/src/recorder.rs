//! The block builder: turns one auditable action into one persisted block.
//!
//! Appending reads shared tail state, so the whole read-tail / count / append
//! sequence runs as a critical section:
//!
//! 1. Inside one process, an async mutex (the append gate) admits one append
//!    at a time.
//! 2. Across processes, the store's conditional insert rejects a block whose
//!    `previous_hash` or `block_number` went stale.  The recorder then rebuilds
//!    the block from a fresh tail and tries again, up to
//!    `max_conflict_retries` times.
//!
//! The tail is never cached between events.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use auditchain_contracts::{
    block::{AuditBlock, Metadata},
    config::ChainConfig,
    error::{ChainError, ChainResult},
    report::AuditReceipt,
};
use auditchain_core::{
    hash::{compute_chain_hash, compute_content_hash, compute_signature},
    traits::ChainStore,
};

/// Appends audit blocks to a `ChainStore`.
///
/// Share one recorder per process (behind an `Arc`); every append in the
/// process then goes through the same gate.
pub struct ChainRecorder {
    store: Arc<dyn ChainStore>,
    config: ChainConfig,
    append_gate: Mutex<()>,
}

impl ChainRecorder {
    pub fn new(store: Arc<dyn ChainStore>, config: ChainConfig) -> Self {
        if config.secret.is_placeholder() {
            warn!("audit chain is signing with the placeholder secret; set AUDIT_SECRET in production");
        }
        Self {
            store,
            config,
            append_gate: Mutex::new(()),
        }
    }

    /// A fresh identifier for an entity that did not exist before the event.
    pub fn mint_entity_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Record one event and return the persisted block.
    ///
    /// # Errors
    ///
    /// - `Validation` if an identifier is blank or `metadata` is not an object
    /// - `Storage` if the store is unreachable or rejects the block
    /// - `ConcurrencyConflict` if the tail kept moving after every retry
    /// - `Timeout` if any store call exceeded `store_timeout`
    ///
    /// On any error the event is not recorded.
    pub async fn record_event(
        &self,
        action: &str,
        entity_id: &str,
        user_id: &str,
        metadata: Option<Value>,
    ) -> ChainResult<AuditBlock> {
        require_identifier("action", action)?;
        require_identifier("entity_id", entity_id)?;
        require_identifier("user_id", user_id)?;
        let metadata = normalize_metadata(metadata)?;

        let _gate = self.append_gate.lock().await;

        let mut attempt: u32 = 0;
        loop {
            match self.try_append(action, entity_id, user_id, &metadata).await {
                Ok(block) => {
                    info!(
                        block_number = block.block_number,
                        action = %block.action,
                        entity_id = %block.entity_id,
                        hash = %block.hash,
                        "audit block recorded"
                    );
                    return Ok(block);
                }
                Err(ChainError::ConcurrencyConflict {
                    block_number,
                    reason,
                }) if attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        block_number,
                        attempt,
                        reason = %reason,
                        "chain tail moved during append; retrying with a fresh tail"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Record an event whose business operation has already committed.
    ///
    /// The business change is not rolled back when the audit write fails.
    /// Instead the failure is logged at `error` level and returned as
    /// `AuditReceipt::Failed`, which the caller must surface as a warning.
    pub async fn record_after_commit(
        &self,
        action: &str,
        entity_id: &str,
        user_id: &str,
        metadata: Option<Value>,
    ) -> AuditReceipt {
        match self.record_event(action, entity_id, user_id, metadata).await {
            Ok(block) => AuditReceipt::Recorded(block),
            Err(e) => {
                error!(
                    action = %action,
                    entity_id = %entity_id,
                    error = %e,
                    "audit write failed after business commit; event is missing from the chain"
                );
                AuditReceipt::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// One pass of the critical section.  Caller holds the append gate.
    async fn try_append(
        &self,
        action: &str,
        entity_id: &str,
        user_id: &str,
        metadata: &Metadata,
    ) -> ChainResult<AuditBlock> {
        let timeout = self.config.store_timeout;

        let timestamp = AuditBlock::format_timestamp(Utc::now());
        let content_hash = compute_content_hash(action, entity_id, user_id, &timestamp, metadata);
        let previous_hash = with_timeout(timeout, "tail_hash", self.store.tail_hash()).await?;
        let hash = compute_chain_hash(&previous_hash, &content_hash);
        let signature = compute_signature(&self.config.secret, &hash);
        let block_number = with_timeout(timeout, "block_count", self.store.block_count()).await? + 1;

        let block = AuditBlock {
            block_number,
            action: action.to_string(),
            entity_id: entity_id.to_string(),
            user_id: user_id.to_string(),
            timestamp,
            metadata: metadata.clone(),
            content_hash,
            previous_hash,
            hash,
            signature,
        };

        debug!(block_number, previous_hash = %block.previous_hash, "appending audit block");
        with_timeout(timeout, "append_block", self.store.append_block(&block)).await?;
        Ok(block)
    }
}

/// Run one store call under `timeout`.  An elapsed timer cancels the call.
pub(crate) async fn with_timeout<T, F>(
    timeout: Duration,
    operation: &str,
    call: F,
) -> ChainResult<T>
where
    F: Future<Output = ChainResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            warn!(operation, timeout_ms, "store call timed out");
            Err(ChainError::Timeout {
                operation: operation.to_string(),
                timeout_ms,
            })
        }
    }
}

fn require_identifier(field: &str, value: &str) -> ChainResult<()> {
    if value.trim().is_empty() {
        return Err(ChainError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Absent and `null` metadata both become `{}`.
fn normalize_metadata(metadata: Option<Value>) -> ChainResult<Metadata> {
    match metadata {
        None | Some(Value::Null) => Ok(Metadata::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(ChainError::validation(format!(
            "metadata must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
