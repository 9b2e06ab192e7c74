//! # auditchain-contracts
//!
//! Shared types for the auditchain ledger: the audit block, verification
//! reports, the error enum, and startup configuration.
//!
//! All crates in the workspace import from here. No hashing or storage logic
//! lives in this crate.

pub mod block;
pub mod config;
pub mod error;
pub mod report;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use block::AuditBlock;
    use config::{AuditSecret, ChainConfig, PLACEHOLDER_SECRET};
    use error::ChainError;
    use report::{AuditReceipt, CorruptedBlock, CorruptionKind, VerificationReport};

    fn sample_block() -> AuditBlock {
        AuditBlock {
            block_number: 1,
            action: "CREATE_DEVICE".to_string(),
            entity_id: "dev-1".to_string(),
            user_id: "user-A".to_string(),
            timestamp: "2024-05-01T10:00:00.000000".to_string(),
            metadata: json!({ "type": "PC" }).as_object().cloned().unwrap(),
            content_hash: "c".repeat(64),
            previous_hash: AuditBlock::GENESIS_HASH.to_string(),
            hash: "a".repeat(64),
            signature: "b".repeat(64),
        }
    }

    // ── AuditBlock ───────────────────────────────────────────────────────────

    #[test]
    fn genesis_hash_is_64_zeros() {
        assert_eq!(AuditBlock::GENESIS_HASH.len(), 64);
        assert!(AuditBlock::GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn timestamp_format_is_naive_iso_with_micros() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(
            AuditBlock::format_timestamp(instant),
            "2024-03-09T07:05:01.000042"
        );
    }

    #[test]
    fn block_without_metadata_deserializes_to_empty_object() {
        let mut value = serde_json::to_value(sample_block()).unwrap();
        value.as_object_mut().unwrap().remove("metadata");

        let block: AuditBlock = serde_json::from_value(value).unwrap();
        assert!(block.metadata.is_empty());
        assert!(block.is_genesis());
    }

    #[test]
    fn block_with_null_metadata_deserializes_to_empty_object() {
        let mut value = serde_json::to_value(sample_block()).unwrap();
        value["metadata"] = serde_json::Value::Null;

        let line = serde_json::to_string(&value).unwrap();
        assert!(line.contains(r#""metadata":null"#));

        let block: AuditBlock = serde_json::from_str(&line).unwrap();
        assert!(block.metadata.is_empty());
        assert_eq!(block.hash, "a".repeat(64));
    }

    // ── VerificationReport ───────────────────────────────────────────────────

    #[test]
    fn empty_report_is_valid() {
        let report = VerificationReport::empty();
        assert!(report.valid);
        assert_eq!(report.total_blocks, 0);
        assert!(report.corrupted_blocks.is_empty());
    }

    #[test]
    fn report_with_corruption_is_invalid_and_serializes_snake_case() {
        let report = VerificationReport::from_walk(
            3,
            vec![CorruptedBlock {
                block_number: 2,
                stored_hash: "a".repeat(64),
                expected_hash: "b".repeat(64),
                kinds: vec![CorruptionKind::ChainHashMismatch],
            }],
        );
        assert!(!report.valid);
        assert_eq!(report.corrupted_numbers(), vec![2]);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["total_blocks"], 3);
        assert_eq!(value["corrupted_blocks"][0]["kinds"][0], "chain_hash_mismatch");
    }

    #[test]
    fn receipt_exposes_block_only_when_recorded() {
        let recorded = AuditReceipt::Recorded(sample_block());
        assert!(recorded.is_recorded());
        assert_eq!(recorded.block().map(|b| b.block_number), Some(1));

        let failed = AuditReceipt::Failed {
            reason: "store down".to_string(),
        };
        assert!(!failed.is_recorded());
        assert!(failed.block().is_none());
    }

    // ── ChainConfig ──────────────────────────────────────────────────────────

    #[test]
    fn config_from_full_toml() {
        let config = ChainConfig::from_toml_str(
            r#"
            [audit]
            secret = "s3cret"
            store_timeout_ms = 250
            max_conflict_retries = 7
            "#,
        )
        .unwrap();

        assert!(!config.secret.is_placeholder());
        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.max_conflict_retries, 7);
    }

    #[test]
    fn config_without_secret_uses_placeholder() {
        let config = ChainConfig::from_toml_str("").unwrap();
        assert!(config.secret.is_placeholder());
        assert_eq!(config.secret.as_bytes(), PLACEHOLDER_SECRET.as_bytes());
    }

    #[test]
    fn config_rejects_empty_secret_and_zero_timeout() {
        let err = ChainConfig::from_toml_str("[audit]\nsecret = \"\"\n").unwrap_err();
        assert!(matches!(err, ChainError::Config { .. }));

        let err = ChainConfig::from_toml_str("[audit]\nstore_timeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("store_timeout_ms"));
    }

    #[test]
    fn config_rejects_unknown_keys() {
        let err = ChainConfig::from_toml_str("[audit]\nsecert = \"typo\"\n").unwrap_err();
        assert!(err.to_string().contains("failed to parse config TOML"));
    }

    #[test]
    fn config_from_lookup_reads_audit_variables() {
        let config = ChainConfig::from_lookup(|key| match key {
            "AUDIT_SECRET" => Some("from-env".to_string()),
            "AUDIT_STORE_TIMEOUT_MS" => Some("1500".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.secret, AuditSecret::new("from-env").unwrap());
        assert_eq!(config.store_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn config_from_lookup_fails_fast_on_garbage() {
        let err = ChainConfig::from_lookup(|key| {
            (key == "AUDIT_MAX_CONFLICT_RETRIES").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("AUDIT_MAX_CONFLICT_RETRIES"));
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = AuditSecret::new("super-secret-value").unwrap();
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("redacted"));
    }

    // ── ChainError display messages ──────────────────────────────────────────

    #[test]
    fn error_storage_display() {
        let msg = ChainError::storage("connection refused").to_string();
        assert!(msg.contains("record store error"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn error_conflict_display() {
        let err = ChainError::ConcurrencyConflict {
            block_number: 4,
            reason: "tail moved".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("block 4"));
        assert!(msg.contains("tail moved"));
    }

    #[test]
    fn error_timeout_display() {
        let err = ChainError::Timeout {
            operation: "append_block".to_string(),
            timeout_ms: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("append_block"));
        assert!(msg.contains("100 ms"));
    }

    #[test]
    fn error_validation_display() {
        let msg = ChainError::validation("action must not be empty").to_string();
        assert!(msg.contains("invalid audit event"));
        assert!(msg.contains("action"));
    }
}
