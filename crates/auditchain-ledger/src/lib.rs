//! # auditchain-ledger
//!
//! Tamper-evident, append-only audit log for the inventory/helpdesk backend.
//! Every administrative or inventory action becomes an `AuditBlock` linked
//! to its predecessor by SHA-256 and signed with HMAC-SHA256.
//!
//! ## Overview
//!
//! - `ChainRecorder` builds and appends blocks, serializing appends so two
//!   events can never claim the same tail.
//! - `ChainVerifier` re-walks the stored chain and reports every block whose
//!   stored hash or signature disagrees with a fresh recomputation.
//! - `InMemoryChainStore` and `JsonlChainStore` implement the `ChainStore`
//!   port.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use auditchain_ledger::{ChainRecorder, ChainVerifier, JsonlChainStore};
//!
//! let store = Arc::new(JsonlChainStore::open("audit_chain.jsonl").await?);
//! let recorder = ChainRecorder::new(store.clone(), config.clone());
//! let verifier = ChainVerifier::new(store, config);
//!
//! recorder.record_event("CREATE_DEVICE", "dev-1", "user-A", Some(json!({"type": "PC"}))).await?;
//! assert!(verifier.verify_chain().await?.valid);
//! ```

pub mod jsonl;
pub mod memory;
pub mod recorder;
pub mod verifier;

pub use jsonl::JsonlChainStore;
pub use memory::InMemoryChainStore;
pub use recorder::ChainRecorder;
pub use verifier::ChainVerifier;

// ── Tests ─────────────────────────────────────────────────────────────────────
