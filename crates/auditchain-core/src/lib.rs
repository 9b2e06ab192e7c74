//! # auditchain-core
//!
//! The pure hash engine and the record-store port of the auditchain ledger.
//!
//! This crate provides:
//! - `hash`: content hash, chain hash and HMAC signature functions
//! - `traits::ChainStore`: the async boundary to the backing record store
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auditchain_core::hash::{compute_chain_hash, compute_content_hash, compute_signature};
//!
//! let content = compute_content_hash("CREATE_USER", "u-1", "admin", &ts, &metadata);
//! let chain = compute_chain_hash(AuditBlock::GENESIS_HASH, &content);
//! let signature = compute_signature(&secret, &chain);
//! ```

pub mod hash;
pub mod traits;

pub use traits::ChainStore;
