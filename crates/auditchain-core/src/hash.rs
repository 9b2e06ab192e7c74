//! Hash engine: content hashes, chain hashes and HMAC signatures.
//!
//! Every function here is pure.  The exact byte layout of each input is part
//! of the on-disk format, so it is spelled out explicitly:
//!
//!   content hash = SHA-256( canonical JSON of
//!                  {action, data, entity_id, timestamp, user_id} )
//!   chain hash   = SHA-256( previous_hash ":" content_hash )
//!   signature    = HMAC-SHA256( secret, chain_hash )
//!
//! All digests are rendered as lowercase hex.
//!
//! Canonical JSON sorts object keys at every depth, separates items with
//! `", "` and keys from values with `": "`, and escapes everything outside
//! printable ASCII as `\uXXXX`.  This matches the chains already written by
//! the helpdesk backend, so existing data re-verifies byte for byte.

use std::fmt::Write as _;

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use auditchain_contracts::{block::Metadata, config::AuditSecret};

type HmacSha256 = Hmac<Sha256>;

/// Hash the canonical event payload.
///
/// `metadata` is hashed under the key `data`; an empty map is hashed as `{}`.
pub fn compute_content_hash(
    action: &str,
    entity_id: &str,
    user_id: &str,
    timestamp: &str,
    metadata: &Metadata,
) -> String {
    let mut payload = Map::new();
    payload.insert("action".to_string(), Value::String(action.to_string()));
    payload.insert("data".to_string(), Value::Object(metadata.clone()));
    payload.insert("entity_id".to_string(), Value::String(entity_id.to_string()));
    payload.insert("timestamp".to_string(), Value::String(timestamp.to_string()));
    payload.insert("user_id".to_string(), Value::String(user_id.to_string()));

    sha256_hex(canonical_json(&Value::Object(payload)).as_bytes())
}

/// Bind a content hash to its predecessor.
pub fn compute_chain_hash(previous_hash: &str, content_hash: &str) -> String {
    sha256_hex(format!("{}:{}", previous_hash, content_hash).as_bytes())
}

/// HMAC-SHA256 of `chain_hash` under `secret`.
///
/// # Panics
///
/// Never in practice: HMAC accepts keys of any length.
pub fn compute_signature(secret: &AuditSecret, chain_hash: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(chain_hash.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check `signature` against the HMAC of `chain_hash` in constant time.
///
/// Malformed hex is reported as an invalid signature.
pub fn verify_signature(secret: &AuditSecret, chain_hash: &str, signature: &str) -> bool {
    let Ok(tag) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(chain_hash.as_bytes());
    mac.verify_slice(&tag).is_ok()
}

/// Render `value` as canonical JSON text.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sorted explicitly: serde_json's map order depends on features.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (idx, (key, item)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    // Writing to a String cannot fail.
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn meta(value: Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn canonical_json_sorts_keys_at_every_depth() {
        let value = json!({ "b": 1, "a": { "z": true, "m": [1, { "y": null, "x": "s" }] } });
        assert_eq!(
            canonical_json(&value),
            r#"{"a": {"m": [1, {"x": "s", "y": null}], "z": true}, "b": 1}"#
        );
    }

    #[test]
    fn canonical_json_escapes_non_ascii_and_controls() {
        let value = json!({ "estado": "reparación", "emoji": "😀", "ctl": "a\u{01}\"\\\n" });
        assert_eq!(
            canonical_json(&value),
            r#"{"ctl": "a\u0001\"\\\n", "emoji": "\ud83d\ude00", "estado": "reparaci\u00f3n"}"#
        );
    }

    #[test]
    fn empty_payload_renders_as_braces() {
        assert_eq!(canonical_json(&json!({})), "{}");
        assert_eq!(canonical_json(&json!([])), "[]");
    }

    #[test]
    fn content_hash_ignores_key_insertion_order() {
        let mut forward = Metadata::new();
        forward.insert("type".to_string(), json!("PC"));
        forward.insert("room".to_string(), json!({ "floor": 2, "building": "B" }));

        let mut backward = Metadata::new();
        backward.insert("room".to_string(), json!({ "building": "B", "floor": 2 }));
        backward.insert("type".to_string(), json!("PC"));

        let ts = "2024-05-01T10:00:00.000000";
        assert_eq!(
            compute_content_hash("CREATE_DEVICE", "dev-1", "user-A", ts, &forward),
            compute_content_hash("CREATE_DEVICE", "dev-1", "user-A", ts, &backward),
        );
    }

    /// Digests produced by the helpdesk backend for the same event.
    #[test]
    fn digests_match_existing_backend_chain() {
        let ts = "2024-05-01T10:00:00.000000";
        let content = compute_content_hash(
            "CREATE_DEVICE",
            "dev-1",
            "user-A",
            ts,
            &meta(json!({ "type": "PC" })),
        );
        assert_eq!(
            content,
            "cb130c6047cf6da0355e0e01380a19abbeed5349211c83dbb49a21c58ab186f6"
        );

        let chain = compute_chain_hash(&"0".repeat(64), &content);
        assert_eq!(
            chain,
            "5ba7f64f7898115474db70dda3221de3805e99441030f7b70bb606d1b26a9bf6"
        );

        let secret = AuditSecret::new("test-secret").unwrap();
        assert_eq!(
            compute_signature(&secret, &chain),
            "cafc678889b81aeac03e25a3a7e8ddb69637b1bbda61442d0078750e9baa8222"
        );
    }

    #[test]
    fn content_hash_changes_with_any_field() {
        let ts = "2024-05-01T10:00:00.000000";
        let base = compute_content_hash("A", "e", "u", ts, &Metadata::new());
        assert_ne!(base, compute_content_hash("B", "e", "u", ts, &Metadata::new()));
        assert_ne!(base, compute_content_hash("A", "f", "u", ts, &Metadata::new()));
        assert_ne!(base, compute_content_hash("A", "e", "v", ts, &Metadata::new()));
        assert_ne!(
            base,
            compute_content_hash("A", "e", "u", "2024-05-01T10:00:00.000001", &Metadata::new())
        );
        assert_ne!(base, compute_content_hash("A", "e", "u", ts, &meta(json!({ "k": 1 }))));
    }

    #[test]
    fn chain_hash_uses_colon_separator() {
        let prev = "0".repeat(64);
        let content = "f".repeat(64);
        assert_eq!(
            compute_chain_hash(&prev, &content),
            sha256_hex(format!("{}:{}", prev, content).as_bytes())
        );
        assert_eq!(compute_chain_hash(&prev, &content).len(), 64);
    }

    #[test]
    fn signature_matches_rfc4231_case_2() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let secret = AuditSecret::new("Jefe").unwrap();
        assert_eq!(
            compute_signature(&secret, "what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signature_depends_on_secret() {
        let a = AuditSecret::new("key-a").unwrap();
        let b = AuditSecret::new("key-b").unwrap();
        let hash = "1".repeat(64);
        assert_ne!(compute_signature(&a, &hash), compute_signature(&b, &hash));
    }

    #[test]
    fn verify_signature_accepts_only_matching_tag() {
        let secret = AuditSecret::new("key").unwrap();
        let hash = "2".repeat(64);
        let tag = compute_signature(&secret, &hash);

        assert!(verify_signature(&secret, &hash, &tag));
        assert!(!verify_signature(&secret, &"3".repeat(64), &tag));
        assert!(!verify_signature(&secret, &hash, "not-hex"));
        assert!(!verify_signature(&AuditSecret::new("other").unwrap(), &hash, &tag));
    }
}
