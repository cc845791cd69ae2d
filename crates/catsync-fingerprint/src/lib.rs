//! catsync Fingerprints
//!
//! Short, deterministic content hashes used to decide whether a metadata
//! entity changed between ingestion runs.
//!
//! # Core Concepts
//!
//! - [`Fingerprint`]: 16-byte Blake3 digest, rendered as 32 hex chars
//! - [`canonical_json`]: key-sorted JSON encoding the digest is taken over
//!
//! # Example
//!
//! ```rust,ignore
//! use catsync_fingerprint::Fingerprint;
//!
//! let request = serde_json::json!({"name": "orders", "id": "server-assigned"});
//! let fp = Fingerprint::of_serializable(&request, &["id"])?;
//! assert!(fp.matches(&fp.to_string()));
//! ```

#![warn(missing_docs, unreachable_pub)]

mod canonical;
mod fingerprint;

pub use canonical::{canonical_json, strip_fields};
pub use fingerprint::{Fingerprint, FingerprintError, FINGERPRINT_LEN};
