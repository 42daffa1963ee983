//! API key pool with round-robin rotation and failure quarantine
//!
//! Holds up to `MAX_KEYS` API keys, hands them out round-robin among the
//! active ones, counts usage, and takes failing keys out of rotation. Every
//! mutation is written through to a `KeyValueStore` under the same lock that
//! guards the in-memory state.
//!
//! Key lifecycle:
//! 1. User adds a key → stored active with zero usage
//! 2. `next_credential` picks the next active key, bumps its usage, persists
//! 3. Upstream rejects the key (401/403 or daily quota) → `mark_failed`
//! 4. User resets failed keys, or re-enables one via `update`

pub mod error;
pub mod failover;
pub mod pool;
pub mod quota;
pub mod store;

pub use error::{Error, Result};
pub use failover::send_with_failover;
pub use pool::{Credential, CredentialPool, MAX_KEYS};
pub use quota::classify_status;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoredValue};
