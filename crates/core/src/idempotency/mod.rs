//! Idempotency guard primitives.
//!
//! The database enforces at-most-one effect through a unique index on
//! `(tenant, scope, key)`; this module supplies the typed key, the scope string,
//! the request fingerprint, and the replay-or-conflict decision.

pub mod error;
pub mod key;

pub use error::IdempotencyError;
pub use key::{IdempotencyKey, IdempotencyScope, Idempotent, RequestFingerprint, verify_replay};
