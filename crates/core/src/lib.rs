//! Posting and recognition logic for Defter.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Every function takes the state it needs (period status, purpose mappings,
//! stored rows) as arguments; persistence lives in `defter-db`.
//!
//! # Modules
//!
//! - `journal` - Balanced double-entry posting and reversal
//! - `idempotency` - Replay keys, scopes, and request fingerprints
//! - `fx` - Exchange-rate resolution and snapshots
//! - `settlement` - Cash allocation against open items
//! - `recognition` - Recognition schedules and the run life cycle
//! - `reconciliation` - Bank statement rules and templates
//! - `fiscal` - Period status
//! - `purpose` - Purpose-account mappings

pub mod fiscal;
pub mod fx;
pub mod idempotency;
pub mod journal;
pub mod purpose;
pub mod recognition;
pub mod reconciliation;
pub mod settlement;
