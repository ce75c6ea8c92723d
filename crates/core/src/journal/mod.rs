//! Double-entry journal posting primitive.
//!
//! Every component that moves money funnels through this module:
//! - Posting lines carry signed transaction and base amounts
//! - `JournalService::prepare` enforces the balance invariant and period gate
//! - `JournalService::mirror` builds reversals through the same checks

pub mod error;
pub mod service;
pub mod types;

#[cfg(test)]
mod service_props;

pub use error::JournalError;
pub use service::{JournalService, POSTING_EPSILON};
pub use types::{
    JournalHeader, JournalSource, JournalStatus, PostedJournal, PostingLine, PreparedJournal,
    PreparedLine,
};
