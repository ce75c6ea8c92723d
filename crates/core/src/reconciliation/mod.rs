//! Bank statement reconciliation.
//!
//! Statement lines are matched against posting rules; the winning rule's
//! template either books the line directly (with an optional tax-inclusive
//! split) or hands it to the settlement engine.

pub mod error;
pub mod matcher;
pub mod template;
pub mod types;

pub use error::ReconciliationError;
pub use matcher::RuleMatcher;
pub use template::TemplatePlanner;
pub use types::{
    BankStatementLine, PostingRule, PostingTemplate, StatementDirection, StatementLineStatus, TaxSplit,
};
