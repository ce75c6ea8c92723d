//! Settlement allocation engine.
//!
//! Applies an incoming or outgoing cash amount against a counterparty's open
//! items and derives the journal lines from the resulting allocation rows.

pub mod engine;
pub mod error;
pub mod types;

#[cfg(test)]
mod engine_props;

pub use engine::{SettlementEngine, SettlementPolicy};
pub use error::SettlementError;
pub use types::{
    AllocationMode, AllocationRequest, ItemDirection, OpenItem, OpenItemStatus,
    PlannedAllocation, PlannedUnapplied, RemainderPolicy, SettlementInput, SettlementPlan,
    SourceResidual,
};
