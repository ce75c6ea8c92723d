//! Revenue recognition and accrual run engine.
//!
//! - `schedule` turns contract lines and accrual requests into schedule rows
//! - `posting` builds the two-bucket reclass journal shared by all families
//! - `lifecycle` guards the DRAFT → POSTED → SETTLED → REVERSED state machine

pub mod error;
pub mod lifecycle;
pub mod posting;
pub mod schedule;
pub mod types;

#[cfg(test)]
mod schedule_props;

pub use error::RecognitionError;
pub use lifecycle::{ReversalRunLine, RunLifecycle, StoredRunLine};
pub use posting::{PlannedRunLine, PlannedSubledgerEntry, RunPostingPlan, TwoBucketPosting};
pub use schedule::{GenerationOutcome, GenerationWindow, ScheduleGenerator};
pub use types::{
    AccountFamily, AccrualRequest, ContractLine, MaturityBucket, RecognitionMethod, RoleSlots,
    RunStatus, ScheduleDraft, SubledgerKind,
};
