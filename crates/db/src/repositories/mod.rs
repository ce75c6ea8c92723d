//! Repository abstractions for data access.
//!
//! Repositories own the transaction boundaries of the posting operations and
//! persist what the `defter-core` engines compute. Helpers suffixed `_in` run
//! on a caller's connection or transaction so that composite operations commit
//! or roll back as one unit.

pub mod error;
pub mod exchange_rate;
pub mod fiscal;
pub mod idempotency;
pub mod journal;
pub mod purpose;
pub mod recognition;
pub mod reconciliation;
pub mod settlement;

pub use error::StoreError;
pub use exchange_rate::{ExchangeRateRepository, UpsertRateInput};
pub use fiscal::{FiscalRepository, LedgerBook};
pub use idempotency::GuardedRequest;
pub use journal::{
    JournalRepository, JournalReversal, JournalSummary, ManualJournalInput, ReverseJournalInput,
};
pub use purpose::PurposeAccountRepository;
pub use recognition::{
    CreateAccrualInput, CreateContractLineInput, GenerateSchedulesInput, GenerationSummary,
    PostRunInput, RecognitionRepository, ReverseRunInput, RunLineView, RunView, ScheduleView,
    SettleRunInput,
};
pub use reconciliation::{
    AutoPostResult, CreatePostingRuleInput, ImportStatementLineInput, ReconciliationRepository,
};
pub use settlement::{
    AllocationView, ApplySettlementInput, FundingSource, SettlementRepository, SettlementResult,
};
