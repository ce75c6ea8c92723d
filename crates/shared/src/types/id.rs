//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing an `OpenItemId` where a `RunId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(TenantId, "Unique identifier for a tenant.");
typed_id!(LegalEntityId, "Unique identifier for a legal entity within a tenant.");
typed_id!(UserId, "Unique identifier for a user.");
typed_id!(BookId, "Unique identifier for a ledger book.");
typed_id!(FiscalPeriodId, "Unique identifier for a fiscal period.");
typed_id!(
    AccountId,
    "Unique identifier for a chart of accounts entry."
);
typed_id!(CounterpartyId, "Unique identifier for a customer or vendor.");
typed_id!(RegisterId, "Unique identifier for a cash or bank register.");
typed_id!(JournalEntryId, "Unique identifier for a journal entry.");
typed_id!(JournalLineId, "Unique identifier for a journal line.");
typed_id!(OpenItemId, "Unique identifier for an open receivable or payable item.");
typed_id!(SettlementBatchId, "Unique identifier for a settlement batch.");
typed_id!(
    SettlementAllocationId,
    "Unique identifier for a settlement allocation."
);
typed_id!(UnappliedCashId, "Unique identifier for an unapplied cash bucket.");
typed_id!(ContractLineId, "Unique identifier for a contract line.");
typed_id!(ScheduleId, "Unique identifier for a recognition schedule row.");
typed_id!(RunId, "Unique identifier for a recognition run.");
typed_id!(RunLineId, "Unique identifier for a recognition run line.");
typed_id!(SubledgerEntryId, "Unique identifier for a subledger trace row.");
typed_id!(StatementLineId, "Unique identifier for a bank statement line.");
typed_id!(PostingRuleId, "Unique identifier for a bank posting rule.");
