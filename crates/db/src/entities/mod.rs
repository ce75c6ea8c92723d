//! `SeaORM` entity definitions.
//!
//! Status and code columns are stored as text and parsed into the
//! `defter-core` enums at the repository boundary.

pub mod bank_reconciliations;
pub mod bank_statement_lines;
pub mod cash_registers;
pub mod contract_lines;
pub mod exchange_rates;
pub mod fiscal_periods;
pub mod journal_entries;
pub mod journal_lines;
pub mod ledger_books;
pub mod open_items;
pub mod posting_rules;
pub mod purpose_account_mappings;
pub mod revenue_recognition_run_lines;
pub mod revenue_recognition_runs;
pub mod revenue_recognition_schedules;
pub mod settlement_allocations;
pub mod settlement_batches;
pub mod subledger_entries;
pub mod unapplied_cash;
