//! Posting core schema.
//!
//! Creates reference tables (books, periods, purpose mappings, rates), the
//! journal, settlement, recognition and bank reconciliation tables, the unique
//! indexes that back idempotent replay, and the journal balance trigger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: REFERENCE DATA (read-only collaborators)
        // ============================================================
        db.execute_unprepared(REFERENCE_SQL).await?;

        // ============================================================
        // PART 2: JOURNAL
        // ============================================================
        db.execute_unprepared(JOURNAL_SQL).await?;

        // ============================================================
        // PART 3: SETTLEMENT
        // ============================================================
        db.execute_unprepared(SETTLEMENT_SQL).await?;

        // ============================================================
        // PART 4: RECOGNITION
        // ============================================================
        db.execute_unprepared(RECOGNITION_SQL).await?;

        // ============================================================
        // PART 5: BANK RECONCILIATION
        // ============================================================
        db.execute_unprepared(BANK_SQL).await?;

        // ============================================================
        // PART 6: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const REFERENCE_SQL: &str = r"
CREATE TABLE ledger_books (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    name VARCHAR(100) NOT NULL,
    base_currency CHAR(3) NOT NULL,
    is_default BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE UNIQUE INDEX uq_ledger_books_default
    ON ledger_books(tenant_id, legal_entity_id) WHERE is_default;

CREATE TABLE fiscal_periods (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    book_id UUID NOT NULL REFERENCES ledger_books(id),
    name VARCHAR(50) NOT NULL,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'OPEN'
        CHECK (status IN ('OPEN', 'SOFT_CLOSED', 'HARD_CLOSED')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_period_dates CHECK (end_date >= start_date)
);

CREATE INDEX idx_fiscal_periods_lookup ON fiscal_periods(book_id, start_date, end_date);

CREATE TABLE purpose_account_mappings (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    purpose_code VARCHAR(40) NOT NULL,
    account_id UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_purpose_mapping UNIQUE (tenant_id, legal_entity_id, purpose_code)
);

CREATE TABLE exchange_rates (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    from_currency CHAR(3) NOT NULL,
    to_currency CHAR(3) NOT NULL,
    rate NUMERIC(20, 10) NOT NULL CHECK (rate > 0),
    effective_date DATE NOT NULL,
    source VARCHAR(50),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_exchange_rate UNIQUE (tenant_id, from_currency, to_currency, effective_date),
    CONSTRAINT chk_rate_pair CHECK (from_currency <> to_currency)
);

CREATE INDEX idx_exchange_rates_lookup
    ON exchange_rates(tenant_id, from_currency, to_currency, effective_date DESC);

CREATE TABLE cash_registers (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    name VARCHAR(100) NOT NULL,
    account_id UUID NOT NULL,
    currency CHAR(3) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const JOURNAL_SQL: &str = r"
CREATE TABLE journal_entries (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    book_id UUID NOT NULL REFERENCES ledger_books(id),
    fiscal_period_id UUID NOT NULL REFERENCES fiscal_periods(id),
    entry_date DATE NOT NULL,
    currency CHAR(3) NOT NULL,
    description TEXT NOT NULL,
    source VARCHAR(20) NOT NULL,
    source_id UUID,
    status VARCHAR(20) NOT NULL CHECK (status IN ('DRAFT', 'POSTED', 'REVERSED')),
    total_debit_base NUMERIC(19, 4) NOT NULL,
    total_credit_base NUMERIC(19, 4) NOT NULL,
    reversal_of_entry_id UUID REFERENCES journal_entries(id),
    reversed_by_entry_id UUID REFERENCES journal_entries(id),
    idempotency_scope VARCHAR(200),
    idempotency_key VARCHAR(128),
    request_hash CHAR(64),
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_journal_totals CHECK (status = 'DRAFT' OR total_debit_base = total_credit_base),
    CONSTRAINT chk_journal_key_scope CHECK ((idempotency_key IS NULL) = (idempotency_scope IS NULL))
);

-- Idempotent replay: one journal per (tenant, scope, key)
CREATE UNIQUE INDEX uq_journal_idempotency
    ON journal_entries(tenant_id, idempotency_scope, idempotency_key)
    WHERE idempotency_key IS NOT NULL;

-- A journal is mirrored at most once
CREATE UNIQUE INDEX uq_journal_reversal_of
    ON journal_entries(reversal_of_entry_id) WHERE reversal_of_entry_id IS NOT NULL;

CREATE INDEX idx_journal_entries_source ON journal_entries(tenant_id, source, source_id);

CREATE TABLE journal_lines (
    id UUID PRIMARY KEY,
    journal_entry_id UUID NOT NULL REFERENCES journal_entries(id) ON DELETE CASCADE,
    line_no INTEGER NOT NULL CHECK (line_no > 0),
    account_id UUID NOT NULL,
    debit_base NUMERIC(19, 4) NOT NULL DEFAULT 0 CHECK (debit_base >= 0),
    credit_base NUMERIC(19, 4) NOT NULL DEFAULT 0 CHECK (credit_base >= 0),
    amount_txn NUMERIC(19, 4) NOT NULL,
    memo TEXT,
    CONSTRAINT uq_journal_line_no UNIQUE (journal_entry_id, line_no),
    CONSTRAINT chk_single_side CHECK (debit_base = 0 OR credit_base = 0)
);
";

const SETTLEMENT_SQL: &str = r"
CREATE TABLE open_items (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    counterparty_id UUID NOT NULL,
    direction VARCHAR(20) NOT NULL CHECK (direction IN ('RECEIVABLE', 'PAYABLE')),
    document_no VARCHAR(100) NOT NULL,
    currency CHAR(3) NOT NULL,
    control_account_id UUID NOT NULL,
    document_date DATE NOT NULL,
    due_date DATE NOT NULL,
    original_amount NUMERIC(19, 4) NOT NULL CHECK (original_amount > 0),
    residual_amount NUMERIC(19, 4) NOT NULL,
    original_base NUMERIC(19, 4) NOT NULL,
    residual_base NUMERIC(19, 4) NOT NULL,
    fx_rate NUMERIC(20, 10) NOT NULL,
    fx_provenance VARCHAR(20) NOT NULL,
    fx_rate_date DATE NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'OPEN'
        CHECK (status IN ('OPEN', 'PARTIALLY_SETTLED', 'SETTLED')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_residual_range CHECK (residual_amount >= 0 AND residual_amount <= original_amount)
);

CREATE INDEX idx_open_items_counterparty
    ON open_items(tenant_id, legal_entity_id, counterparty_id, direction, status);

CREATE TABLE settlement_batches (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    register_id UUID REFERENCES cash_registers(id),
    unapplied_source_id UUID,
    counterparty_id UUID NOT NULL,
    direction VARCHAR(20) NOT NULL,
    currency CHAR(3) NOT NULL,
    amount NUMERIC(19, 4) NOT NULL CHECK (amount > 0),
    applied_amount NUMERIC(19, 4) NOT NULL DEFAULT 0,
    unapplied_amount NUMERIC(19, 4) NOT NULL DEFAULT 0,
    fx_total NUMERIC(19, 4) NOT NULL DEFAULT 0,
    fx_rate NUMERIC(20, 10) NOT NULL,
    fx_provenance VARCHAR(20) NOT NULL,
    fx_rate_date DATE NOT NULL,
    settlement_date DATE NOT NULL,
    journal_entry_id UUID REFERENCES journal_entries(id),
    status VARCHAR(20) NOT NULL CHECK (status IN ('DRAFT', 'POSTED', 'REVERSED')),
    idempotency_scope VARCHAR(200) NOT NULL,
    idempotency_key VARCHAR(128) NOT NULL,
    request_hash CHAR(64) NOT NULL,
    bank_statement_line_id UUID,
    cash_transaction_id UUID,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- Scope string embeds legal entity and register, so the same key on another
-- register is a different row.
CREATE UNIQUE INDEX uq_settlement_idempotency
    ON settlement_batches(tenant_id, idempotency_scope, idempotency_key);

CREATE UNIQUE INDEX uq_settlement_statement_line
    ON settlement_batches(tenant_id, bank_statement_line_id)
    WHERE bank_statement_line_id IS NOT NULL;

CREATE TABLE settlement_allocations (
    id UUID PRIMARY KEY,
    batch_id UUID NOT NULL REFERENCES settlement_batches(id),
    open_item_id UUID NOT NULL REFERENCES open_items(id),
    amount NUMERIC(19, 4) NOT NULL CHECK (amount > 0),
    original_base NUMERIC(19, 4) NOT NULL,
    settlement_base NUMERIC(19, 4) NOT NULL,
    fx_difference NUMERIC(19, 4) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_allocation_per_batch UNIQUE (batch_id, open_item_id)
);

CREATE INDEX idx_settlement_allocations_item ON settlement_allocations(open_item_id);

CREATE TABLE unapplied_cash (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    counterparty_id UUID NOT NULL,
    direction VARCHAR(20) NOT NULL,
    currency CHAR(3) NOT NULL,
    account_id UUID NOT NULL,
    original_amount NUMERIC(19, 4) NOT NULL CHECK (original_amount > 0),
    residual_amount NUMERIC(19, 4) NOT NULL CHECK (residual_amount >= 0),
    residual_base NUMERIC(19, 4) NOT NULL,
    fx_rate NUMERIC(20, 10) NOT NULL,
    fx_provenance VARCHAR(20) NOT NULL,
    fx_rate_date DATE NOT NULL,
    source_batch_id UUID NOT NULL REFERENCES settlement_batches(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_unapplied_cash_counterparty
    ON unapplied_cash(tenant_id, legal_entity_id, counterparty_id) WHERE residual_amount > 0;
";

const RECOGNITION_SQL: &str = r"
CREATE TABLE contract_lines (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    family VARCHAR(30) NOT NULL,
    method VARCHAR(20) NOT NULL CHECK (method IN ('STRAIGHT_LINE', 'MILESTONE', 'MANUAL')),
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    amount NUMERIC(19, 4) NOT NULL CHECK (amount > 0),
    currency CHAR(3) NOT NULL,
    fx_rate NUMERIC(20, 10) NOT NULL,
    fx_provenance VARCHAR(20) NOT NULL,
    fx_rate_date DATE NOT NULL,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE revenue_recognition_schedules (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    contract_line_id UUID REFERENCES contract_lines(id),
    family VARCHAR(30) NOT NULL,
    bucket VARCHAR(20) NOT NULL CHECK (bucket IN ('SHORT_TERM', 'LONG_TERM')),
    maturity_date DATE NOT NULL,
    amount_txn NUMERIC(19, 4) NOT NULL,
    amount_base NUMERIC(19, 4) NOT NULL,
    currency CHAR(3) NOT NULL,
    fx_rate NUMERIC(20, 10) NOT NULL,
    reclass_required BOOLEAN NOT NULL DEFAULT false,
    source_row_uid VARCHAR(200) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_schedule_source_row UNIQUE (tenant_id, legal_entity_id, source_row_uid)
);

CREATE TABLE revenue_recognition_runs (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    schedule_id UUID NOT NULL REFERENCES revenue_recognition_schedules(id),
    status VARCHAR(20) NOT NULL CHECK (status IN ('DRAFT', 'POSTED', 'SETTLED', 'REVERSED')),
    journal_entry_id UUID REFERENCES journal_entries(id),
    reversal_of_run_id UUID REFERENCES revenue_recognition_runs(id),
    reversed_by_run_id UUID REFERENCES revenue_recognition_runs(id),
    posted_at TIMESTAMPTZ,
    settled_at TIMESTAMPTZ,
    reversed_at TIMESTAMPTZ,
    idempotency_scope VARCHAR(200),
    idempotency_key VARCHAR(128),
    request_hash CHAR(64),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- Reverse replay: one reversal run per (tenant, scope, key)
CREATE UNIQUE INDEX uq_run_idempotency
    ON revenue_recognition_runs(tenant_id, idempotency_scope, idempotency_key)
    WHERE idempotency_key IS NOT NULL;

CREATE UNIQUE INDEX uq_run_reversal_of
    ON revenue_recognition_runs(reversal_of_run_id) WHERE reversal_of_run_id IS NOT NULL;

CREATE TABLE revenue_recognition_run_lines (
    id UUID PRIMARY KEY,
    run_id UUID NOT NULL REFERENCES revenue_recognition_runs(id),
    line_no INTEGER NOT NULL,
    purpose_code VARCHAR(40) NOT NULL,
    account_id UUID NOT NULL,
    kind VARCHAR(20) NOT NULL CHECK (kind IN ('RECOGNITION', 'RECLASS')),
    amount_txn NUMERIC(19, 4) NOT NULL,
    amount_base NUMERIC(19, 4) NOT NULL,
    status VARCHAR(20) NOT NULL CHECK (status IN ('POSTED', 'REVERSED')),
    reversal_of_run_line_id UUID REFERENCES revenue_recognition_run_lines(id),
    CONSTRAINT uq_run_line_no UNIQUE (run_id, line_no)
);

CREATE TABLE subledger_entries (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    run_id UUID NOT NULL REFERENCES revenue_recognition_runs(id),
    schedule_id UUID NOT NULL REFERENCES revenue_recognition_schedules(id),
    journal_entry_id UUID NOT NULL REFERENCES journal_entries(id),
    kind VARCHAR(20) NOT NULL CHECK (kind IN ('RECOGNITION', 'RECLASS')),
    debit_account_id UUID NOT NULL,
    credit_account_id UUID NOT NULL,
    amount_txn NUMERIC(19, 4) NOT NULL,
    amount_base NUMERIC(19, 4) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_subledger_entries_run ON subledger_entries(run_id);
";

const BANK_SQL: &str = r"
CREATE TABLE bank_statement_lines (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    register_id UUID NOT NULL REFERENCES cash_registers(id),
    value_date DATE NOT NULL,
    amount NUMERIC(19, 4) NOT NULL,
    currency CHAR(3) NOT NULL,
    description TEXT NOT NULL,
    reference VARCHAR(200),
    counterparty_hint UUID,
    status VARCHAR(20) NOT NULL DEFAULT 'UNMATCHED' CHECK (status IN ('UNMATCHED', 'RECONCILED')),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE posting_rules (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    name VARCHAR(100) NOT NULL,
    priority INTEGER NOT NULL,
    direction VARCHAR(20) CHECK (direction IN ('INFLOW', 'OUTFLOW')),
    description_pattern TEXT,
    reference_prefix VARCHAR(100),
    min_amount NUMERIC(19, 4),
    max_amount NUMERIC(19, 4),
    template JSONB NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_posting_rules_active
    ON posting_rules(tenant_id, legal_entity_id, priority) WHERE is_active;

CREATE TABLE bank_reconciliations (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    legal_entity_id UUID NOT NULL,
    statement_line_id UUID NOT NULL REFERENCES bank_statement_lines(id),
    rule_id UUID NOT NULL REFERENCES posting_rules(id),
    journal_entry_id UUID REFERENCES journal_entries(id),
    settlement_batch_id UUID REFERENCES settlement_batches(id),
    idempotency_scope VARCHAR(200) NOT NULL,
    idempotency_key VARCHAR(128) NOT NULL,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_reconciliation_line UNIQUE (tenant_id, statement_line_id)
);

CREATE UNIQUE INDEX uq_reconciliation_idempotency
    ON bank_reconciliations(tenant_id, idempotency_scope, idempotency_key);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: check_journal_balance
-- Rejects a POSTED or REVERSED journal whose lines do not balance
-- ============================================================
CREATE OR REPLACE FUNCTION check_journal_balance()
RETURNS TRIGGER AS $$
DECLARE
    entry_status VARCHAR(20);
    total_debit NUMERIC(19, 4);
    total_credit NUMERIC(19, 4);
BEGIN
    SELECT status INTO entry_status FROM journal_entries WHERE id = NEW.journal_entry_id;

    IF entry_status <> 'DRAFT' THEN
        SELECT COALESCE(SUM(debit_base), 0), COALESCE(SUM(credit_base), 0)
        INTO total_debit, total_credit
        FROM journal_lines
        WHERE journal_entry_id = NEW.journal_entry_id;

        IF ABS(total_debit - total_credit) > 0.000001 THEN
            RAISE EXCEPTION 'Journal % is not balanced. Debit: %, Credit: %',
                NEW.journal_entry_id, total_debit, total_credit;
        END IF;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE CONSTRAINT TRIGGER trg_check_journal_balance
AFTER INSERT OR UPDATE ON journal_lines
DEFERRABLE INITIALLY DEFERRED
FOR EACH ROW
EXECUTE FUNCTION check_journal_balance();

-- ============================================================
-- FUNCTION: prevent_posted_line_change
-- Journal lines are immutable once written
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_posted_line_change()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Journal lines are immutable. Post a reversal instead.';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_prevent_line_update
BEFORE UPDATE ON journal_lines
FOR EACH ROW
EXECUTE FUNCTION prevent_posted_line_change();
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS bank_reconciliations CASCADE;
DROP TABLE IF EXISTS posting_rules CASCADE;
DROP TABLE IF EXISTS bank_statement_lines CASCADE;
DROP TABLE IF EXISTS subledger_entries CASCADE;
DROP TABLE IF EXISTS revenue_recognition_run_lines CASCADE;
DROP TABLE IF EXISTS revenue_recognition_runs CASCADE;
DROP TABLE IF EXISTS revenue_recognition_schedules CASCADE;
DROP TABLE IF EXISTS contract_lines CASCADE;
DROP TABLE IF EXISTS unapplied_cash CASCADE;
DROP TABLE IF EXISTS settlement_allocations CASCADE;
DROP TABLE IF EXISTS settlement_batches CASCADE;
DROP TABLE IF EXISTS open_items CASCADE;
DROP TABLE IF EXISTS journal_lines CASCADE;
DROP TABLE IF EXISTS journal_entries CASCADE;
DROP TABLE IF EXISTS cash_registers CASCADE;
DROP TABLE IF EXISTS exchange_rates CASCADE;
DROP TABLE IF EXISTS purpose_account_mappings CASCADE;
DROP TABLE IF EXISTS fiscal_periods CASCADE;
DROP TABLE IF EXISTS ledger_books CASCADE;
DROP FUNCTION IF EXISTS check_journal_balance() CASCADE;
DROP FUNCTION IF EXISTS prevent_posted_line_change() CASCADE;
";
