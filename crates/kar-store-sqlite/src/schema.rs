//! SQL schema for the Kar SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// Money columns hold decimal strings so no amount ever passes through a
/// float. Timestamps are fixed-width RFC 3339 UTC strings, so string order is
/// time order.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS user_financials (
    session_id         TEXT PRIMARY KEY,
    user_id            TEXT,
    financial_year     TEXT NOT NULL,
    age                INTEGER NOT NULL CHECK (age BETWEEN 18 AND 100),
    gross_salary       TEXT NOT NULL,
    basic_salary       TEXT NOT NULL,
    hra_received       TEXT NOT NULL DEFAULT '0',
    rent_paid          TEXT NOT NULL DEFAULT '0',
    lta_received       TEXT NOT NULL DEFAULT '0',
    other_exemptions   TEXT NOT NULL DEFAULT '0',
    deduction_80c      TEXT NOT NULL DEFAULT '0',
    deduction_80d      TEXT NOT NULL DEFAULT '0',
    deduction_80dd     TEXT NOT NULL DEFAULT '0',
    deduction_80e      TEXT NOT NULL DEFAULT '0',
    deduction_80tta    TEXT NOT NULL DEFAULT '0',
    home_loan_interest TEXT NOT NULL DEFAULT '0',
    other_deductions   TEXT,
    other_income       TEXT,
    standard_deduction TEXT NOT NULL DEFAULT '50000',
    professional_tax   TEXT NOT NULL DEFAULT '0',
    tds                TEXT NOT NULL DEFAULT '0',
    metro_city         INTEGER NOT NULL DEFAULT 1,
    status             TEXT NOT NULL CHECK (status IN ('draft', 'completed')),
    is_draft           INTEGER NOT NULL,
    draft_expires_at   TEXT,           -- NULL once completed
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

-- One row per completed session; replaced only by deleting the session.
CREATE TABLE IF NOT EXISTS tax_comparison (
    session_id          TEXT PRIMARY KEY
                        REFERENCES user_financials(session_id) ON DELETE CASCADE,
    tax_old_regime      TEXT NOT NULL,
    tax_new_regime      TEXT NOT NULL,
    best_regime         TEXT NOT NULL CHECK (best_regime IN ('old', 'new')),
    selected_regime     TEXT CHECK (selected_regime IN ('old', 'new')),
    calculation_details TEXT NOT NULL,   -- JSON
    recommendations     TEXT NOT NULL DEFAULT '[]',
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS advisor_outcome (
    session_id           TEXT PRIMARY KEY
                         REFERENCES user_financials(session_id) ON DELETE CASCADE,
    recommendations      TEXT NOT NULL DEFAULT '[]',
    conversation_summary TEXT NOT NULL,
    transcript           TEXT NOT NULL DEFAULT '[]',
    created_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS user_financials_drafts_idx
    ON user_financials(user_id, is_draft, created_at);
CREATE INDEX IF NOT EXISTS user_financials_expiry_idx
    ON user_financials(draft_expires_at);

PRAGMA user_version = 1;
";
