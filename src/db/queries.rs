//! SQL query constants
//!
//! Contains all SQL used by the Postgres repository.

/// Schema bootstrap, executed statement by statement at startup
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS expenses (
        id UUID PRIMARY KEY,
        group_id UUID NOT NULL,
        title VARCHAR(200) NOT NULL,
        total_amount_cents BIGINT NOT NULL CHECK (total_amount_cents >= 0),
        payer_id UUID,
        due_date DATE,
        state VARCHAR(16) NOT NULL DEFAULT 'proposed'
            CHECK (state IN ('proposed', 'finalized', 'cancelled')),
        created_by UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        finalized_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expense_shares (
        expense_id UUID NOT NULL REFERENCES expenses(id) ON DELETE CASCADE,
        member_id UUID NOT NULL,
        position INTEGER NOT NULL,
        individual_amount_cents BIGINT NOT NULL CHECK (individual_amount_cents >= 0),
        approved BOOLEAN NOT NULL DEFAULT FALSE,
        PRIMARY KEY (expense_id, member_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id UUID PRIMARY KEY,
        expense_id UUID NOT NULL REFERENCES expenses(id) ON DELETE CASCADE,
        payer_id UUID NOT NULL,
        ower_id UUID NOT NULL,
        amount_cents BIGINT NOT NULL CHECK (amount_cents >= 0),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT ledger_entries_expense_ower_key UNIQUE (expense_id, ower_id),
        CONSTRAINT ledger_entries_distinct_parties CHECK (payer_id <> ower_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_expenses_group_state ON expenses(group_id, state)",
    "CREATE INDEX IF NOT EXISTS idx_ledger_entries_payer ON ledger_entries(payer_id)",
    "CREATE INDEX IF NOT EXISTS idx_ledger_entries_ower ON ledger_entries(ower_id)",
];

const EXPENSE_COLUMNS: &str = "id, group_id, title, total_amount_cents, payer_id, due_date, \
     state, created_by, created_at, finalized_at";

pub const INSERT_EXPENSE: &str = r#"
    INSERT INTO expenses
        (id, group_id, title, total_amount_cents, payer_id, due_date, state, created_by, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

pub const INSERT_SHARE: &str = r#"
    INSERT INTO expense_shares (expense_id, member_id, position, individual_amount_cents, approved)
    VALUES ($1, $2, $3, $4, $5)
"#;

pub fn select_expense() -> String {
    format!("SELECT {} FROM expenses WHERE id = $1", EXPENSE_COLUMNS)
}

pub fn select_expense_for_update() -> String {
    format!("SELECT {} FROM expenses WHERE id = $1 FOR UPDATE", EXPENSE_COLUMNS)
}

pub fn list_group_expenses() -> String {
    format!(
        "SELECT {} FROM expenses WHERE group_id = $1 ORDER BY created_at DESC, id",
        EXPENSE_COLUMNS
    )
}

pub fn list_group_expenses_by_state() -> String {
    format!(
        "SELECT {} FROM expenses WHERE group_id = $1 AND state = $2 ORDER BY created_at DESC, id",
        EXPENSE_COLUMNS
    )
}

pub fn finalize_expense() -> String {
    format!(
        "UPDATE expenses SET state = 'finalized', finalized_at = NOW() \
         WHERE id = $1 AND state = 'proposed' \
           AND NOT EXISTS (SELECT 1 FROM expense_shares WHERE expense_id = $1 AND NOT approved) \
         RETURNING {}",
        EXPENSE_COLUMNS
    )
}

pub fn delete_expense() -> String {
    format!("DELETE FROM expenses WHERE id = $1 RETURNING {}", EXPENSE_COLUMNS)
}

/// Shared row lock: concurrent approvals proceed, the finalize transition waits
pub const LOCK_EXPENSE_STATE: &str = "SELECT state FROM expenses WHERE id = $1 FOR SHARE";

pub const LIST_SHARES: &str = r#"
    SELECT expense_id, member_id, individual_amount_cents, approved
    FROM expense_shares
    WHERE expense_id = $1
    ORDER BY position
"#;

pub const UPDATE_SHARE_APPROVAL: &str = r#"
    UPDATE expense_shares SET approved = $3
    WHERE expense_id = $1 AND member_id = $2
    RETURNING expense_id, member_id, individual_amount_cents, approved
"#;

pub const SHARE_EXISTS: &str = r#"
    SELECT EXISTS(
        SELECT 1 FROM expense_shares WHERE expense_id = $1 AND member_id = $2
    ) AS present
"#;

pub const LEDGER_EXISTS: &str = r#"
    SELECT EXISTS(SELECT 1 FROM ledger_entries WHERE expense_id = $1) AS present
"#;

pub const INSERT_LEDGER_ENTRY: &str = r#"
    INSERT INTO ledger_entries (id, expense_id, payer_id, ower_id, amount_cents, created_at)
    VALUES ($1, $2, $3, $4, $5, $6)
"#;

pub const DELETE_LEDGER_ENTRIES: &str = "DELETE FROM ledger_entries WHERE expense_id = $1";

pub const LEDGER_FOR_EXPENSE: &str = r#"
    SELECT id, payer_id, ower_id, expense_id, amount_cents, created_at
    FROM ledger_entries
    WHERE expense_id = $1
    ORDER BY created_at, ower_id
"#;

pub const LEDGER_BETWEEN: &str = r#"
    SELECT id, payer_id, ower_id, expense_id, amount_cents, created_at
    FROM ledger_entries
    WHERE (payer_id = $1 AND ower_id = $2) OR (payer_id = $2 AND ower_id = $1)
    ORDER BY created_at
"#;

pub const LEDGER_FOR_USER: &str = r#"
    SELECT id, payer_id, ower_id, expense_id, amount_cents, created_at
    FROM ledger_entries
    WHERE payer_id = $1 OR ower_id = $1
    ORDER BY created_at
"#;
