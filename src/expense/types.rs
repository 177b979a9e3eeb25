//! Expense domain types
//!
//! Proposals, per-member shares and the directed debt ledger.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an expense proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseState {
    /// Waiting for every member to approve their share
    #[default]
    Proposed,
    /// Unanimously approved; ledger entries exist (or the payer is unknown)
    Finalized,
    /// Removed by its creator
    Cancelled,
}

impl ExpenseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseState::Proposed => "proposed",
            ExpenseState::Finalized => "finalized",
            ExpenseState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExpenseState::Proposed)
    }
}

impl std::fmt::Display for ExpenseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExpenseState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(ExpenseState::Proposed),
            "finalized" => Ok(ExpenseState::Finalized),
            "cancelled" => Ok(ExpenseState::Cancelled),
            other => Err(format!("unknown expense state '{}'", other)),
        }
    }
}

/// A shared expense awaiting (or past) unanimous approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub group_id: Uuid,
    pub title: String,
    pub total_amount_cents: i64,
    /// Member who fronted the money; unset means nobody is owed yet
    pub payer_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub state: ExpenseState,
    /// Owning actor, the only one allowed to delete
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Expense {
    pub fn new(
        group_id: Uuid,
        title: String,
        total_amount_cents: i64,
        payer_id: Option<Uuid>,
        due_date: Option<NaiveDate>,
        created_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            title,
            total_amount_cents,
            payer_id,
            due_date,
            state: ExpenseState::Proposed,
            created_by,
            created_at: Utc::now(),
            finalized_at: None,
        }
    }
}

/// One member's integer-cent portion of an expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseShare {
    pub expense_id: Uuid,
    pub member_id: Uuid,
    pub individual_amount_cents: i64,
    pub approved: bool,
}

/// Directed debt: `ower_id` owes `payer_id` for one expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub payer_id: Uuid,
    pub ower_id: Uuid,
    pub expense_id: Uuid,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(expense_id: Uuid, payer_id: Uuid, ower_id: Uuid, amount_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            payer_id,
            ower_id,
            expense_id,
            amount_cents,
            created_at: Utc::now(),
        }
    }

    pub fn touches(&self, user: Uuid) -> bool {
        self.payer_id == user || self.ower_id == user
    }
}

/// Input weight for one member, a percentage in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberWeight {
    pub member_id: Uuid,
    pub weight: f64,
}

impl MemberWeight {
    pub fn new(member_id: Uuid, weight: f64) -> Self {
        Self { member_id, weight }
    }
}

/// Engine output for one member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareAllocation {
    pub member_id: Uuid,
    pub amount_cents: u64,
}

/// Sum of share amounts, widened so corrupted rows cannot overflow the check
pub fn shares_total(shares: &[ExpenseShare]) -> i128 {
    shares
        .iter()
        .map(|s| s.individual_amount_cents as i128)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_text() {
        for state in [
            ExpenseState::Proposed,
            ExpenseState::Finalized,
            ExpenseState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<ExpenseState>().unwrap(), state);
        }
        assert!("approved".parse::<ExpenseState>().is_err());
    }

    #[test]
    fn test_only_proposed_is_open() {
        assert!(!ExpenseState::Proposed.is_terminal());
        assert!(ExpenseState::Finalized.is_terminal());
        assert!(ExpenseState::Cancelled.is_terminal());
    }
}
