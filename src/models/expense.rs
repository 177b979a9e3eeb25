//! Expense-related models and DTOs

use crate::error::{validation_error, AppError};
use crate::expense::{Expense, ExpenseState, MemberWeight, NewExpense, ReconcileReport};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One member's percentage weight
#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WeightInput {
    pub member_id: Uuid,

    #[validate(range(min = 0.0, max = 100.0, message = "Weight must be between 0 and 100"))]
    pub weight: f64,
}

impl From<&WeightInput> for MemberWeight {
    fn from(input: &WeightInput) -> Self {
        MemberWeight::new(input.member_id, input.weight)
    }
}

/// Request to propose a new expense in a group
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpenseRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(range(min = 0, message = "Total amount cannot be negative"))]
    pub total_cents: i64,

    #[validate(length(min = 1, message = "At least one member is required"))]
    #[validate(nested)]
    pub weights: Vec<WeightInput>,

    #[serde(default)]
    pub payer_id: Option<Uuid>,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl CreateExpenseRequest {
    pub fn into_new_expense(self, group_id: Uuid) -> NewExpense {
        NewExpense {
            group_id,
            weights: self.weights.iter().map(MemberWeight::from).collect(),
            title: self.title,
            total_cents: self.total_cents,
            payer_id: self.payer_id,
            due_date: self.due_date,
        }
    }
}

/// Query parameters for listing a group's expenses
#[derive(Debug, Deserialize, Default)]
pub struct ListExpensesQuery {
    pub state: Option<String>,
}

impl ListExpensesQuery {
    pub fn state_filter(&self) -> Result<Option<ExpenseState>, AppError> {
        self.state
            .as_deref()
            .map(|s| s.parse::<ExpenseState>().map_err(validation_error))
            .transpose()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseListResponse {
    pub group_id: Uuid,
    pub expenses: Vec<Expense>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupActivityResponse {
    pub reconcile: ReconcileReport,
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDeletedResponse {
    pub expense: Expense,
}
