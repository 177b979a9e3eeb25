//! Expense route handlers
//!
//! Approval and deletion always act as the authenticated caller.

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::expense::{ApprovalResult, ExpenseDetail, ExpenseState};
use crate::models::{ExpenseDeletedResponse, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

pub async fn get_expense(
    State(state): State<SharedState>,
    Path(expense_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ExpenseDetail>>> {
    let detail = state.expenses.get(expense_id).await?;
    Ok(Json(SuccessResponse::with_data("Expense retrieved", detail)))
}

/// Approve the caller's share
pub async fn approve_expense(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(expense_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ApprovalResult>>> {
    let result = state.expenses.approve(expense_id, user.id).await?;
    let message = match result.state {
        ExpenseState::Finalized => "Share approved; expense finalized",
        _ => "Share approved",
    };
    Ok(Json(SuccessResponse::with_data(message, result)))
}

/// Withdraw the caller's approval
pub async fn decline_expense(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(expense_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ApprovalResult>>> {
    let result = state.expenses.decline(expense_id, user.id).await?;
    Ok(Json(SuccessResponse::with_data(
        "Share declined; the expense stays pending until approved",
        result,
    )))
}

pub async fn delete_expense(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(expense_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ExpenseDeletedResponse>>> {
    let expense = state.expenses.delete(expense_id, user.id).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Expense '{}' deleted", expense.title),
        ExpenseDeletedResponse { expense },
    )))
}
