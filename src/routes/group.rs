//! Group-scoped route handlers: proposing, listing and reconciling expenses

use crate::auth::AuthUser;
use crate::error::{validation_error, ApiResult};
use crate::expense::{ExpenseDetail, ReconcileReport};
use crate::models::{
    CreateExpenseRequest, ExpenseListResponse, GroupActivityResponse, ListExpensesQuery,
    SuccessResponse,
};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Propose an expense; the caller becomes its creator
pub async fn create_expense(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<CreateExpenseRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<ExpenseDetail>>)> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let detail = state
        .expenses
        .create(payload.into_new_expense(group_id), user.id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data(
            format!("Expense '{}' proposed", detail.expense.title),
            detail,
        )),
    ))
}

pub async fn list_expenses(
    State(state): State<SharedState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<ListExpensesQuery>,
) -> ApiResult<Json<SuccessResponse<ExpenseListResponse>>> {
    let expenses = state
        .expenses
        .list(group_id, query.state_filter()?)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        "Expenses retrieved",
        ExpenseListResponse {
            group_id,
            count: expenses.len(),
            expenses,
        },
    )))
}

/// Repair the group, then list its expenses
pub async fn group_activity(
    State(state): State<SharedState>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<GroupActivityResponse>>> {
    let reconcile = state.reconciler.scan(group_id).await?;
    let expenses = state.expenses.list(group_id, None).await?;

    Ok(Json(SuccessResponse::with_data(
        "Group activity retrieved",
        GroupActivityResponse {
            reconcile,
            expenses,
        },
    )))
}

pub async fn reconcile_group(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<ReconcileReport>>> {
    info!("Reconciliation of group {} requested by {}", group_id, user.id);
    let report = state.reconciler.scan(group_id).await?;

    Ok(Json(SuccessResponse::with_data(
        format!(
            "Reconciled: {} repaired, {} failed",
            report.repaired, report.failed
        ),
        report,
    )))
}
