//! Balance route handlers

use crate::error::ApiResult;
use crate::models::{PairBalanceResponse, SuccessResponse, UserBalancesResponse};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

/// Positive `netCents` means `user_b` owes `user_a`
pub async fn pair_balance(
    State(state): State<SharedState>,
    Path((user_a, user_b)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<SuccessResponse<PairBalanceResponse>>> {
    let net_cents = state.balances.net_balance(user_a, user_b).await?;
    Ok(Json(SuccessResponse::with_data(
        "Balance computed",
        PairBalanceResponse {
            user_a,
            user_b,
            net_cents,
        },
    )))
}

pub async fn user_balances(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<UserBalancesResponse>>> {
    let balances = state.balances.balances_for_user(user_id).await?;
    Ok(Json(SuccessResponse::with_data(
        "Balances computed",
        UserBalancesResponse { user_id, balances },
    )))
}
