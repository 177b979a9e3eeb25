//! Allocation preview route handlers

use crate::error::{validation_error, ApiResult};
use crate::expense::{allocate, itemize, validate_allocation_input, MemberWeight, ReceiptItem};
use crate::models::{
    AllocationPreviewResponse, ItemizedAllocationRequest, PreviewAllocationRequest,
    SuccessResponse,
};
use axum::Json;
use tracing::debug;
use validator::Validate;

/// Split a total across weights; nothing is persisted
pub async fn preview_allocation(
    Json(payload): Json<PreviewAllocationRequest>,
) -> ApiResult<Json<SuccessResponse<AllocationPreviewResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let weights: Vec<MemberWeight> = payload.weights.iter().map(MemberWeight::from).collect();
    let total = validate_allocation_input(payload.total_cents, &weights)?;
    let shares = allocate(total, &weights);
    debug!("Previewed {} cents across {} members", total, shares.len());

    Ok(Json(SuccessResponse::with_data(
        "Allocation computed",
        AllocationPreviewResponse {
            total_cents: payload.total_cents,
            shares,
        },
    )))
}

/// Turn receipt line items into a total and exact per-member shares
pub async fn itemized_allocation(
    Json(payload): Json<ItemizedAllocationRequest>,
) -> ApiResult<Json<SuccessResponse<crate::expense::ItemizedSplit>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let items: Vec<ReceiptItem> = payload.items.into_iter().map(ReceiptItem::from).collect();
    let split = itemize(&items, payload.detected_total_cents)?;
    debug!(
        "Itemized {} receipt lines into {} shares",
        items.len(),
        split.shares.len()
    );

    Ok(Json(SuccessResponse::with_data("Receipt split computed", split)))
}
