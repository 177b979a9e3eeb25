//! Allocation preview models and DTOs

use crate::expense::{ReceiptItem, ShareAllocation};
use crate::models::WeightInput;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request to run the allocation engine without persisting anything
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreviewAllocationRequest {
    #[validate(range(min = 0, message = "Total amount cannot be negative"))]
    pub total_cents: i64,

    #[validate(length(min = 1, message = "At least one member is required"))]
    #[validate(nested)]
    pub weights: Vec<WeightInput>,
}

/// One line item as read off a receipt
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptItemInput {
    #[validate(length(min = 1, message = "Item name is required"))]
    pub name: String,

    #[validate(range(min = 0, message = "Item price cannot be negative"))]
    pub price_cents: i64,

    #[validate(length(min = 1, message = "Every item needs at least one member"))]
    pub member_ids: Vec<Uuid>,
}

impl From<ReceiptItemInput> for ReceiptItem {
    fn from(input: ReceiptItemInput) -> Self {
        ReceiptItem {
            name: input.name,
            price_cents: input.price_cents,
            member_ids: input.member_ids,
        }
    }
}

/// Request to derive a split from receipt line items
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ItemizedAllocationRequest {
    #[validate(length(min = 1, message = "At least one item is required"))]
    #[validate(nested)]
    pub items: Vec<ReceiptItemInput>,

    /// Total the scanner read off the receipt, if any
    #[serde(default)]
    pub detected_total_cents: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationPreviewResponse {
    pub total_cents: i64,
    pub shares: Vec<ShareAllocation>,
}
