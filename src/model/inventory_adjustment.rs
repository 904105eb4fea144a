use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::stock_card::TransactionType;
use crate::model::workflow::Workflow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InventoryAdjustment {
    pub id: u64,
    pub inventory_item_id: u64,
    pub adjustment_type: String,
    pub quantity: i64,
    pub reason: String,
    pub status: String,
    pub requested_by: Option<u64>,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Increase,
    Decrease,
}

impl AdjustmentType {
    pub fn transaction_type(self) -> TransactionType {
        match self {
            AdjustmentType::Increase => TransactionType::AdjustmentIn,
            AdjustmentType::Decrease => TransactionType::AdjustmentOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum AdjustmentAction {
    Approve,
    Reject,
}

impl Workflow for AdjustmentStatus {
    type Action = AdjustmentAction;
    const RESOURCE: &'static str = "inventory adjustment";

    fn next(self, action: AdjustmentAction) -> Option<Self> {
        match (self, action) {
            (AdjustmentStatus::Pending, AdjustmentAction::Approve) => Some(AdjustmentStatus::Approved),
            (AdjustmentStatus::Pending, AdjustmentAction::Reject) => Some(AdjustmentStatus::Rejected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;

    #[test]
    fn transition_table() {
        let states: Vec<AdjustmentStatus> = AdjustmentStatus::iter().collect();
        let actions: Vec<AdjustmentAction> = AdjustmentAction::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (AdjustmentStatus::Pending, AdjustmentAction::Approve, AdjustmentStatus::Approved),
                (AdjustmentStatus::Pending, AdjustmentAction::Reject, AdjustmentStatus::Rejected),
            ],
        );
    }

    #[test]
    fn decrease_posts_an_outgoing_movement() {
        assert_eq!(AdjustmentType::Decrease.transaction_type().signed(4), -4);
        assert_eq!(AdjustmentType::Increase.transaction_type().signed(4), 4);
    }
}
