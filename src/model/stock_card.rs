use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};

/// One ledger line. `quantity` is the signed change, `balance_after` the
/// on-hand quantity once the line is applied.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StockCard {
    pub id: u64,
    pub inventory_item_id: u64,
    pub transaction_type: String,
    pub quantity: i64,
    pub balance_after: i64,
    pub reference: Option<String>,
    pub remarks: Option<String>,
    pub transaction_date: NaiveDate,
    pub created_by: Option<u64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    StockIn,
    StockOut,
    Donation,
    AdjustmentIn,
    AdjustmentOut,
    /// Physical count variance, either sign.
    CountAdjustment,
}

impl TransactionType {
    /// Signed change for a positive `quantity` of this type. Count adjustments
    /// carry their own sign.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            TransactionType::StockOut | TransactionType::AdjustmentOut => -quantity.abs(),
            TransactionType::CountAdjustment => quantity,
            _ => quantity.abs(),
        }
    }
}

/// New on-hand balance after applying `change`, refusing to go negative.
pub fn apply_movement(on_hand: i64, change: i64) -> ApiResult<i64> {
    let balance = on_hand
        .checked_add(change)
        .ok_or_else(|| ApiError::unprocessable("Stock quantity is out of range."))?;
    if balance < 0 {
        return Err(ApiError::unprocessable(format!(
            "Insufficient stock. Available: {}",
            on_hand
        )));
    }
    Ok(balance)
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct StockBalance {
    pub inventory_item_id: u64,
    pub item_code: String,
    pub name: String,
    pub unit: String,
    pub balance: i64,
    pub total_in: i64,
    pub total_out: i64,
    pub last_transaction_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn outgoing_types_are_negative() {
        assert_eq!(TransactionType::StockOut.signed(5), -5);
        assert_eq!(TransactionType::AdjustmentOut.signed(5), -5);
        assert_eq!(TransactionType::StockIn.signed(5), 5);
        assert_eq!(TransactionType::Donation.signed(5), 5);
        assert_eq!(TransactionType::CountAdjustment.signed(-3), -3);
    }

    #[test]
    fn balance_cannot_go_negative() {
        assert_eq!(apply_movement(10, -10).unwrap(), 0);
        let err = apply_movement(4, -5).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient stock. Available: 4");
    }

    #[test]
    fn ledger_balance_equals_sum_of_changes() {
        let moves = [
            TransactionType::StockIn.signed(50),
            TransactionType::StockOut.signed(20),
            TransactionType::Donation.signed(5),
            TransactionType::AdjustmentOut.signed(3),
            TransactionType::CountAdjustment.signed(-2),
        ];
        let mut on_hand = 0;
        for change in moves {
            on_hand = apply_movement(on_hand, change).unwrap();
        }
        assert_eq!(on_hand, moves.iter().sum::<i64>());
        assert_eq!(on_hand, 30);
    }

    #[test]
    fn type_names_match_column_values() {
        let names: Vec<String> = TransactionType::iter().map(|t| t.as_ref().to_string()).collect();
        assert!(names.contains(&"count_adjustment".to_string()));
        assert!(names.contains(&"stock_out".to_string()));
    }
}
