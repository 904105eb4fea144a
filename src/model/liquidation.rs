use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::workflow::Workflow;
use crate::utils::amount::round2;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Liquidation {
    pub id: u64,
    pub liquidation_number: String,
    pub cash_advance_id: u64,
    pub total_expenses: f64,
    /// Unspent cash the employee returns.
    pub refund_amount: f64,
    /// Overspend owed to the employee.
    pub reimbursement_amount: f64,
    pub status: String,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LiquidationItem {
    pub id: u64,
    pub liquidation_id: u64,
    pub description: String,
    pub amount: f64,
    pub receipt_number: Option<String>,
    pub expense_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LiquidationDetail {
    #[serde(flatten)]
    pub liquidation: Liquidation,
    pub items: Vec<LiquidationItem>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub total_expenses: f64,
    pub refund_amount: f64,
    pub reimbursement_amount: f64,
}

/// Reconciles a cash advance against the expense lines.
pub fn settle(advance: f64, expenses: impl IntoIterator<Item = f64>) -> Settlement {
    let total = round2(expenses.into_iter().sum());
    let diff = round2(advance - total);
    Settlement {
        total_expenses: total,
        refund_amount: diff.max(0.0),
        reimbursement_amount: (-diff).max(0.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LiquidationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum LiquidationAction {
    Approve,
    Reject,
}

impl Workflow for LiquidationStatus {
    type Action = LiquidationAction;
    const RESOURCE: &'static str = "liquidation";

    fn next(self, action: LiquidationAction) -> Option<Self> {
        match (self, action) {
            (LiquidationStatus::Pending, LiquidationAction::Approve) => Some(LiquidationStatus::Approved),
            (LiquidationStatus::Pending, LiquidationAction::Reject) => Some(LiquidationStatus::Rejected),
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
        let states: Vec<LiquidationStatus> = LiquidationStatus::iter().collect();
        let actions: Vec<LiquidationAction> = LiquidationAction::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (LiquidationStatus::Pending, LiquidationAction::Approve, LiquidationStatus::Approved),
                (LiquidationStatus::Pending, LiquidationAction::Reject, LiquidationStatus::Rejected),
            ],
        );
    }

    #[test]
    fn underspend_is_refunded() {
        let s = settle(5000.0, [1200.5, 2300.25]);
        assert_eq!(s.total_expenses, 3500.75);
        assert_eq!(s.refund_amount, 1499.25);
        assert_eq!(s.reimbursement_amount, 0.0);
    }

    #[test]
    fn overspend_is_reimbursed() {
        let s = settle(1000.0, [800.0, 450.0]);
        assert_eq!(s.refund_amount, 0.0);
        assert_eq!(s.reimbursement_amount, 250.0);
    }

    #[test]
    fn refund_minus_reimbursement_equals_difference() {
        for (advance, spent) in [(100.0, 30.0), (100.0, 130.0), (100.0, 100.0), (0.1, 0.2)] {
            let s = settle(advance, [spent]);
            assert!(s.refund_amount >= 0.0 && s.reimbursement_amount >= 0.0);
            assert_eq!(
                round2(s.refund_amount - s.reimbursement_amount),
                round2(advance - spent)
            );
        }
    }
}
