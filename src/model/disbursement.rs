use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::workflow::Workflow;

/// Disbursement voucher.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Disbursement {
    pub id: u64,
    pub dv_number: String,
    pub payee: String,
    pub particulars: String,
    pub amount: f64,
    pub budget_id: Option<u64>,
    pub purchase_order_id: Option<u64>,
    pub payment_mode: String,
    pub check_number: Option<String>,
    pub status: String,
    pub certified_by: Option<u64>,
    pub certified_at: Option<DateTime<Utc>>,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Check,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisbursementStatus {
    Pending,
    Certified,
    Approved,
    Paid,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum DisbursementAction {
    Certify,
    Approve,
    MarkPaid,
    Reject,
}

impl Workflow for DisbursementStatus {
    type Action = DisbursementAction;
    const RESOURCE: &'static str = "disbursement voucher";

    fn next(self, action: DisbursementAction) -> Option<Self> {
        use DisbursementAction as A;
        use DisbursementStatus as S;
        match (self, action) {
            (S::Pending, A::Certify) => Some(S::Certified),
            (S::Certified, A::Approve) => Some(S::Approved),
            (S::Approved, A::MarkPaid) => Some(S::Paid),
            (S::Pending | S::Certified, A::Reject) => Some(S::Rejected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;
    use DisbursementAction as A;
    use DisbursementStatus as S;

    #[test]
    fn transition_table() {
        let states: Vec<S> = S::iter().collect();
        let actions: Vec<A> = A::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (S::Pending, A::Certify, S::Certified),
                (S::Certified, A::Approve, S::Approved),
                (S::Approved, A::MarkPaid, S::Paid),
                (S::Pending, A::Reject, S::Rejected),
                (S::Certified, A::Reject, S::Rejected),
            ],
        );
    }

    #[test]
    fn paying_an_uncertified_voucher_is_refused() {
        let err = S::Pending.transition(A::MarkPaid).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot mark paid disbursement voucher in pending status."
        );
    }
}
