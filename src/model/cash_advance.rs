use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::workflow::Workflow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CashAdvance {
    pub id: u64,
    pub ca_number: String,
    pub employee_id: u64,
    pub purpose: String,
    pub amount: f64,
    pub budget_id: Option<u64>,
    pub date_needed: Option<NaiveDate>,
    pub status: String,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CashAdvanceStatus {
    Pending,
    Approved,
    Released,
    Liquidated,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CashAdvanceAction {
    Approve,
    Release,
    Reject,
    /// Reached only through liquidation approval.
    Liquidate,
}

impl CashAdvanceStatus {
    /// Money is out and not yet accounted for.
    pub fn is_outstanding(self) -> bool {
        matches!(self, CashAdvanceStatus::Approved | CashAdvanceStatus::Released)
    }
}

impl Workflow for CashAdvanceStatus {
    type Action = CashAdvanceAction;
    const RESOURCE: &'static str = "cash advance";

    fn next(self, action: CashAdvanceAction) -> Option<Self> {
        use CashAdvanceAction as A;
        use CashAdvanceStatus as S;
        match (self, action) {
            (S::Pending, A::Approve) => Some(S::Approved),
            (S::Approved, A::Release) => Some(S::Released),
            (S::Pending, A::Reject) => Some(S::Rejected),
            (S::Released, A::Liquidate) => Some(S::Liquidated),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;
    use CashAdvanceAction as A;
    use CashAdvanceStatus as S;

    #[test]
    fn transition_table() {
        let states: Vec<S> = S::iter().collect();
        let actions: Vec<A> = A::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (S::Pending, A::Approve, S::Approved),
                (S::Approved, A::Release, S::Released),
                (S::Pending, A::Reject, S::Rejected),
                (S::Released, A::Liquidate, S::Liquidated),
            ],
        );
    }

    #[test]
    fn outstanding_covers_approved_and_released() {
        let outstanding: Vec<S> = S::iter().filter(|s| s.is_outstanding()).collect();
        assert_eq!(outstanding, vec![S::Approved, S::Released]);
    }
}
