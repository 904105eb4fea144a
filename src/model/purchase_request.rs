use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::workflow::Workflow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "pr_number": "PR-2026-0001",
    "department": "Administrative Division",
    "purpose": "Office supplies for Q1",
    "requested_by": 3,
    "budget_id": 2,
    "total_amount": 12500.0,
    "status": "draft",
    "remarks": null,
    "created_at": "2026-01-05T08:00:00Z",
    "updated_at": "2026-01-05T08:00:00Z"
}))]
pub struct PurchaseRequest {
    pub id: u64,
    pub pr_number: String,
    pub department: String,
    pub purpose: String,
    pub requested_by: Option<u64>,
    pub budget_id: Option<u64>,
    pub total_amount: f64,
    pub status: String,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PurchaseRequestItem {
    pub id: u64,
    pub purchase_request_id: u64,
    pub inventory_item_id: Option<u64>,
    pub description: String,
    pub unit: String,
    pub quantity: i64,
    pub unit_cost: f64,
    pub amount: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseRequestDetail {
    #[serde(flatten)]
    pub purchase_request: PurchaseRequest,
    pub items: Vec<PurchaseRequestItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseRequestStatus {
    Draft,
    Submitted,
    Recommended,
    Approved,
    Disapproved,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PurchaseRequestAction {
    Submit,
    Recommend,
    Approve,
    Disapprove,
    Cancel,
}

impl Workflow for PurchaseRequestStatus {
    type Action = PurchaseRequestAction;
    const RESOURCE: &'static str = "purchase request";

    fn next(self, action: PurchaseRequestAction) -> Option<Self> {
        use PurchaseRequestAction as A;
        use PurchaseRequestStatus as S;
        match (self, action) {
            (S::Draft, A::Submit) => Some(S::Submitted),
            (S::Submitted, A::Recommend) => Some(S::Recommended),
            (S::Recommended, A::Approve) => Some(S::Approved),
            (S::Submitted | S::Recommended, A::Disapprove) => Some(S::Disapproved),
            (S::Draft | S::Submitted | S::Recommended, A::Cancel) => Some(S::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;
    use PurchaseRequestAction as A;
    use PurchaseRequestStatus as S;

    #[test]
    fn transition_table() {
        let states: Vec<S> = S::iter().collect();
        let actions: Vec<A> = A::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (S::Draft, A::Submit, S::Submitted),
                (S::Submitted, A::Recommend, S::Recommended),
                (S::Recommended, A::Approve, S::Approved),
                (S::Submitted, A::Disapprove, S::Disapproved),
                (S::Recommended, A::Disapprove, S::Disapproved),
                (S::Draft, A::Cancel, S::Cancelled),
                (S::Submitted, A::Cancel, S::Cancelled),
                (S::Recommended, A::Cancel, S::Cancelled),
            ],
        );
    }

    #[test]
    fn rejection_message_names_action_and_status() {
        let err = S::Approved.transition(A::Cancel).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot cancel purchase request in approved status."
        );
    }

    #[test]
    fn status_round_trips_through_column_text() {
        assert_eq!(S::parse("recommended").unwrap(), S::Recommended);
        assert_eq!(S::Disapproved.as_ref(), "disapproved");
        assert!(S::parse("archived").is_err());
    }
}
