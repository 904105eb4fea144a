use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::model::workflow::Workflow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Quotation {
    pub id: u64,
    pub purchase_request_id: u64,
    pub supplier_id: u64,
    pub quotation_number: Option<String>,
    pub quotation_date: NaiveDate,
    pub total_amount: f64,
    pub delivery_days: Option<i32>,
    pub remarks: Option<String>,
    /// 0-100, set on evaluation
    pub evaluation_score: Option<f64>,
    pub evaluation_remarks: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Pending,
    Evaluated,
    Selected,
    NotSelected,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum QuotationAction {
    Evaluate,
    Select,
    /// Applied to the competing quotations when another one is selected.
    Supersede,
    Reject,
}

impl Workflow for QuotationStatus {
    type Action = QuotationAction;
    const RESOURCE: &'static str = "quotation";

    fn next(self, action: QuotationAction) -> Option<Self> {
        use QuotationAction as A;
        use QuotationStatus as S;
        match (self, action) {
            // re-evaluation overwrites the previous score
            (S::Pending | S::Evaluated, A::Evaluate) => Some(S::Evaluated),
            (S::Evaluated, A::Select) => Some(S::Selected),
            (S::Evaluated, A::Supersede) => Some(S::NotSelected),
            (S::Pending | S::Evaluated, A::Reject) => Some(S::Rejected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;
    use QuotationAction as A;
    use QuotationStatus as S;

    #[test]
    fn transition_table() {
        let states: Vec<S> = S::iter().collect();
        let actions: Vec<A> = A::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (S::Pending, A::Evaluate, S::Evaluated),
                (S::Evaluated, A::Evaluate, S::Evaluated),
                (S::Evaluated, A::Select, S::Selected),
                (S::Evaluated, A::Supersede, S::NotSelected),
                (S::Pending, A::Reject, S::Rejected),
                (S::Evaluated, A::Reject, S::Rejected),
            ],
        );
    }

    #[test]
    fn unevaluated_quotation_cannot_be_selected() {
        let err = S::Pending.transition(A::Select).unwrap_err();
        assert_eq!(err.to_string(), "Cannot select quotation in pending status.");
    }

    #[test]
    fn not_selected_uses_snake_case_column_value() {
        assert_eq!(S::NotSelected.as_ref(), "not_selected");
    }
}
