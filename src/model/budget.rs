use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::workflow::Workflow;
use crate::utils::amount::round2;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[schema(example = json!({
    "id": 2,
    "fiscal_year": 2026,
    "department": "Administrative Division",
    "category": "mooe",
    "description": "Maintenance and other operating expenses",
    "allocated_amount": 500000.0,
    "utilized_amount": 125000.0,
    "status": "active",
    "approved_by": 1,
    "approved_at": "2026-01-03T09:00:00Z",
    "created_at": "2026-01-02T08:00:00Z",
    "updated_at": "2026-01-03T09:00:00Z"
}))]
pub struct Budget {
    pub id: u64,
    pub fiscal_year: i32,
    pub department: String,
    pub category: String,
    pub description: Option<String>,
    pub allocated_amount: f64,
    pub utilized_amount: f64,
    pub status: String,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BudgetCategory {
    PersonnelServices,
    Mooe,
    CapitalOutlay,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Draft,
    Approved,
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BudgetAction {
    Approve,
    Activate,
    Close,
}

impl Workflow for BudgetStatus {
    type Action = BudgetAction;
    const RESOURCE: &'static str = "budget";

    fn next(self, action: BudgetAction) -> Option<Self> {
        match (self, action) {
            (BudgetStatus::Draft, BudgetAction::Approve) => Some(BudgetStatus::Approved),
            (BudgetStatus::Approved, BudgetAction::Activate) => Some(BudgetStatus::Active),
            (BudgetStatus::Active, BudgetAction::Close) => Some(BudgetStatus::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct BudgetUtilization {
    pub budget_id: u64,
    pub allocated_amount: f64,
    pub utilized_amount: f64,
    pub remaining_amount: f64,
    /// Percent of the allocation already used, 2 decimals.
    pub utilization_rate: f64,
}

impl Budget {
    pub fn remaining(&self) -> f64 {
        round2(self.allocated_amount - self.utilized_amount)
    }

    pub fn utilization(&self) -> BudgetUtilization {
        let rate = if self.allocated_amount > 0.0 {
            round2(self.utilized_amount / self.allocated_amount * 100.0)
        } else {
            0.0
        };
        BudgetUtilization {
            budget_id: self.id,
            allocated_amount: self.allocated_amount,
            utilized_amount: self.utilized_amount,
            remaining_amount: self.remaining(),
            utilization_rate: rate,
        }
    }

    /// Funds availability: the budget must be active and cover `amount`.
    pub fn ensure_available(&self, amount: f64) -> ApiResult<()> {
        if BudgetStatus::parse(&self.status)? != BudgetStatus::Active {
            return Err(ApiError::unprocessable("The selected budget is not active."));
        }
        if round2(amount) > self.remaining() {
            return Err(ApiError::unprocessable(format!(
                "Insufficient budget balance. Remaining: {:.2}",
                self.remaining()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use chrono::Utc;
    use strum::IntoEnumIterator;

    fn budget(status: BudgetStatus, allocated: f64, utilized: f64) -> Budget {
        Budget {
            id: 1,
            fiscal_year: 2026,
            department: "Finance".into(),
            category: BudgetCategory::Mooe.as_ref().into(),
            description: None,
            allocated_amount: allocated,
            utilized_amount: utilized,
            status: status.as_ref().into(),
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn transition_table() {
        let states: Vec<BudgetStatus> = BudgetStatus::iter().collect();
        let actions: Vec<BudgetAction> = BudgetAction::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (BudgetStatus::Draft, BudgetAction::Approve, BudgetStatus::Approved),
                (BudgetStatus::Approved, BudgetAction::Activate, BudgetStatus::Active),
                (BudgetStatus::Active, BudgetAction::Close, BudgetStatus::Closed),
            ],
        );
    }

    #[test]
    fn utilization_rate_is_a_rounded_percentage() {
        let u = budget(BudgetStatus::Active, 300_000.0, 100_000.0).utilization();
        assert_eq!(u.remaining_amount, 200_000.0);
        assert_eq!(u.utilization_rate, 33.33);
    }

    #[test]
    fn zero_allocation_reports_zero_rate() {
        assert_eq!(budget(BudgetStatus::Draft, 0.0, 0.0).utilization().utilization_rate, 0.0);
    }

    #[test]
    fn exact_remaining_amount_is_available() {
        let b = budget(BudgetStatus::Active, 1000.0, 989.98);
        assert!(b.ensure_available(10.02).is_ok());
    }

    #[test]
    fn overdraw_is_refused() {
        let err = budget(BudgetStatus::Active, 1000.0, 900.0)
            .ensure_available(100.01)
            .unwrap_err();
        assert_eq!(err.to_string(), "Insufficient budget balance. Remaining: 100.00");
    }

    #[test]
    fn inactive_budget_cannot_be_charged() {
        for status in [BudgetStatus::Draft, BudgetStatus::Approved, BudgetStatus::Closed] {
            assert!(budget(status, 1000.0, 0.0).ensure_available(1.0).is_err());
        }
    }
}
