use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::model::workflow::Workflow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "employee_id": 1,
    "leave_type": "vacation",
    "start_date": "2026-02-02",
    "end_date": "2026-02-04",
    "days_requested": 3.0,
    "reason": "Family trip",
    "status": "pending",
    "recommended_by": null,
    "recommended_at": null,
    "approved_by": null,
    "approved_at": null,
    "remarks": null,
    "created_at": "2026-01-20T08:00:00Z",
    "updated_at": "2026-01-20T08:00:00Z"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_requested: f64,
    pub reason: Option<String>,
    pub status: String,
    pub recommended_by: Option<u64>,
    pub recommended_at: Option<DateTime<Utc>>,
    pub approved_by: Option<u64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaveType {
    Vacation,
    Sick,
    Maternity,
    Paternity,
    SpecialPrivilege,
    WithoutPay,
}

/// Which balance a leave type draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditBucket {
    Vacation,
    Sick,
}

impl LeaveType {
    pub fn credit_bucket(self) -> Option<CreditBucket> {
        match self {
            LeaveType::Vacation | LeaveType::SpecialPrivilege => Some(CreditBucket::Vacation),
            LeaveType::Sick => Some(CreditBucket::Sick),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LeaveCredits {
    pub employee_id: u64,
    pub vacation_leave: f64,
    pub sick_leave: f64,
}

impl LeaveCredits {
    pub fn balance(&self, bucket: CreditBucket) -> f64 {
        match bucket {
            CreditBucket::Vacation => self.vacation_leave,
            CreditBucket::Sick => self.sick_leave,
        }
    }

    fn with_balance(mut self, bucket: CreditBucket, value: f64) -> Self {
        match bucket {
            CreditBucket::Vacation => self.vacation_leave = value,
            CreditBucket::Sick => self.sick_leave = value,
        }
        self
    }

    pub fn deduct(self, bucket: CreditBucket, days: f64) -> ApiResult<Self> {
        let available = self.balance(bucket);
        if days > available {
            return Err(ApiError::unprocessable(format!(
                "Insufficient leave credits. Available: {} day(s).",
                available
            )));
        }
        Ok(self.with_balance(bucket, available - days))
    }

    pub fn restore(self, bucket: CreditBucket, days: f64) -> Self {
        let available = self.balance(bucket);
        self.with_balance(bucket, available + days)
    }
}

/// Monday-to-Friday days in the inclusive range.
pub fn weekdays_between(start: NaiveDate, end: NaiveDate) -> f64 {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as f64
}

/// Validates the date range and settles `days_requested`.
pub fn resolve_days(start: NaiveDate, end: NaiveDate, requested: Option<f64>) -> ApiResult<f64> {
    if end < start {
        return Err(ApiError::invalid(
            "end_date",
            "The end date must be a date after or equal to start date.",
        ));
    }
    let calendar_days = ((end - start).num_days() + 1) as f64;

    match requested {
        None => {
            let days = weekdays_between(start, end);
            if days == 0.0 {
                return Err(ApiError::invalid(
                    "start_date",
                    "The selected dates do not include any working day.",
                ));
            }
            Ok(days)
        }
        Some(days) => {
            if days <= 0.0 || (days * 2.0).fract() != 0.0 {
                return Err(ApiError::invalid(
                    "days_requested",
                    "The days requested must be a positive multiple of 0.5.",
                ));
            }
            if days > calendar_days {
                return Err(ApiError::invalid(
                    "days_requested",
                    format!("The days requested must not be greater than {}.", calendar_days),
                ));
            }
            Ok(days)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Recommended,
    Approved,
    Disapproved,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum LeaveAction {
    Recommend,
    Approve,
    Disapprove,
    Cancel,
}

impl Workflow for LeaveStatus {
    type Action = LeaveAction;
    const RESOURCE: &'static str = "leave request";

    fn next(self, action: LeaveAction) -> Option<Self> {
        use LeaveAction as A;
        use LeaveStatus as S;
        match (self, action) {
            (S::Pending, A::Recommend) => Some(S::Recommended),
            (S::Recommended, A::Approve) => Some(S::Approved),
            (S::Pending | S::Recommended, A::Disapprove) => Some(S::Disapproved),
            (S::Pending | S::Recommended | S::Approved, A::Cancel) => Some(S::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::testing::assert_table;
    use strum::IntoEnumIterator;
    use LeaveAction as A;
    use LeaveStatus as S;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn credits(vacation: f64, sick: f64) -> LeaveCredits {
        LeaveCredits {
            employee_id: 1,
            vacation_leave: vacation,
            sick_leave: sick,
        }
    }

    #[test]
    fn transition_table() {
        let states: Vec<S> = S::iter().collect();
        let actions: Vec<A> = A::iter().collect();
        assert_table(
            &states,
            &actions,
            &[
                (S::Pending, A::Recommend, S::Recommended),
                (S::Recommended, A::Approve, S::Approved),
                (S::Pending, A::Disapprove, S::Disapproved),
                (S::Recommended, A::Disapprove, S::Disapproved),
                (S::Pending, A::Cancel, S::Cancelled),
                (S::Recommended, A::Cancel, S::Cancelled),
                (S::Approved, A::Cancel, S::Cancelled),
            ],
        );
    }

    #[test]
    fn weekends_are_not_counted() {
        // 2026-02-06 is a Friday, 2026-02-09 the following Monday
        assert_eq!(weekdays_between(date(2026, 2, 6), date(2026, 2, 9)), 2.0);
        assert_eq!(weekdays_between(date(2026, 2, 2), date(2026, 2, 6)), 5.0);
        assert_eq!(weekdays_between(date(2026, 2, 7), date(2026, 2, 8)), 0.0);
    }

    #[test]
    fn default_days_are_working_days() {
        assert_eq!(resolve_days(date(2026, 2, 2), date(2026, 2, 4), None).unwrap(), 3.0);
    }

    #[test]
    fn weekend_only_range_needs_explicit_days() {
        assert!(resolve_days(date(2026, 2, 7), date(2026, 2, 8), None).is_err());
        assert_eq!(resolve_days(date(2026, 2, 7), date(2026, 2, 8), Some(1.5)).unwrap(), 1.5);
    }

    #[test]
    fn explicit_days_are_bounded() {
        let (s, e) = (date(2026, 2, 2), date(2026, 2, 3));
        assert_eq!(resolve_days(s, e, Some(0.5)).unwrap(), 0.5);
        assert!(resolve_days(s, e, Some(0.0)).is_err());
        assert!(resolve_days(s, e, Some(0.3)).is_err());
        assert!(resolve_days(s, e, Some(3.0)).is_err());
    }

    #[test]
    fn reversed_range_is_a_validation_error() {
        let err = resolve_days(date(2026, 2, 5), date(2026, 2, 2), None).unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("end_date"));
    }

    #[test]
    fn leave_types_map_to_buckets() {
        assert_eq!(LeaveType::SpecialPrivilege.credit_bucket(), Some(CreditBucket::Vacation));
        assert_eq!(LeaveType::Sick.credit_bucket(), Some(CreditBucket::Sick));
        assert_eq!(LeaveType::Maternity.credit_bucket(), None);
        assert_eq!(LeaveType::WithoutPay.credit_bucket(), None);
    }

    #[test]
    fn insufficient_credits_are_refused() {
        let err = credits(2.0, 10.0).deduct(CreditBucket::Vacation, 3.0).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient leave credits. Available: 2 day(s).");
    }

    #[test]
    fn approve_then_cancel_restores_balance() {
        let before = credits(15.0, 12.5);
        let after = before.deduct(CreditBucket::Sick, 2.5).unwrap();
        assert_eq!(after.sick_leave, 10.0);
        assert_eq!(after.vacation_leave, 15.0);
        assert_eq!(after.restore(CreditBucket::Sick, 2.5), before);
    }
}
