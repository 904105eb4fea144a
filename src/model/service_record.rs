use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// One line of an employee's service history. An open record has no `date_to`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ServiceRecord {
    pub id: u64,
    pub employee_id: u64,
    pub designation: String,
    pub employment_status: String,
    pub monthly_salary: f64,
    pub department: String,
    pub date_from: NaiveDate,
    pub date_to: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
