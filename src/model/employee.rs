use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_number": "EMP-0001",
        "first_name": "Maria",
        "middle_name": "Santos",
        "last_name": "Reyes",
        "email": "maria.reyes@agency.gov",
        "phone": "+639171234567",
        "position": "Administrative Officer II",
        "department": "Administrative Division",
        "employment_status": "permanent",
        "date_hired": "2020-02-03",
        "monthly_salary": 35000.0,
        "status": "active",
        "created_at": "2026-01-02T08:00:00Z",
        "updated_at": "2026-01-02T08:00:00Z"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "EMP-0001")]
    pub employee_number: String,

    #[schema(example = "Maria")]
    pub first_name: String,

    #[schema(example = "Santos", nullable = true)]
    pub middle_name: Option<String>,

    #[schema(example = "Reyes")]
    pub last_name: String,

    #[schema(example = "maria.reyes@agency.gov")]
    pub email: String,

    #[schema(example = "+639171234567", nullable = true)]
    pub phone: Option<String>,

    #[schema(example = "Administrative Officer II")]
    pub position: String,

    #[schema(example = "Administrative Division")]
    pub department: String,

    #[schema(example = "permanent")]
    pub employment_status: String,

    #[schema(example = "2020-02-03")]
    pub date_hired: NaiveDate,

    #[schema(example = 35000.0)]
    pub monthly_salary: f64,

    #[schema(example = "active")]
    pub status: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Permanent,
    Casual,
    Contractual,
    JobOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumString, EnumIter, Serialize, Deserialize, ToSchema)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    Inactive,
    Separated,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EmployeeStatistics {
    pub total: i64,
    pub active: i64,
    pub by_department: std::collections::BTreeMap<String, i64>,
    pub by_employment_status: std::collections::BTreeMap<String, i64>,
    pub average_salary: f64,
}
