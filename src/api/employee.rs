use actix_web::{HttpResponse, web};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, HR_STAFF},
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        employee::{Employee, EmployeeStatistics, EmployeeStatus, EmploymentStatus},
        leave_request::LeaveCredits,
        service_record::ServiceRecord,
    },
    utils::{
        amount::round2,
        db_utils::{Filter, count_by, delete_by_id, fetch_page, find_by_id, lock_by_id, update_from},
        pagination::{EmployeePage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "employees";
const RESOURCE: &str = "Employee";
const UPDATABLE: &[&str] = &[
    "employee_number",
    "first_name",
    "middle_name",
    "last_name",
    "email",
    "phone",
    "position",
    "department",
    "employment_status",
    "date_hired",
    "monthly_salary",
    "status",
];
const SEARCH_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "employee_number",
    "email",
    "position",
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateEmployee {
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "EMP-0001")]
    pub employee_number: String,
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "Maria")]
    pub first_name: String,
    #[validate(length(max = 100))]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "Reyes")]
    pub last_name: String,
    #[validate(email)]
    #[schema(example = "maria.reyes@agency.gov")]
    pub email: String,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 150))]
    #[schema(example = "Administrative Officer II")]
    pub position: String,
    #[validate(length(min = 1, max = 150))]
    #[schema(example = "Administrative Division")]
    pub department: String,
    pub employment_status: EmploymentStatus,
    #[schema(example = "2020-02-03")]
    pub date_hired: NaiveDate,
    #[validate(range(min = 0.0))]
    #[schema(example = 35000.0)]
    pub monthly_salary: f64,
    pub status: Option<EmployeeStatus>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateEmployee {
    #[validate(length(min = 1, max = 50))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
    #[validate(length(min = 1, max = 100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[validate(email)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 150))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[validate(length(min = 1, max = 150))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment_status: Option<EmploymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_hired: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_salary: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EmployeeStatus>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PromoteEmployee {
    #[validate(length(min = 1, max = 150))]
    #[schema(example = "Administrative Officer III")]
    pub position: String,
    #[validate(range(min = 0.0))]
    #[schema(example = 42000.0)]
    pub monthly_salary: f64,
    /// Moves the employee to another department when given.
    #[validate(length(min = 1, max = 150))]
    pub department: Option<String>,
    #[schema(example = "2026-07-01")]
    pub effective_date: NaiveDate,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub department: Option<String>,
    pub status: Option<String>,
    pub employment_status: Option<String>,
    /// Search by name, number, email or position
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeSearch {
    pub q: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses((status = 200, description = "Paginated employee list", body = EmployeePage)),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("department", query.department.clone())
        .eq("status", query.status.clone())
        .eq("employment_status", query.employment_status.clone())
        .like_any(SEARCH_COLUMNS, query.search.as_deref());

    let page = fetch_page::<Employee>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "last_name ASC, first_name ASC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/employees/search",
    params(EmployeeSearch),
    responses(
        (status = 200, description = "Matching employees", body = EmployeePage),
        (status = 422, description = "Missing search term")
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn search_employees(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeSearch>,
) -> ApiResult<HttpResponse> {
    let term = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::invalid("q", "The q field is required."))?;

    let filter = Filter::new().like_any(SEARCH_COLUMNS, Some(term));
    let page = fetch_page::<Employee>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "last_name ASC, first_name ASC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/employees/statistics",
    responses((status = 200, description = "Headcount breakdown", body = EmployeeStatistics)),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn employee_statistics(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let (total, active, average_salary): (i64, i64, f64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            CAST(COALESCE(SUM(status = 'active'), 0) AS SIGNED),
            COALESCE(AVG(monthly_salary), 0)
        FROM employees
        "#,
    )
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(EmployeeStatistics {
        total,
        active,
        by_department: count_by(pool.get_ref(), TABLE, "department").await?,
        by_employment_status: count_by(pool.get_ref(), TABLE, "employment_status").await?,
        average_salary: round2(average_salary),
    }))
}

/// Create an employee together with its leave credits and opening service record
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 409, description = "Employee number or email already used", body = MessageResponse),
        (status = 422, description = "Validation error")
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    payload.validate()?;

    let mut tx = pool.begin().await?;

    let employee_id = sqlx::query(
        r#"
        INSERT INTO employees
            (employee_number, first_name, middle_name, last_name, email, phone,
             position, department, employment_status, date_hired, monthly_salary, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_number.trim())
    .bind(payload.first_name.trim())
    .bind(&payload.middle_name)
    .bind(payload.last_name.trim())
    .bind(payload.email.trim().to_lowercase())
    .bind(&payload.phone)
    .bind(&payload.position)
    .bind(&payload.department)
    .bind(payload.employment_status.as_ref())
    .bind(payload.date_hired)
    .bind(round2(payload.monthly_salary))
    .bind(payload.status.unwrap_or(EmployeeStatus::Active).as_ref())
    .execute(&mut *tx)
    .await?
    .last_insert_id();

    sqlx::query("INSERT INTO leave_credits (employee_id, vacation_leave, sick_leave) VALUES (?, ?, ?)")
        .bind(employee_id)
        .bind(config.default_vacation_credits)
        .bind(config.default_sick_credits)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO service_records
            (employee_id, designation, employment_status, monthly_salary, department, date_from, remarks)
        VALUES (?, ?, ?, ?, ?, ?, 'Original appointment')
        "#,
    )
    .bind(employee_id)
    .bind(&payload.position)
    .bind(payload.employment_status.as_ref())
    .bind(round2(payload.monthly_salary))
    .bind(&payload.department)
    .bind(payload.date_hired)
    .execute(&mut *tx)
    .await?;

    let employee: Employee = find_by_id(&mut *tx, TABLE, employee_id, RESOURCE).await?;
    tx.commit().await?;

    info!(employee_id, user_id = auth.user_id, "Employee created");
    Ok(response::created("Employee created successfully.", employee))
}

#[utoipa::path(
    get,
    path = "/api/employees/{id}",
    params(("id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = MessageResponse)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let employee: Employee = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(employee))
}

#[utoipa::path(
    put,
    path = "/api/employees/{id}",
    params(("id", Path, description = "Employee ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 404, description = "Employee not found", body = MessageResponse),
        (status = 422, description = "Validation error")
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    find_by_id::<Employee, _>(pool.get_ref(), TABLE, id, RESOURCE).await?;
    update_from(pool.get_ref(), TABLE, UPDATABLE, id, &payload.into_inner()).await?;

    let employee: Employee = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    Ok(response::ok_with("Employee updated successfully.", employee))
}

#[utoipa::path(
    delete,
    path = "/api/employees/{id}",
    params(("id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee deleted", body = MessageResponse),
        (status = 404, description = "Employee not found", body = MessageResponse),
        (status = 409, description = "Employee has cash advances on record", body = MessageResponse)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    let id = path.into_inner();

    find_by_id::<Employee, _>(pool.get_ref(), TABLE, id, RESOURCE).await?;
    delete_by_id(pool.get_ref(), TABLE, id).await?;

    info!(employee_id = id, user_id = auth.user_id, "Employee deleted");
    Ok(response::message("Employee deleted successfully."))
}

/// Promote an employee: closes the open service record and opens a new one
#[utoipa::path(
    post,
    path = "/api/employees/{id}/promote",
    params(("id", Path, description = "Employee ID")),
    request_body = PromoteEmployee,
    responses(
        (status = 200, description = "Employee promoted", body = Employee),
        (status = 404, description = "Employee not found", body = MessageResponse),
        (status = 422, description = "Salary decrease or effective date before the current record")
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn promote_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<PromoteEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let employee: Employee = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;

    if round2(payload.monthly_salary) < employee.monthly_salary {
        return Err(ApiError::invalid(
            "monthly_salary",
            "The new monthly salary must not be lower than the current salary.",
        ));
    }

    let open: Option<ServiceRecord> = sqlx::query_as(
        "SELECT * FROM service_records WHERE employee_id = ? AND date_to IS NULL ORDER BY date_from DESC LIMIT 1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(open) = &open {
        if payload.effective_date <= open.date_from {
            return Err(ApiError::invalid(
                "effective_date",
                "The effective date must be after the start of the current service record.",
            ));
        }
        sqlx::query("UPDATE service_records SET date_to = ? WHERE employee_id = ? AND date_to IS NULL")
            .bind(payload.effective_date - Duration::days(1))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let department = payload.department.clone().unwrap_or(employee.department.clone());

    sqlx::query(
        r#"
        INSERT INTO service_records
            (employee_id, designation, employment_status, monthly_salary, department, date_from, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&payload.position)
    .bind(&employee.employment_status)
    .bind(round2(payload.monthly_salary))
    .bind(&department)
    .bind(payload.effective_date)
    .bind(payload.remarks.clone().unwrap_or_else(|| "Promotion".to_string()))
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE employees SET position = ?, monthly_salary = ?, department = ? WHERE id = ?")
        .bind(&payload.position)
        .bind(round2(payload.monthly_salary))
        .bind(&department)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let promoted: Employee = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(
        employee_id = id,
        from = %employee.position,
        to = %promoted.position,
        user_id = auth.user_id,
        "Employee promoted"
    );
    Ok(response::ok_with("Employee promoted successfully.", promoted))
}

#[utoipa::path(
    get,
    path = "/api/employees/{id}/leave-credits",
    params(("id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Leave credit balances", body = LeaveCredits),
        (status = 404, description = "Employee not found", body = MessageResponse)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn leave_credits(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    auth.require_self_or(id, HR_STAFF)?;

    let credits = sqlx::query_as::<_, LeaveCredits>(
        "SELECT employee_id, vacation_leave, sick_leave FROM leave_credits WHERE employee_id = ?",
    )
    .bind(id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found(RESOURCE))?;

    Ok(response::data(credits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_payload_rejects_negative_salary() {
        let body = r#"{
            "employee_number": "EMP-0001",
            "first_name": "Maria",
            "last_name": "Reyes",
            "email": "maria.reyes@agency.gov",
            "position": "Administrative Officer II",
            "department": "Administrative Division",
            "employment_status": "permanent",
            "date_hired": "2020-02-03",
            "monthly_salary": -1
        }"#;
        let payload: CreateEmployee = serde_json::from_str(body).unwrap();
        let err: ApiError = payload.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["monthly_salary"]);
    }

    #[test]
    fn employment_status_must_be_known() {
        let body = r#"{"employment_status":"intern"}"#;
        assert!(serde_json::from_str::<UpdateEmployee>(body).is_err());
    }

    #[test]
    fn promotion_department_is_optional() {
        let body = r#"{"position":"Administrative Officer III","monthly_salary":42000,"effective_date":"2026-07-01"}"#;
        let payload: PromoteEmployee = serde_json::from_str(body).unwrap();
        assert!(payload.validate().is_ok());
        assert!(payload.department.is_none());
    }
}
