use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, HR_STAFF},
    error::{ApiError, ApiResult},
    model::{employee::EmploymentStatus, service_record::ServiceRecord},
    utils::{
        amount::round2,
        db_utils::{Filter, delete_by_id, fetch_page, find_by_id, update_from},
        pagination::{Pagination, ServiceRecordPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "service_records";
const RESOURCE: &str = "Service record";
const UPDATABLE: &[&str] = &[
    "designation",
    "employment_status",
    "monthly_salary",
    "department",
    "date_from",
    "date_to",
    "remarks",
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateServiceRecord {
    pub employee_id: u64,
    #[validate(length(min = 1, max = 150))]
    #[schema(example = "Administrative Officer II")]
    pub designation: String,
    pub employment_status: EmploymentStatus,
    #[validate(range(min = 0.0))]
    pub monthly_salary: f64,
    #[validate(length(min = 1, max = 150))]
    pub department: String,
    #[schema(example = "2020-02-03")]
    pub date_from: NaiveDate,
    pub date_to: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateServiceRecord {
    #[validate(length(min = 1, max = 150))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub designation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employment_status: Option<EmploymentStatus>,
    #[validate(range(min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_salary: Option<f64>,
    #[validate(length(min = 1, max = 150))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_to: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ServiceRecordQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub employee_id: Option<u64>,
}

fn check_period(date_from: NaiveDate, date_to: Option<NaiveDate>) -> ApiResult<()> {
    match date_to {
        Some(to) if to < date_from => Err(ApiError::invalid(
            "date_to",
            "The date to must be a date after or equal to date from.",
        )),
        _ => Ok(()),
    }
}

#[utoipa::path(
    get,
    path = "/api/service-records",
    params(ServiceRecordQuery),
    responses((status = 200, description = "Paginated service records", body = ServiceRecordPage)),
    tag = "Service Records",
    security(("bearer_auth" = []))
)]
pub async fn list_service_records(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ServiceRecordQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new().eq("employee_id", query.employee_id);

    let page = fetch_page::<ServiceRecord>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "date_from DESC, id DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

/// Service history of one employee, oldest first
#[utoipa::path(
    get,
    path = "/api/service-records/employee/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses((status = 200, description = "Chronological service records", body = [ServiceRecord])),
    tag = "Service Records",
    security(("bearer_auth" = []))
)]
pub async fn employee_service_records(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let records = sqlx::query_as::<_, ServiceRecord>(
        "SELECT * FROM service_records WHERE employee_id = ? ORDER BY date_from ASC, id ASC",
    )
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::data(records))
}

#[utoipa::path(
    post,
    path = "/api/service-records",
    request_body = CreateServiceRecord,
    responses(
        (status = 201, description = "Service record created", body = ServiceRecord),
        (status = 422, description = "Validation error")
    ),
    tag = "Service Records",
    security(("bearer_auth" = []))
)]
pub async fn create_service_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateServiceRecord>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    payload.validate()?;
    check_period(payload.date_from, payload.date_to)?;

    let employee_exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(payload.employee_id)
        .fetch_one(pool.get_ref())
        .await?;
    if employee_exists == 0 {
        return Err(ApiError::invalid("employee_id", "The selected employee id is invalid."));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO service_records
            (employee_id, designation, employment_status, monthly_salary, department, date_from, date_to, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(&payload.designation)
    .bind(payload.employment_status.as_ref())
    .bind(round2(payload.monthly_salary))
    .bind(&payload.department)
    .bind(payload.date_from)
    .bind(payload.date_to)
    .bind(&payload.remarks)
    .execute(pool.get_ref())
    .await?;

    let record: ServiceRecord = find_by_id(pool.get_ref(), TABLE, result.last_insert_id(), RESOURCE).await?;
    info!(service_record_id = record.id, employee_id = record.employee_id, "Service record created");

    Ok(response::created("Service record created successfully.", record))
}

#[utoipa::path(
    get,
    path = "/api/service-records/{id}",
    params(("id", Path, description = "Service record ID")),
    responses(
        (status = 200, description = "Service record", body = ServiceRecord),
        (status = 404, description = "Service record not found", body = MessageResponse)
    ),
    tag = "Service Records",
    security(("bearer_auth" = []))
)]
pub async fn get_service_record(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let record: ServiceRecord = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(record))
}

#[utoipa::path(
    put,
    path = "/api/service-records/{id}",
    params(("id", Path, description = "Service record ID")),
    request_body = UpdateServiceRecord,
    responses(
        (status = 200, description = "Service record updated", body = ServiceRecord),
        (status = 404, description = "Service record not found", body = MessageResponse)
    ),
    tag = "Service Records",
    security(("bearer_auth" = []))
)]
pub async fn update_service_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateServiceRecord>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let current: ServiceRecord = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    check_period(
        payload.date_from.unwrap_or(current.date_from),
        payload.date_to.or(current.date_to),
    )?;

    update_from(pool.get_ref(), TABLE, UPDATABLE, id, &payload.into_inner()).await?;

    let record: ServiceRecord = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    Ok(response::ok_with("Service record updated successfully.", record))
}

#[utoipa::path(
    delete,
    path = "/api/service-records/{id}",
    params(("id", Path, description = "Service record ID")),
    responses(
        (status = 200, description = "Service record deleted", body = MessageResponse),
        (status = 404, description = "Service record not found", body = MessageResponse)
    ),
    tag = "Service Records",
    security(("bearer_auth" = []))
)]
pub async fn delete_service_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    let id = path.into_inner();

    find_by_id::<ServiceRecord, _>(pool.get_ref(), TABLE, id, RESOURCE).await?;
    delete_by_id(pool.get_ref(), TABLE, id).await?;

    Ok(response::message("Service record deleted successfully."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn open_and_forward_periods_are_valid() {
        assert!(check_period(d(2020, 1, 1), None).is_ok());
        assert!(check_period(d(2020, 1, 1), Some(d(2020, 1, 1))).is_ok());
        assert!(check_period(d(2020, 1, 1), Some(d(2021, 6, 30))).is_ok());
    }

    #[test]
    fn period_ending_before_it_starts_is_rejected() {
        assert!(check_period(d(2021, 1, 1), Some(d(2020, 12, 31))).is_err());
    }
}
