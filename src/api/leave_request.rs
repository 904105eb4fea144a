use std::str::FromStr;

use actix_web::{HttpResponse, web};
use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, HR_STAFF},
    error::{ApiError, ApiResult},
    model::{
        leave_request::{
            CreditBucket, LeaveAction, LeaveCredits, LeaveRequest, LeaveStatus, LeaveType,
            resolve_days,
        },
        workflow::Workflow,
    },
    models::RemarksRequest,
    utils::{
        db_utils::{Filter, SqlValue, delete_by_id, fetch_page, find_by_id, lock_by_id, set_status, update_from},
        pagination::{LeaveRequestPage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "leave_requests";
const RESOURCE: &str = "Leave request";
const UPDATABLE: &[&str] = &["leave_type", "start_date", "end_date", "days_requested", "reason"];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLeaveRequest {
    /// Defaults to the caller's own employee record.
    pub employee_id: Option<u64>,
    pub leave_type: LeaveType,
    #[schema(example = "2026-02-02")]
    pub start_date: NaiveDate,
    #[schema(example = "2026-02-04")]
    pub end_date: NaiveDate,
    /// Working days in the range when omitted.
    #[schema(example = 3.0)]
    pub days_requested: Option<f64>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateLeaveRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leave_type: Option<LeaveType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_requested: Option<f64>,
    #[validate(length(max = 1000))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaveRequestQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub employee_id: Option<u64>,
    pub status: Option<String>,
    pub leave_type: Option<String>,
}

/// Locks the employee's credits row. A missing row reads as zero balances.
async fn lock_credits(conn: &mut MySqlConnection, employee_id: u64) -> ApiResult<LeaveCredits> {
    let credits = sqlx::query_as::<_, LeaveCredits>(
        "SELECT employee_id, vacation_leave, sick_leave FROM leave_credits WHERE employee_id = ? FOR UPDATE",
    )
    .bind(employee_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(credits.unwrap_or(LeaveCredits {
        employee_id,
        vacation_leave: 0.0,
        sick_leave: 0.0,
    }))
}

async fn store_credits(conn: &mut MySqlConnection, credits: &LeaveCredits) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO leave_credits (employee_id, vacation_leave, sick_leave)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE vacation_leave = VALUES(vacation_leave), sick_leave = VALUES(sick_leave)
        "#,
    )
    .bind(credits.employee_id)
    .bind(credits.vacation_leave)
    .bind(credits.sick_leave)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn bucket_of(leave: &LeaveRequest) -> ApiResult<Option<CreditBucket>> {
    let leave_type = LeaveType::from_str(&leave.leave_type)
        .map_err(|_| ApiError::Internal(anyhow!("unknown leave type {:?}", leave.leave_type)))?;
    Ok(leave_type.credit_bucket())
}

#[utoipa::path(
    get,
    path = "/api/leave-requests",
    params(LeaveRequestQuery),
    responses((status = 200, description = "Paginated leave requests", body = LeaveRequestPage)),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn list_leave_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveRequestQuery>,
) -> ApiResult<HttpResponse> {
    // non-staff only ever see their own requests
    let employee_id = if auth.has_any(HR_STAFF) {
        query.employee_id
    } else {
        Some(auth.employee_id.unwrap_or(0))
    };

    let filter = Filter::new()
        .eq("employee_id", employee_id)
        .eq("status", query.status.clone())
        .eq("leave_type", query.leave_type.clone());

    let page = fetch_page::<LeaveRequest>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "created_at DESC, id DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/leave-requests",
    request_body = CreateLeaveRequest,
    responses(
        (status = 201, description = "Leave request filed", body = LeaveRequest),
        (status = 403, description = "Filing for another employee", body = MessageResponse),
        (status = 422, description = "Validation error")
    ),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn create_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeaveRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let employee_id = payload
        .employee_id
        .or(auth.employee_id)
        .ok_or_else(|| ApiError::invalid("employee_id", "The employee id field is required."))?;
    auth.require_self_or(employee_id, HR_STAFF)?;

    let days = resolve_days(payload.start_date, payload.end_date, payload.days_requested)?;

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (employee_id, leave_type, start_date, end_date, days_requested, reason, status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.leave_type.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(days)
    .bind(&payload.reason)
    .bind(LeaveStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::invalid("employee_id", "The selected employee id is invalid."),
        other => other,
    })?;

    let leave: LeaveRequest = find_by_id(pool.get_ref(), TABLE, result.last_insert_id(), RESOURCE).await?;
    info!(
        leave_request_id = leave.id,
        employee_id,
        days = leave.days_requested,
        "Leave request filed"
    );

    Ok(response::created("Leave request created successfully.", leave))
}

#[utoipa::path(
    get,
    path = "/api/leave-requests/{id}",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request", body = LeaveRequest),
        (status = 404, description = "Leave request not found", body = MessageResponse)
    ),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn get_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave: LeaveRequest = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    auth.require_self_or(leave.employee_id, HR_STAFF)?;
    Ok(response::data(leave))
}

#[utoipa::path(
    put,
    path = "/api/leave-requests/{id}",
    params(("id", Path, description = "Leave request ID")),
    request_body = UpdateLeaveRequest,
    responses(
        (status = 200, description = "Leave request updated", body = LeaveRequest),
        (status = 404, description = "Leave request not found", body = MessageResponse),
        (status = 422, description = "Not pending or invalid dates")
    ),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn update_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateLeaveRequest>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let id = path.into_inner();

    let current: LeaveRequest = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    auth.require_self_or(current.employee_id, HR_STAFF)?;
    LeaveStatus::parse(&current.status)?.ensure_one_of(&[LeaveStatus::Pending], "update")?;

    let mut changes = payload.into_inner();
    let dates_changed = changes.start_date.is_some() || changes.end_date.is_some();
    if dates_changed || changes.days_requested.is_some() {
        let start = changes.start_date.unwrap_or(current.start_date);
        let end = changes.end_date.unwrap_or(current.end_date);
        // new dates without an explicit day count are recounted
        let requested = match changes.days_requested {
            Some(days) => Some(days),
            None if dates_changed => None,
            None => Some(current.days_requested),
        };
        changes.days_requested = Some(resolve_days(start, end, requested)?);
    }

    update_from(pool.get_ref(), TABLE, UPDATABLE, id, &changes).await?;

    let leave: LeaveRequest = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    Ok(response::ok_with("Leave request updated successfully.", leave))
}

#[utoipa::path(
    delete,
    path = "/api/leave-requests/{id}",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request deleted", body = MessageResponse),
        (status = 404, description = "Leave request not found", body = MessageResponse),
        (status = 422, description = "Leave request is no longer pending", body = MessageResponse)
    ),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn delete_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();

    let current: LeaveRequest = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    auth.require_self_or(current.employee_id, HR_STAFF)?;
    LeaveStatus::parse(&current.status)?.ensure_one_of(&[LeaveStatus::Pending], "delete")?;

    delete_by_id(pool.get_ref(), TABLE, id).await?;
    Ok(response::message("Leave request deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/leave-requests/{id}/recommend",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request recommended", body = LeaveRequest),
        (status = 422, description = "Not pending", body = MessageResponse)
    ),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn recommend_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let leave: LeaveRequest = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = LeaveStatus::parse(&leave.status)?.transition(LeaveAction::Recommend)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("recommended_by", SqlValue::from(auth.user_id)), ("recommended_at", SqlValue::now())],
    )
    .await?;
    let leave: LeaveRequest = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(leave_request_id = id, user_id = auth.user_id, "Leave request recommended");
    Ok(response::ok_with("Leave request recommended successfully.", leave))
}

#[utoipa::path(
    post,
    path = "/api/leave-requests/{id}/approve",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request approved and credits deducted", body = LeaveRequest),
        (status = 422, description = "Not recommended or insufficient credits", body = MessageResponse)
    ),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn approve_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let leave: LeaveRequest = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = LeaveStatus::parse(&leave.status)?.transition(LeaveAction::Approve)?;

    if let Some(bucket) = bucket_of(&leave)? {
        let credits = lock_credits(&mut tx, leave.employee_id).await?;
        let remaining = credits.deduct(bucket, leave.days_requested)?;
        store_credits(&mut tx, &remaining).await?;
    }

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("approved_by", SqlValue::from(auth.user_id)), ("approved_at", SqlValue::now())],
    )
    .await?;
    let leave: LeaveRequest = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(
        leave_request_id = id,
        employee_id = leave.employee_id,
        days = leave.days_requested,
        "Leave request approved"
    );
    Ok(response::ok_with("Leave request approved successfully.", leave))
}

#[utoipa::path(
    post,
    path = "/api/leave-requests/{id}/disapprove",
    params(("id", Path, description = "Leave request ID")),
    request_body = RemarksRequest,
    responses(
        (status = 200, description = "Leave request disapproved", body = LeaveRequest),
        (status = 422, description = "Missing remarks or illegal transition", body = MessageResponse)
    ),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn disapprove_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RemarksRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_any(HR_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let leave: LeaveRequest = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = LeaveStatus::parse(&leave.status)?.transition(LeaveAction::Disapprove)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[
            ("remarks", SqlValue::from(payload.remarks.as_str())),
            ("approved_by", SqlValue::from(auth.user_id)),
            ("approved_at", SqlValue::now()),
        ],
    )
    .await?;
    let leave: LeaveRequest = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(leave_request_id = id, user_id = auth.user_id, "Leave request disapproved");
    Ok(response::ok_with("Leave request disapproved successfully.", leave))
}

#[utoipa::path(
    post,
    path = "/api/leave-requests/{id}/cancel",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request cancelled; approved credits restored", body = LeaveRequest),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Leave Requests",
    security(("bearer_auth" = []))
)]
pub async fn cancel_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let leave: LeaveRequest = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    auth.require_self_or(leave.employee_id, HR_STAFF)?;

    let current = LeaveStatus::parse(&leave.status)?;
    let next = current.transition(LeaveAction::Cancel)?;

    if current == LeaveStatus::Approved {
        if let Some(bucket) = bucket_of(&leave)? {
            let credits = lock_credits(&mut tx, leave.employee_id).await?;
            store_credits(&mut tx, &credits.restore(bucket, leave.days_requested)).await?;
        }
    }

    set_status(&mut tx, TABLE, id, next.as_ref(), &[]).await?;
    let leave: LeaveRequest = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(leave_request_id = id, user_id = auth.user_id, "Leave request cancelled");
    Ok(response::ok_with("Leave request cancelled successfully.", leave))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn leave(leave_type: &str) -> LeaveRequest {
        let now = Utc::now();
        LeaveRequest {
            id: 1,
            employee_id: 7,
            leave_type: leave_type.to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 2, 4).unwrap(),
            days_requested: 3.0,
            reason: None,
            status: "pending".to_string(),
            recommended_by: None,
            recommended_at: None,
            approved_by: None,
            approved_at: None,
            remarks: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stored_leave_type_maps_to_its_bucket() {
        assert_eq!(bucket_of(&leave("special_privilege")).unwrap(), Some(CreditBucket::Vacation));
        assert_eq!(bucket_of(&leave("sick")).unwrap(), Some(CreditBucket::Sick));
        assert_eq!(bucket_of(&leave("maternity")).unwrap(), None);
    }

    #[test]
    fn corrupt_leave_type_is_a_server_error() {
        assert!(matches!(bucket_of(&leave("sabbatical")), Err(ApiError::Internal(_))));
    }

    #[test]
    fn update_payload_only_serializes_supplied_fields() {
        let payload: UpdateLeaveRequest = serde_json::from_str(r#"{"reason":"Moved dates"}"#).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, serde_json::json!({ "reason": "Moved dates" }));
    }
}
