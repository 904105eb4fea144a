use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::budget::{charge_budget, ensure_budget_exists},
    auth::auth::{AuthUser, FINANCE_STAFF},
    error::{ApiError, ApiResult},
    model::{
        cash_advance::{CashAdvance, CashAdvanceAction, CashAdvanceStatus},
        workflow::Workflow,
    },
    models::RemarksRequest,
    utils::{
        amount::round2,
        db_utils::{Filter, SqlValue, fetch_page, find_by_id, has_changes, lock_by_id, set_status, update_in},
        doc_number::{DocumentSeries, next_number},
        pagination::{CashAdvancePage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "cash_advances";
const RESOURCE: &str = "Cash advance";
const UPDATABLE: &[&str] = &["purpose", "amount", "budget_id", "date_needed", "remarks"];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCashAdvance {
    /// Defaults to the caller's own employee record.
    pub employee_id: Option<u64>,
    #[validate(length(min = 1))]
    #[schema(example = "Travel to regional office for audit")]
    pub purpose: String,
    #[validate(range(exclusive_min = 0.0))]
    #[schema(example = 15000.0)]
    pub amount: f64,
    pub budget_id: Option<u64>,
    pub date_needed: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateCashAdvance {
    #[validate(length(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_needed: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CashAdvanceQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub employee_id: Option<u64>,
    pub status: Option<String>,
}

/// One unliquidated advance per employee.
async fn ensure_no_outstanding(conn: &mut MySqlConnection, employee_id: u64) -> ApiResult<()> {
    let statuses: Vec<String> = sqlx::query_scalar("SELECT status FROM cash_advances WHERE employee_id = ?")
        .bind(employee_id)
        .fetch_all(&mut *conn)
        .await?;

    for status in statuses {
        if CashAdvanceStatus::parse(&status)?.is_outstanding() {
            return Err(ApiError::invalid(
                "employee_id",
                "The employee has an outstanding cash advance that must be liquidated first.",
            ));
        }
    }
    Ok(())
}

/// Loads a pending advance the caller may still edit.
async fn editable(auth: &AuthUser, conn: &mut MySqlConnection, id: u64, verb: &str) -> ApiResult<CashAdvance> {
    let current: CashAdvance = lock_by_id(conn, TABLE, id, RESOURCE).await?;
    auth.require_self_or(current.employee_id, FINANCE_STAFF)?;
    CashAdvanceStatus::parse(&current.status)?.ensure_one_of(&[CashAdvanceStatus::Pending], verb)?;
    Ok(current)
}

#[utoipa::path(
    get,
    path = "/api/cash-advances",
    params(CashAdvanceQuery),
    responses((status = 200, description = "Paginated cash advances", body = CashAdvancePage)),
    tag = "Cash Advances",
    security(("bearer_auth" = []))
)]
pub async fn list_cash_advances(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CashAdvanceQuery>,
) -> ApiResult<HttpResponse> {
    let employee_id = if auth.has_any(FINANCE_STAFF) {
        query.employee_id
    } else {
        Some(auth.employee_id.unwrap_or(0))
    };

    let filter = Filter::new()
        .eq("employee_id", employee_id)
        .eq("status", query.status.clone());

    let page = fetch_page::<CashAdvance>(
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
    path = "/api/cash-advances",
    request_body = CreateCashAdvance,
    responses(
        (status = 201, description = "Cash advance filed", body = CashAdvance),
        (status = 422, description = "Validation error or an outstanding advance exists")
    ),
    tag = "Cash Advances",
    security(("bearer_auth" = []))
)]
pub async fn create_cash_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCashAdvance>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let employee_id = payload
        .employee_id
        .or(auth.employee_id)
        .ok_or_else(|| ApiError::invalid("employee_id", "The employee id field is required."))?;
    auth.require_self_or(employee_id, FINANCE_STAFF)?;

    let mut tx = pool.begin().await?;
    let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE id = ? FOR UPDATE")
        .bind(employee_id)
        .fetch_one(&mut *tx)
        .await?;
    if known == 0 {
        return Err(ApiError::invalid("employee_id", "The selected employee id is invalid."));
    }
    ensure_no_outstanding(&mut tx, employee_id).await?;
    ensure_budget_exists(&mut tx, payload.budget_id).await?;

    let ca_number = next_number(&mut tx, DocumentSeries::CashAdvance, Utc::now().date_naive()).await?;
    let result = sqlx::query(
        r#"
        INSERT INTO cash_advances (ca_number, employee_id, purpose, amount, budget_id, date_needed, status, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&ca_number)
    .bind(employee_id)
    .bind(&payload.purpose)
    .bind(round2(payload.amount))
    .bind(payload.budget_id)
    .bind(payload.date_needed)
    .bind(CashAdvanceStatus::Pending.as_ref())
    .bind(&payload.remarks)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    let advance: CashAdvance = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(cash_advance_id = id, ca_number = %ca_number, employee_id, amount = advance.amount, "Cash advance filed");
    Ok(response::created("Cash advance created successfully.", advance))
}

#[utoipa::path(
    get,
    path = "/api/cash-advances/{id}",
    params(("id", Path, description = "Cash advance ID")),
    responses(
        (status = 200, description = "Cash advance", body = CashAdvance),
        (status = 404, description = "Cash advance not found", body = MessageResponse)
    ),
    tag = "Cash Advances",
    security(("bearer_auth" = []))
)]
pub async fn get_cash_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let advance: CashAdvance = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    auth.require_self_or(advance.employee_id, FINANCE_STAFF)?;
    Ok(response::data(advance))
}

#[utoipa::path(
    put,
    path = "/api/cash-advances/{id}",
    params(("id", Path, description = "Cash advance ID")),
    request_body = UpdateCashAdvance,
    responses(
        (status = 200, description = "Cash advance updated", body = CashAdvance),
        (status = 422, description = "Cash advance is no longer pending", body = MessageResponse)
    ),
    tag = "Cash Advances",
    security(("bearer_auth" = []))
)]
pub async fn update_cash_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateCashAdvance>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    editable(&auth, &mut tx, id, "update").await?;
    ensure_budget_exists(&mut tx, payload.budget_id).await?;

    if has_changes(&*payload) {
        update_in(&mut tx, TABLE, UPDATABLE, id, &*payload).await?;
    }
    let advance: CashAdvance = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    Ok(response::ok_with("Cash advance updated successfully.", advance))
}

#[utoipa::path(
    delete,
    path = "/api/cash-advances/{id}",
    params(("id", Path, description = "Cash advance ID")),
    responses(
        (status = 200, description = "Cash advance deleted", body = MessageResponse),
        (status = 422, description = "Cash advance is no longer pending", body = MessageResponse)
    ),
    tag = "Cash Advances",
    security(("bearer_auth" = []))
)]
pub async fn delete_cash_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    editable(&auth, &mut tx, id, "delete").await?;
    sqlx::query("DELETE FROM cash_advances WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(cash_advance_id = id, user_id = auth.user_id, "Cash advance deleted");
    Ok(response::message("Cash advance deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/cash-advances/{id}/approve",
    params(("id", Path, description = "Cash advance ID")),
    responses(
        (status = 200, description = "Cash advance approved", body = CashAdvance),
        (status = 403, description = "Admin only", body = MessageResponse),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Cash Advances",
    security(("bearer_auth" = []))
)]
pub async fn approve_cash_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: CashAdvance = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = CashAdvanceStatus::parse(&current.status)?.transition(CashAdvanceAction::Approve)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("approved_by", SqlValue::from(auth.user_id)), ("approved_at", SqlValue::now())],
    )
    .await?;
    let advance: CashAdvance = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(cash_advance_id = id, user_id = auth.user_id, "Cash advance approved");
    Ok(response::ok_with("Cash advance approved successfully.", advance))
}

#[utoipa::path(
    post,
    path = "/api/cash-advances/{id}/release",
    params(("id", Path, description = "Cash advance ID")),
    responses(
        (status = 200, description = "Cash released and budget charged", body = CashAdvance),
        (status = 422, description = "Illegal transition or insufficient budget", body = MessageResponse)
    ),
    tag = "Cash Advances",
    security(("bearer_auth" = []))
)]
pub async fn release_cash_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: CashAdvance = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = CashAdvanceStatus::parse(&current.status)?.transition(CashAdvanceAction::Release)?;

    if let Some(budget_id) = current.budget_id {
        charge_budget(&mut tx, budget_id, current.amount).await?;
    }

    set_status(&mut tx, TABLE, id, next.as_ref(), &[("released_at", SqlValue::now())]).await?;
    let advance: CashAdvance = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(cash_advance_id = id, amount = advance.amount, budget_id = ?advance.budget_id, "Cash advance released");
    Ok(response::ok_with("Cash advance released successfully.", advance))
}

#[utoipa::path(
    post,
    path = "/api/cash-advances/{id}/reject",
    params(("id", Path, description = "Cash advance ID")),
    request_body = RemarksRequest,
    responses(
        (status = 200, description = "Cash advance rejected", body = CashAdvance),
        (status = 422, description = "Missing remarks or illegal transition", body = MessageResponse)
    ),
    tag = "Cash Advances",
    security(("bearer_auth" = []))
)]
pub async fn reject_cash_advance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RemarksRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: CashAdvance = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = CashAdvanceStatus::parse(&current.status)?.transition(CashAdvanceAction::Reject)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("remarks", SqlValue::from(payload.remarks.as_str()))],
    )
    .await?;
    let advance: CashAdvance = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(cash_advance_id = id, user_id = auth.user_id, "Cash advance rejected");
    Ok(response::ok_with("Cash advance rejected successfully.", advance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn employee_id_is_optional_on_create() {
        let payload: CreateCashAdvance = serde_json::from_value(json!({
            "purpose": "Seminar fees",
            "amount": 2500.0
        }))
        .unwrap();
        assert!(payload.employee_id.is_none());
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let payload: CreateCashAdvance = serde_json::from_value(json!({
            "purpose": "Seminar fees",
            "amount": 0.0
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn status_and_employee_are_not_updatable() {
        for column in ["status", "employee_id", "ca_number", "released_at"] {
            assert!(!UPDATABLE.contains(&column), "{column} must not be updatable");
        }
    }
}
