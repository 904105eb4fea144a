use std::str::FromStr;

use actix_web::{HttpResponse, web};
use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::budget::{charge_budget, check_funds, ensure_budget_exists},
    auth::auth::{AuthUser, FINANCE_STAFF},
    error::{ApiError, ApiResult},
    model::{
        disbursement::{Disbursement, DisbursementAction, DisbursementStatus, PaymentMode},
        workflow::Workflow,
    },
    models::RemarksRequest,
    utils::{
        amount::round2,
        db_utils::{Filter, SqlValue, fetch_page, find_by_id, has_changes, lock_by_id, set_status, update_in},
        doc_number::{DocumentSeries, next_number},
        pagination::{DisbursementPage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "disbursements";
const RESOURCE: &str = "Disbursement voucher";
const UPDATABLE: &[&str] = &[
    "payee",
    "particulars",
    "amount",
    "budget_id",
    "purchase_order_id",
    "payment_mode",
    "check_number",
    "remarks",
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDisbursement {
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Acme Office Supply")]
    pub payee: String,
    #[validate(length(min = 1))]
    #[schema(example = "Payment for PO-2026-0003")]
    pub particulars: String,
    #[validate(range(exclusive_min = 0.0))]
    #[schema(example = 42150.0)]
    pub amount: f64,
    pub budget_id: Option<u64>,
    pub purchase_order_id: Option<u64>,
    pub payment_mode: PaymentMode,
    #[validate(length(max = 50))]
    pub check_number: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateDisbursement {
    #[validate(length(min = 1, max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    #[validate(length(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particulars: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_order_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_mode: Option<PaymentMode>,
    #[validate(length(max = 50))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DisbursementQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<String>,
    pub payment_mode: Option<String>,
    pub budget_id: Option<u64>,
    /// Matches DV number, payee or particulars
    pub search: Option<String>,
}

/// Check payments need the check number.
fn check_payment(mode: PaymentMode, check_number: Option<&str>) -> ApiResult<()> {
    let missing = check_number.map(str::trim).map_or(true, str::is_empty);
    if mode == PaymentMode::Check && missing {
        return Err(ApiError::invalid(
            "check_number",
            "The check number field is required when payment mode is check.",
        ));
    }
    Ok(())
}

async fn ensure_order_exists(conn: &mut MySqlConnection, purchase_order_id: Option<u64>) -> ApiResult<()> {
    if let Some(purchase_order_id) = purchase_order_id {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchase_orders WHERE id = ?")
            .bind(purchase_order_id)
            .fetch_one(&mut *conn)
            .await?;
        if found == 0 {
            return Err(ApiError::invalid(
                "purchase_order_id",
                "The selected purchase order id is invalid.",
            ));
        }
    }
    Ok(())
}

fn payment_mode_of(voucher: &Disbursement) -> ApiResult<PaymentMode> {
    PaymentMode::from_str(&voucher.payment_mode)
        .map_err(|_| ApiError::Internal(anyhow!("unknown payment mode {:?}", voucher.payment_mode)))
}

async fn pending(conn: &mut MySqlConnection, id: u64, verb: &str) -> ApiResult<Disbursement> {
    let current: Disbursement = lock_by_id(conn, TABLE, id, RESOURCE).await?;
    DisbursementStatus::parse(&current.status)?.ensure_one_of(&[DisbursementStatus::Pending], verb)?;
    Ok(current)
}

#[utoipa::path(
    get,
    path = "/api/disbursements",
    params(DisbursementQuery),
    responses((status = 200, description = "Paginated disbursement vouchers", body = DisbursementPage)),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn list_disbursements(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<DisbursementQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("status", query.status.clone())
        .eq("payment_mode", query.payment_mode.clone())
        .eq("budget_id", query.budget_id)
        .like_any(&["dv_number", "payee", "particulars"], query.search.as_deref());

    let page = fetch_page::<Disbursement>(
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
    path = "/api/disbursements",
    request_body = CreateDisbursement,
    responses(
        (status = 201, description = "Disbursement voucher created", body = Disbursement),
        (status = 422, description = "Validation error")
    ),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn create_disbursement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDisbursement>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    payload.validate()?;
    check_payment(payload.payment_mode, payload.check_number.as_deref())?;

    let mut tx = pool.begin().await?;
    ensure_budget_exists(&mut tx, payload.budget_id).await?;
    ensure_order_exists(&mut tx, payload.purchase_order_id).await?;

    let dv_number = next_number(&mut tx, DocumentSeries::Disbursement, Utc::now().date_naive()).await?;
    let result = sqlx::query(
        r#"
        INSERT INTO disbursements
            (dv_number, payee, particulars, amount, budget_id, purchase_order_id, payment_mode, check_number, status, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&dv_number)
    .bind(&payload.payee)
    .bind(&payload.particulars)
    .bind(round2(payload.amount))
    .bind(payload.budget_id)
    .bind(payload.purchase_order_id)
    .bind(payload.payment_mode.as_ref())
    .bind(&payload.check_number)
    .bind(DisbursementStatus::Pending.as_ref())
    .bind(&payload.remarks)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    let voucher: Disbursement = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(disbursement_id = id, dv_number = %dv_number, amount = voucher.amount, "Disbursement voucher created");
    Ok(response::created("Disbursement voucher created successfully.", voucher))
}

#[utoipa::path(
    get,
    path = "/api/disbursements/{id}",
    params(("id", Path, description = "Disbursement voucher ID")),
    responses(
        (status = 200, description = "Disbursement voucher", body = Disbursement),
        (status = 404, description = "Disbursement voucher not found", body = MessageResponse)
    ),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn get_disbursement(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let voucher: Disbursement = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(voucher))
}

#[utoipa::path(
    put,
    path = "/api/disbursements/{id}",
    params(("id", Path, description = "Disbursement voucher ID")),
    request_body = UpdateDisbursement,
    responses(
        (status = 200, description = "Disbursement voucher updated", body = Disbursement),
        (status = 422, description = "Voucher is no longer pending", body = MessageResponse)
    ),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn update_disbursement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateDisbursement>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current = pending(&mut tx, id, "update").await?;

    let mode = match payload.payment_mode {
        Some(mode) => mode,
        None => payment_mode_of(&current)?,
    };
    let check_number = payload.check_number.as_deref().or(current.check_number.as_deref());
    check_payment(mode, check_number)?;
    ensure_budget_exists(&mut tx, payload.budget_id).await?;
    ensure_order_exists(&mut tx, payload.purchase_order_id).await?;

    if has_changes(&*payload) {
        update_in(&mut tx, TABLE, UPDATABLE, id, &*payload).await?;
    }
    let voucher: Disbursement = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    Ok(response::ok_with("Disbursement voucher updated successfully.", voucher))
}

#[utoipa::path(
    delete,
    path = "/api/disbursements/{id}",
    params(("id", Path, description = "Disbursement voucher ID")),
    responses(
        (status = 200, description = "Disbursement voucher deleted", body = MessageResponse),
        (status = 422, description = "Voucher is no longer pending", body = MessageResponse)
    ),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn delete_disbursement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    pending(&mut tx, id, "delete").await?;
    sqlx::query("DELETE FROM disbursements WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(disbursement_id = id, user_id = auth.user_id, "Disbursement voucher deleted");
    Ok(response::message("Disbursement voucher deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/disbursements/{id}/certify",
    params(("id", Path, description = "Disbursement voucher ID")),
    responses(
        (status = 200, description = "Funds available, voucher certified", body = Disbursement),
        (status = 422, description = "Illegal transition or insufficient budget", body = MessageResponse)
    ),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn certify_disbursement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Disbursement = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = DisbursementStatus::parse(&current.status)?.transition(DisbursementAction::Certify)?;

    if let Some(budget_id) = current.budget_id {
        check_funds(&mut tx, budget_id, current.amount).await?;
    }

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("certified_by", SqlValue::from(auth.user_id)), ("certified_at", SqlValue::now())],
    )
    .await?;
    let voucher: Disbursement = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(disbursement_id = id, user_id = auth.user_id, "Disbursement voucher certified");
    Ok(response::ok_with("Disbursement voucher certified successfully.", voucher))
}

#[utoipa::path(
    post,
    path = "/api/disbursements/{id}/approve",
    params(("id", Path, description = "Disbursement voucher ID")),
    responses(
        (status = 200, description = "Voucher approved", body = Disbursement),
        (status = 403, description = "Admin only", body = MessageResponse),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn approve_disbursement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Disbursement = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = DisbursementStatus::parse(&current.status)?.transition(DisbursementAction::Approve)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("approved_by", SqlValue::from(auth.user_id)), ("approved_at", SqlValue::now())],
    )
    .await?;
    let voucher: Disbursement = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(disbursement_id = id, user_id = auth.user_id, "Disbursement voucher approved");
    Ok(response::ok_with("Disbursement voucher approved successfully.", voucher))
}

#[utoipa::path(
    post,
    path = "/api/disbursements/{id}/mark-paid",
    params(("id", Path, description = "Disbursement voucher ID")),
    responses(
        (status = 200, description = "Voucher paid and budget charged", body = Disbursement),
        (status = 422, description = "Illegal transition or insufficient budget", body = MessageResponse)
    ),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn mark_disbursement_paid(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Disbursement = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = DisbursementStatus::parse(&current.status)?.transition(DisbursementAction::MarkPaid)?;

    if let Some(budget_id) = current.budget_id {
        charge_budget(&mut tx, budget_id, current.amount).await?;
    }

    set_status(&mut tx, TABLE, id, next.as_ref(), &[("paid_at", SqlValue::now())]).await?;
    let voucher: Disbursement = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(
        disbursement_id = id,
        amount = voucher.amount,
        budget_id = ?voucher.budget_id,
        "Disbursement voucher paid"
    );
    Ok(response::ok_with("Disbursement voucher paid successfully.", voucher))
}

#[utoipa::path(
    post,
    path = "/api/disbursements/{id}/reject",
    params(("id", Path, description = "Disbursement voucher ID")),
    request_body = RemarksRequest,
    responses(
        (status = 200, description = "Voucher rejected", body = Disbursement),
        (status = 422, description = "Missing remarks or illegal transition", body = MessageResponse)
    ),
    tag = "Disbursements",
    security(("bearer_auth" = []))
)]
pub async fn reject_disbursement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RemarksRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Disbursement = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = DisbursementStatus::parse(&current.status)?.transition(DisbursementAction::Reject)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("remarks", SqlValue::from(payload.remarks.as_str()))],
    )
    .await?;
    let voucher: Disbursement = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(disbursement_id = id, user_id = auth.user_id, "Disbursement voucher rejected");
    Ok(response::ok_with("Disbursement voucher rejected successfully.", voucher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_payment_needs_a_check_number() {
        assert!(check_payment(PaymentMode::Check, Some("000123")).is_ok());
        assert!(check_payment(PaymentMode::Check, Some("  ")).is_err());

        let err = check_payment(PaymentMode::Check, None).unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("check_number"));
    }

    #[test]
    fn other_modes_do_not_need_a_check_number() {
        assert!(check_payment(PaymentMode::Cash, None).is_ok());
        assert!(check_payment(PaymentMode::BankTransfer, None).is_ok());
    }
}
