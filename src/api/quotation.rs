use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult},
    model::{
        purchase_request::{PurchaseRequest, PurchaseRequestStatus},
        quotation::{Quotation, QuotationAction, QuotationStatus},
        supplier::Supplier,
        workflow::Workflow,
    },
    models::RemarksRequest,
    utils::{
        amount::round2,
        db_utils::{Filter, SqlValue, delete_by_id, fetch_page, find_by_id, lock_by_id, set_status, update_from},
        pagination::{Pagination, QuotationPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "quotations";
const RESOURCE: &str = "Quotation";
const UPDATABLE: &[&str] = &[
    "supplier_id",
    "quotation_number",
    "quotation_date",
    "total_amount",
    "delivery_days",
    "remarks",
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateQuotation {
    pub purchase_request_id: u64,
    pub supplier_id: u64,
    #[validate(length(max = 50))]
    #[schema(example = "Q-ACME-0098")]
    pub quotation_number: Option<String>,
    #[schema(example = "2026-01-12")]
    pub quotation_date: NaiveDate,
    #[validate(range(exclusive_min = 0.0))]
    #[schema(example = 12100.0)]
    pub total_amount: f64,
    #[validate(range(min = 0))]
    pub delivery_days: Option<i32>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateQuotation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<u64>,
    #[validate(length(max = 50))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotation_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotation_date: Option<NaiveDate>,
    #[validate(range(exclusive_min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[validate(range(min = 0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EvaluateQuotation {
    #[validate(range(min = 0.0, max = 100.0))]
    #[schema(example = 92.5)]
    pub score: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QuotationQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub purchase_request_id: Option<u64>,
    pub supplier_id: Option<u64>,
    pub status: Option<String>,
}

pub(crate) async fn ensure_active_supplier(pool: &MySqlPool, supplier_id: u64) -> ApiResult<()> {
    let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?")
        .bind(supplier_id)
        .fetch_optional(pool)
        .await?;
    match supplier {
        Some(s) if s.is_active => Ok(()),
        Some(_) => Err(ApiError::invalid("supplier_id", "The selected supplier is inactive.")),
        None => Err(ApiError::invalid("supplier_id", "The selected supplier id is invalid.")),
    }
}

pub(crate) async fn ensure_approved_request(pool: &MySqlPool, purchase_request_id: u64) -> ApiResult<()> {
    let pr = sqlx::query_as::<_, PurchaseRequest>("SELECT * FROM purchase_requests WHERE id = ?")
        .bind(purchase_request_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| {
            ApiError::invalid("purchase_request_id", "The selected purchase request id is invalid.")
        })?;
    if PurchaseRequestStatus::parse(&pr.status)? != PurchaseRequestStatus::Approved {
        return Err(ApiError::invalid(
            "purchase_request_id",
            "The selected purchase request is not approved.",
        ));
    }
    Ok(())
}

async fn transition(
    conn: &mut MySqlConnection,
    quotation: &Quotation,
    action: QuotationAction,
    stamps: &[(&str, SqlValue)],
) -> ApiResult<QuotationStatus> {
    let next = QuotationStatus::parse(&quotation.status)?.transition(action)?;
    set_status(conn, TABLE, quotation.id, next.as_ref(), stamps).await?;
    Ok(next)
}

#[utoipa::path(
    get,
    path = "/api/quotations",
    params(QuotationQuery),
    responses((status = 200, description = "Paginated quotations", body = QuotationPage)),
    tag = "Quotations",
    security(("bearer_auth" = []))
)]
pub async fn list_quotations(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<QuotationQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("purchase_request_id", query.purchase_request_id)
        .eq("supplier_id", query.supplier_id)
        .eq("status", query.status.clone());

    let page = fetch_page::<Quotation>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "quotation_date DESC, id DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/quotations",
    request_body = CreateQuotation,
    responses(
        (status = 201, description = "Quotation recorded", body = Quotation),
        (status = 422, description = "PR not approved, inactive supplier or validation error")
    ),
    tag = "Quotations",
    security(("bearer_auth" = []))
)]
pub async fn create_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateQuotation>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    ensure_approved_request(pool.get_ref(), payload.purchase_request_id).await?;
    ensure_active_supplier(pool.get_ref(), payload.supplier_id).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO quotations
            (purchase_request_id, supplier_id, quotation_number, quotation_date, total_amount, delivery_days, remarks, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.purchase_request_id)
    .bind(payload.supplier_id)
    .bind(&payload.quotation_number)
    .bind(payload.quotation_date)
    .bind(round2(payload.total_amount))
    .bind(payload.delivery_days)
    .bind(&payload.remarks)
    .bind(QuotationStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await?;

    let quotation: Quotation = find_by_id(pool.get_ref(), TABLE, result.last_insert_id(), RESOURCE).await?;
    info!(
        quotation_id = quotation.id,
        purchase_request_id = quotation.purchase_request_id,
        supplier_id = quotation.supplier_id,
        "Quotation recorded"
    );

    Ok(response::created("Quotation created successfully.", quotation))
}

#[utoipa::path(
    get,
    path = "/api/quotations/{id}",
    params(("id", Path, description = "Quotation ID")),
    responses(
        (status = 200, description = "Quotation", body = Quotation),
        (status = 404, description = "Quotation not found", body = MessageResponse)
    ),
    tag = "Quotations",
    security(("bearer_auth" = []))
)]
pub async fn get_quotation(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let quotation: Quotation = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(quotation))
}

#[utoipa::path(
    put,
    path = "/api/quotations/{id}",
    params(("id", Path, description = "Quotation ID")),
    request_body = UpdateQuotation,
    responses(
        (status = 200, description = "Quotation updated", body = Quotation),
        (status = 404, description = "Quotation not found", body = MessageResponse),
        (status = 422, description = "Quotation is no longer pending", body = MessageResponse)
    ),
    tag = "Quotations",
    security(("bearer_auth" = []))
)]
pub async fn update_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateQuotation>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let current: Quotation = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    QuotationStatus::parse(&current.status)?.ensure_one_of(&[QuotationStatus::Pending], "update")?;
    if let Some(supplier_id) = payload.supplier_id {
        ensure_active_supplier(pool.get_ref(), supplier_id).await?;
    }

    update_from(pool.get_ref(), TABLE, UPDATABLE, id, &payload.into_inner()).await?;

    let quotation: Quotation = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    Ok(response::ok_with("Quotation updated successfully.", quotation))
}

#[utoipa::path(
    delete,
    path = "/api/quotations/{id}",
    params(("id", Path, description = "Quotation ID")),
    responses(
        (status = 200, description = "Quotation deleted", body = MessageResponse),
        (status = 404, description = "Quotation not found", body = MessageResponse),
        (status = 422, description = "Quotation is no longer pending", body = MessageResponse)
    ),
    tag = "Quotations",
    security(("bearer_auth" = []))
)]
pub async fn delete_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let current: Quotation = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    QuotationStatus::parse(&current.status)?.ensure_one_of(&[QuotationStatus::Pending], "delete")?;

    delete_by_id(pool.get_ref(), TABLE, id).await?;
    Ok(response::message("Quotation deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/quotations/{id}/evaluate",
    params(("id", Path, description = "Quotation ID")),
    request_body = EvaluateQuotation,
    responses(
        (status = 200, description = "Quotation evaluated", body = Quotation),
        (status = 422, description = "Illegal transition or score out of range", body = MessageResponse)
    ),
    tag = "Quotations",
    security(("bearer_auth" = []))
)]
pub async fn evaluate_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<EvaluateQuotation>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let quotation: Quotation = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    transition(
        &mut tx,
        &quotation,
        QuotationAction::Evaluate,
        &[
            ("evaluation_score", SqlValue::from(round2(payload.score))),
            ("evaluation_remarks", SqlValue::from(payload.remarks.clone())),
        ],
    )
    .await?;
    let quotation: Quotation = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    Ok(response::ok_with("Quotation evaluated successfully.", quotation))
}

#[utoipa::path(
    post,
    path = "/api/quotations/{id}/select",
    params(("id", Path, description = "Quotation ID")),
    responses(
        (status = 200, description = "Quotation selected; competing evaluated quotations marked not selected", body = Quotation),
        (status = 422, description = "Not evaluated or another quotation already selected", body = MessageResponse)
    ),
    tag = "Quotations",
    security(("bearer_auth" = []))
)]
pub async fn select_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let target: Quotation = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;

    let mut tx = pool.begin().await?;
    // lock every quotation of the PR so two selections cannot interleave
    let siblings = sqlx::query_as::<_, Quotation>(
        "SELECT * FROM quotations WHERE purchase_request_id = ? ORDER BY id FOR UPDATE",
    )
    .bind(target.purchase_request_id)
    .fetch_all(&mut *tx)
    .await?;

    let target = siblings
        .iter()
        .find(|q| q.id == id)
        .ok_or_else(|| ApiError::not_found(RESOURCE))?;

    if siblings
        .iter()
        .any(|q| q.id != id && q.status == QuotationStatus::Selected.as_ref())
    {
        return Err(ApiError::unprocessable(
            "Another quotation has already been selected for this purchase request.",
        ));
    }

    transition(&mut tx, target, QuotationAction::Select, &[]).await?;

    let mut superseded = 0;
    for other in siblings.iter().filter(|q| q.id != id) {
        if QuotationStatus::parse(&other.status)? == QuotationStatus::Evaluated {
            transition(&mut tx, other, QuotationAction::Supersede, &[]).await?;
            superseded += 1;
        }
    }

    let quotation: Quotation = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(
        quotation_id = id,
        purchase_request_id = quotation.purchase_request_id,
        superseded,
        "Quotation selected"
    );
    Ok(response::ok_with("Quotation selected successfully.", quotation))
}

#[utoipa::path(
    post,
    path = "/api/quotations/{id}/reject",
    params(("id", Path, description = "Quotation ID")),
    request_body = RemarksRequest,
    responses(
        (status = 200, description = "Quotation rejected", body = Quotation),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Quotations",
    security(("bearer_auth" = []))
)]
pub async fn reject_quotation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: Option<web::Json<RemarksRequest>>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();
    let remarks = payload.map(|p| p.into_inner().remarks);

    let mut tx = pool.begin().await?;
    let quotation: Quotation = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let stamps = match &remarks {
        Some(r) => vec![("evaluation_remarks", SqlValue::from(r.as_str()))],
        None => Vec::new(),
    };
    transition(&mut tx, &quotation, QuotationAction::Reject, &stamps).await?;
    let quotation: Quotation = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    Ok(response::ok_with("Quotation rejected successfully.", quotation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_must_be_a_percentage() {
        assert!(EvaluateQuotation { score: 100.0, remarks: None }.validate().is_ok());
        assert!(EvaluateQuotation { score: 0.0, remarks: None }.validate().is_ok());
        assert!(EvaluateQuotation { score: 100.5, remarks: None }.validate().is_err());
        assert!(EvaluateQuotation { score: -1.0, remarks: None }.validate().is_err());
    }

    #[test]
    fn zero_total_is_rejected() {
        let payload = CreateQuotation {
            purchase_request_id: 1,
            supplier_id: 1,
            quotation_number: None,
            quotation_date: NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
            total_amount: 0.0,
            delivery_days: Some(7),
            remarks: None,
        };
        assert!(payload.validate().is_err());
    }
}
