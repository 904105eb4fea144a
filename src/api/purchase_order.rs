use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::quotation::{ensure_active_supplier, ensure_approved_request},
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult},
    model::{
        purchase_order::{
            PurchaseOrder, PurchaseOrderAction, PurchaseOrderDetail, PurchaseOrderItem,
            PurchaseOrderStatus,
        },
        quotation::{Quotation, QuotationStatus},
        workflow::Workflow,
    },
    models::LineItemRequest,
    utils::{
        amount::{line_total, round2},
        db_utils::{
            Filter, SqlValue, delete_by_id, fetch_page, find_by_id, has_changes, lock_by_id,
            set_status, update_in,
        },
        doc_number::{DocumentSeries, next_number},
        pagination::{Pagination, PurchaseOrderPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "purchase_orders";
const RESOURCE: &str = "Purchase order";
const UPDATABLE: &[&str] = &["delivery_date", "delivery_address", "payment_terms", "remarks"];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseOrder {
    pub purchase_request_id: u64,
    pub supplier_id: u64,
    pub quotation_id: Option<u64>,
    #[schema(example = "2026-02-15")]
    pub delivery_date: Option<NaiveDate>,
    pub delivery_address: Option<String>,
    #[validate(length(max = 255))]
    #[schema(example = "30 days upon delivery")]
    pub payment_terms: Option<String>,
    pub remarks: Option<String>,
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdatePurchaseOrder {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[validate(length(max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    /// Replaces every line when present.
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    #[serde(skip_serializing)]
    pub items: Option<Vec<LineItemRequest>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PurchaseOrderQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<String>,
    pub supplier_id: Option<u64>,
    pub purchase_request_id: Option<u64>,
}

pub(crate) async fn load_items(conn: &mut MySqlConnection, purchase_order_id: u64) -> ApiResult<Vec<PurchaseOrderItem>> {
    let items = sqlx::query_as::<_, PurchaseOrderItem>(
        "SELECT * FROM purchase_order_items WHERE purchase_order_id = ? ORDER BY id",
    )
    .bind(purchase_order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

async fn load_detail(conn: &mut MySqlConnection, id: u64) -> ApiResult<PurchaseOrderDetail> {
    let purchase_order: PurchaseOrder = find_by_id(&mut *conn, TABLE, id, RESOURCE).await?;
    let items = load_items(conn, id).await?;
    Ok(PurchaseOrderDetail { purchase_order, items })
}

async fn insert_items(
    conn: &mut MySqlConnection,
    purchase_order_id: u64,
    items: &[LineItemRequest],
) -> ApiResult<f64> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_items
                (purchase_order_id, inventory_item_id, description, unit, quantity, unit_cost, amount, quantity_delivered)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(purchase_order_id)
        .bind(item.inventory_item_id)
        .bind(&item.description)
        .bind(&item.unit)
        .bind(item.quantity)
        .bind(round2(item.unit_cost))
        .bind(round2(item.quantity as f64 * item.unit_cost))
        .execute(&mut *conn)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::invalid(
                "items.inventory_item_id",
                "The selected inventory item id is invalid.",
            ),
            other => other,
        })?;
    }
    Ok(line_total(items.iter().map(|i| (i.quantity, i.unit_cost))))
}

/// The quotation must be the selected one for the PR and come from the same supplier.
fn check_quotation(quotation: &Quotation, purchase_request_id: u64, supplier_id: u64) -> ApiResult<()> {
    let selected = QuotationStatus::parse(&quotation.status)? == QuotationStatus::Selected;
    if !selected || quotation.purchase_request_id != purchase_request_id {
        return Err(ApiError::invalid(
            "quotation_id",
            "The quotation must be the selected quotation of the purchase request.",
        ));
    }
    if quotation.supplier_id != supplier_id {
        return Err(ApiError::invalid(
            "supplier_id",
            "The supplier must match the supplier of the selected quotation.",
        ));
    }
    Ok(())
}

async fn apply(
    pool: &MySqlPool,
    id: u64,
    action: PurchaseOrderAction,
    stamps: &[(&str, SqlValue)],
) -> ApiResult<PurchaseOrderDetail> {
    let mut tx = pool.begin().await?;
    let current: PurchaseOrder = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = PurchaseOrderStatus::parse(&current.status)?.transition(action)?;

    set_status(&mut tx, TABLE, id, next.as_ref(), stamps).await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(purchase_order_id = id, status = next.as_ref(), "Purchase order status changed");
    Ok(detail)
}

#[utoipa::path(
    get,
    path = "/api/purchase-orders",
    params(PurchaseOrderQuery),
    responses((status = 200, description = "Paginated purchase orders", body = PurchaseOrderPage)),
    tag = "Purchase Orders",
    security(("bearer_auth" = []))
)]
pub async fn list_purchase_orders(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PurchaseOrderQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("status", query.status.clone())
        .eq("supplier_id", query.supplier_id)
        .eq("purchase_request_id", query.purchase_request_id);

    let page = fetch_page::<PurchaseOrder>(
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
    path = "/api/purchase-orders",
    request_body = CreatePurchaseOrder,
    responses(
        (status = 201, description = "Purchase order created with its items", body = PurchaseOrderDetail),
        (status = 422, description = "PR not approved, quotation mismatch or validation error")
    ),
    tag = "Purchase Orders",
    security(("bearer_auth" = []))
)]
pub async fn create_purchase_order(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePurchaseOrder>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    ensure_approved_request(pool.get_ref(), payload.purchase_request_id).await?;
    ensure_active_supplier(pool.get_ref(), payload.supplier_id).await?;

    if let Some(quotation_id) = payload.quotation_id {
        let quotation = sqlx::query_as::<_, Quotation>("SELECT * FROM quotations WHERE id = ?")
            .bind(quotation_id)
            .fetch_optional(pool.get_ref())
            .await?
            .ok_or_else(|| ApiError::invalid("quotation_id", "The selected quotation id is invalid."))?;
        check_quotation(&quotation, payload.purchase_request_id, payload.supplier_id)?;
    }

    let mut tx = pool.begin().await?;
    let po_number = next_number(&mut tx, DocumentSeries::PurchaseOrder, Utc::now().date_naive()).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO purchase_orders
            (po_number, purchase_request_id, supplier_id, quotation_id, delivery_date,
             delivery_address, payment_terms, status, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&po_number)
    .bind(payload.purchase_request_id)
    .bind(payload.supplier_id)
    .bind(payload.quotation_id)
    .bind(payload.delivery_date)
    .bind(&payload.delivery_address)
    .bind(&payload.payment_terms)
    .bind(PurchaseOrderStatus::Draft.as_ref())
    .bind(&payload.remarks)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    let total = insert_items(&mut tx, id, &payload.items).await?;
    sqlx::query("UPDATE purchase_orders SET total_amount = ? WHERE id = ?")
        .bind(total)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(purchase_order_id = id, po_number = %po_number, total, "Purchase order created");
    Ok(response::created("Purchase order created successfully.", detail))
}

#[utoipa::path(
    get,
    path = "/api/purchase-orders/{id}",
    params(("id", Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order with items", body = PurchaseOrderDetail),
        (status = 404, description = "Purchase order not found", body = MessageResponse)
    ),
    tag = "Purchase Orders",
    security(("bearer_auth" = []))
)]
pub async fn get_purchase_order(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let mut conn = pool.acquire().await?;
    let detail = load_detail(&mut conn, path.into_inner()).await?;
    Ok(response::data(detail))
}

#[utoipa::path(
    put,
    path = "/api/purchase-orders/{id}",
    params(("id", Path, description = "Purchase order ID")),
    request_body = UpdatePurchaseOrder,
    responses(
        (status = 200, description = "Purchase order updated", body = PurchaseOrderDetail),
        (status = 404, description = "Purchase order not found", body = MessageResponse),
        (status = 422, description = "Not a draft", body = MessageResponse)
    ),
    tag = "Purchase Orders",
    security(("bearer_auth" = []))
)]
pub async fn update_purchase_order(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdatePurchaseOrder>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: PurchaseOrder = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    PurchaseOrderStatus::parse(&current.status)?
        .ensure_one_of(&[PurchaseOrderStatus::Draft], "update")?;

    if payload.items.is_none() || has_changes(&*payload) {
        update_in(&mut tx, TABLE, UPDATABLE, id, &*payload).await?;
    }

    if let Some(items) = &payload.items {
        sqlx::query("DELETE FROM purchase_order_items WHERE purchase_order_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let total = insert_items(&mut tx, id, items).await?;
        sqlx::query("UPDATE purchase_orders SET total_amount = ? WHERE id = ?")
            .bind(total)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    Ok(response::ok_with("Purchase order updated successfully.", detail))
}

#[utoipa::path(
    delete,
    path = "/api/purchase-orders/{id}",
    params(("id", Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order deleted", body = MessageResponse),
        (status = 404, description = "Purchase order not found", body = MessageResponse),
        (status = 422, description = "Not a draft", body = MessageResponse)
    ),
    tag = "Purchase Orders",
    security(("bearer_auth" = []))
)]
pub async fn delete_purchase_order(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let current: PurchaseOrder = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    PurchaseOrderStatus::parse(&current.status)?
        .ensure_one_of(&[PurchaseOrderStatus::Draft], "delete")?;

    delete_by_id(pool.get_ref(), TABLE, id).await?;
    info!(purchase_order_id = id, user_id = auth.user_id, "Purchase order deleted");
    Ok(response::message("Purchase order deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/purchase-orders/{id}/approve",
    params(("id", Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order approved", body = PurchaseOrderDetail),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Purchase Orders",
    security(("bearer_auth" = []))
)]
pub async fn approve_purchase_order(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let detail = apply(
        pool.get_ref(),
        path.into_inner(),
        PurchaseOrderAction::Approve,
        &[("approved_by", SqlValue::from(auth.user_id)), ("approved_at", SqlValue::now())],
    )
    .await?;
    Ok(response::ok_with("Purchase order approved successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/purchase-orders/{id}/send-to-supplier",
    params(("id", Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order sent to the supplier", body = PurchaseOrderDetail),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Purchase Orders",
    security(("bearer_auth" = []))
)]
pub async fn send_purchase_order(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let detail = apply(pool.get_ref(), path.into_inner(), PurchaseOrderAction::SendToSupplier, &[]).await?;
    Ok(response::ok_with("Purchase order sent to supplier successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/purchase-orders/{id}/cancel",
    params(("id", Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order cancelled", body = PurchaseOrderDetail),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Purchase Orders",
    security(("bearer_auth" = []))
)]
pub async fn cancel_purchase_order(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let detail = apply(pool.get_ref(), path.into_inner(), PurchaseOrderAction::Cancel, &[]).await?;
    Ok(response::ok_with("Purchase order cancelled successfully.", detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quotation(purchase_request_id: u64, supplier_id: u64, status: QuotationStatus) -> Quotation {
        Quotation {
            id: 9,
            purchase_request_id,
            supplier_id,
            quotation_number: None,
            quotation_date: NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
            total_amount: 1000.0,
            delivery_days: None,
            remarks: None,
            evaluation_score: Some(90.0),
            evaluation_remarks: None,
            status: status.as_ref().to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn selected_quotation_of_same_pr_and_supplier_passes() {
        assert!(check_quotation(&quotation(1, 2, QuotationStatus::Selected), 1, 2).is_ok());
    }

    #[test]
    fn unselected_or_foreign_quotation_is_rejected() {
        assert!(check_quotation(&quotation(1, 2, QuotationStatus::Evaluated), 1, 2).is_err());
        assert!(check_quotation(&quotation(5, 2, QuotationStatus::Selected), 1, 2).is_err());
    }

    #[test]
    fn supplier_mismatch_is_keyed_on_supplier() {
        let err = check_quotation(&quotation(1, 3, QuotationStatus::Selected), 1, 2).unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("supplier_id"));
    }
}
