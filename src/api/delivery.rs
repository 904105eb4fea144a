use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::{
        purchase_order::load_items,
        stock_card::{Movement, post_movement},
    },
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult},
    model::{
        delivery::{Delivery, DeliveryAction, DeliveryDetail, DeliveryItem, DeliveryStatus, check_quantities},
        purchase_order::{PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus, receipt_action},
        stock_card::TransactionType,
        workflow::Workflow,
    },
    models::{OptionalRemarks, RemarksRequest},
    utils::{
        db_utils::{
            Filter, SqlValue, delete_by_id, fetch_page, find_by_id, has_changes, lock_by_id,
            set_status, update_in,
        },
        pagination::{DeliveryPage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "deliveries";
const RESOURCE: &str = "Delivery";
const UPDATABLE: &[&str] = &["delivery_receipt_number", "delivery_date", "remarks"];

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct DeliveryLine {
    pub purchase_order_item_id: u64,
    #[validate(range(min = 1))]
    #[schema(example = 20)]
    pub quantity_delivered: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDelivery {
    pub purchase_order_id: u64,
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "DR-88321")]
    pub delivery_receipt_number: String,
    #[schema(example = "2026-02-10")]
    pub delivery_date: NaiveDate,
    pub remarks: Option<String>,
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    pub items: Vec<DeliveryLine>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateDelivery {
    #[validate(length(min = 1, max = 50))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_receipt_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    /// Replaces every line when present.
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    #[serde(skip_serializing)]
    pub items: Option<Vec<DeliveryLine>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeliveryQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub purchase_order_id: Option<u64>,
    pub status: Option<String>,
}

async fn load_detail(conn: &mut MySqlConnection, id: u64) -> ApiResult<DeliveryDetail> {
    let delivery: Delivery = find_by_id(&mut *conn, TABLE, id, RESOURCE).await?;
    let items = sqlx::query_as::<_, DeliveryItem>(
        "SELECT * FROM delivery_items WHERE delivery_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(DeliveryDetail { delivery, items })
}

fn pairs(lines: &[DeliveryLine]) -> Vec<(u64, i64)> {
    lines
        .iter()
        .map(|l| (l.purchase_order_item_id, l.quantity_delivered))
        .collect()
}

/// Loads the PO and checks it can still receive the given lines.
async fn check_order(conn: &mut MySqlConnection, purchase_order_id: u64, lines: &[(u64, i64)]) -> ApiResult<()> {
    let order = sqlx::query_as::<_, PurchaseOrder>("SELECT * FROM purchase_orders WHERE id = ?")
        .bind(purchase_order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::invalid("purchase_order_id", "The selected purchase order id is invalid."))?;

    if !PurchaseOrderStatus::parse(&order.status)?.accepts_deliveries() {
        return Err(ApiError::invalid(
            "purchase_order_id",
            "Deliveries can only be recorded for purchase orders sent to the supplier.",
        ));
    }

    let order_items = load_items(conn, purchase_order_id).await?;
    check_quantities(lines, &order_items)
}

async fn insert_items(conn: &mut MySqlConnection, delivery_id: u64, lines: &[DeliveryLine]) -> ApiResult<()> {
    for line in lines {
        sqlx::query(
            "INSERT INTO delivery_items (delivery_id, purchase_order_item_id, quantity_delivered) VALUES (?, ?, ?)",
        )
        .bind(delivery_id)
        .bind(line.purchase_order_item_id)
        .bind(line.quantity_delivered)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/deliveries",
    params(DeliveryQuery),
    responses((status = 200, description = "Paginated deliveries", body = DeliveryPage)),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn list_deliveries(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<DeliveryQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("purchase_order_id", query.purchase_order_id)
        .eq("status", query.status.clone());

    let page = fetch_page::<Delivery>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "delivery_date DESC, id DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/deliveries",
    request_body = CreateDelivery,
    responses(
        (status = 201, description = "Delivery recorded", body = DeliveryDetail),
        (status = 422, description = "PO cannot receive or quantities exceed what is open")
    ),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn create_delivery(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDelivery>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    check_order(&mut tx, payload.purchase_order_id, &pairs(&payload.items)).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO deliveries (purchase_order_id, delivery_receipt_number, delivery_date, status, remarks)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.purchase_order_id)
    .bind(&payload.delivery_receipt_number)
    .bind(payload.delivery_date)
    .bind(DeliveryStatus::Pending.as_ref())
    .bind(&payload.remarks)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    insert_items(&mut tx, id, &payload.items).await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(
        delivery_id = id,
        purchase_order_id = payload.purchase_order_id,
        dr_number = %payload.delivery_receipt_number,
        "Delivery recorded"
    );
    Ok(response::created("Delivery created successfully.", detail))
}

#[utoipa::path(
    get,
    path = "/api/deliveries/{id}",
    params(("id", Path, description = "Delivery ID")),
    responses(
        (status = 200, description = "Delivery with items", body = DeliveryDetail),
        (status = 404, description = "Delivery not found", body = MessageResponse)
    ),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn get_delivery(
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
    path = "/api/deliveries/{id}",
    params(("id", Path, description = "Delivery ID")),
    request_body = UpdateDelivery,
    responses(
        (status = 200, description = "Delivery updated", body = DeliveryDetail),
        (status = 404, description = "Delivery not found", body = MessageResponse),
        (status = 422, description = "Delivery is no longer pending", body = MessageResponse)
    ),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn update_delivery(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateDelivery>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Delivery = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    DeliveryStatus::parse(&current.status)?.ensure_one_of(&[DeliveryStatus::Pending], "update")?;

    if payload.items.is_none() || has_changes(&*payload) {
        update_in(&mut tx, TABLE, UPDATABLE, id, &*payload).await?;
    }

    if let Some(items) = &payload.items {
        check_order(&mut tx, current.purchase_order_id, &pairs(items)).await?;
        sqlx::query("DELETE FROM delivery_items WHERE delivery_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_items(&mut tx, id, items).await?;
    }

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    Ok(response::ok_with("Delivery updated successfully.", detail))
}

#[utoipa::path(
    delete,
    path = "/api/deliveries/{id}",
    params(("id", Path, description = "Delivery ID")),
    responses(
        (status = 200, description = "Delivery deleted", body = MessageResponse),
        (status = 404, description = "Delivery not found", body = MessageResponse),
        (status = 422, description = "Delivery is no longer pending", body = MessageResponse)
    ),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn delete_delivery(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let current: Delivery = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    DeliveryStatus::parse(&current.status)?.ensure_one_of(&[DeliveryStatus::Pending], "delete")?;

    delete_by_id(pool.get_ref(), TABLE, id).await?;
    Ok(response::message("Delivery deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/inspect",
    params(("id", Path, description = "Delivery ID")),
    request_body = OptionalRemarks,
    responses(
        (status = 200, description = "Delivery inspected", body = DeliveryDetail),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn inspect_delivery(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: Option<web::Json<OptionalRemarks>>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();
    let remarks = payload.and_then(|p| p.into_inner().remarks);

    let mut tx = pool.begin().await?;
    let current: Delivery = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = DeliveryStatus::parse(&current.status)?.transition(DeliveryAction::Inspect)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[
            ("inspected_by", SqlValue::from(auth.user_id)),
            ("inspected_at", SqlValue::now()),
            ("inspection_remarks", SqlValue::from(remarks)),
        ],
    )
    .await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(delivery_id = id, user_id = auth.user_id, "Delivery inspected");
    Ok(response::ok_with("Delivery inspected successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/accept",
    params(("id", Path, description = "Delivery ID")),
    responses(
        (status = 200, description = "Delivery accepted, PO quantities and stock updated", body = DeliveryDetail),
        (status = 422, description = "Not inspected or quantities exceed what is open", body = MessageResponse)
    ),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn accept_delivery(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let delivery: Delivery = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = DeliveryStatus::parse(&delivery.status)?.transition(DeliveryAction::Accept)?;

    let order: PurchaseOrder =
        lock_by_id(&mut tx, "purchase_orders", delivery.purchase_order_id, "Purchase order").await?;
    let order_status = PurchaseOrderStatus::parse(&order.status)?;
    let order_items = sqlx::query_as::<_, PurchaseOrderItem>(
        "SELECT * FROM purchase_order_items WHERE purchase_order_id = ? ORDER BY id FOR UPDATE",
    )
    .bind(order.id)
    .fetch_all(&mut *tx)
    .await?;

    let lines = sqlx::query_as::<_, DeliveryItem>("SELECT * FROM delivery_items WHERE delivery_id = ? ORDER BY id")
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
    let claimed: Vec<(u64, i64)> = lines
        .iter()
        .map(|l| (l.purchase_order_item_id, l.quantity_delivered))
        .collect();
    // other deliveries may have been accepted since this one was recorded
    check_quantities(&claimed, &order_items)?;

    let today = delivery.delivery_date;
    for line in &lines {
        sqlx::query("UPDATE purchase_order_items SET quantity_delivered = quantity_delivered + ? WHERE id = ?")
            .bind(line.quantity_delivered)
            .bind(line.purchase_order_item_id)
            .execute(&mut *tx)
            .await?;

        let inventory_item_id = order_items
            .iter()
            .find(|i| i.id == line.purchase_order_item_id)
            .and_then(|i| i.inventory_item_id);
        if let Some(inventory_item_id) = inventory_item_id {
            post_movement(
                &mut tx,
                Movement {
                    inventory_item_id,
                    transaction_type: TransactionType::StockIn,
                    quantity: line.quantity_delivered,
                    reference: Some(&delivery.delivery_receipt_number),
                    remarks: Some(&order.po_number),
                    transaction_date: today,
                    created_by: Some(auth.user_id),
                },
            )
            .await?;
        }
    }

    let received = load_items(&mut tx, order.id).await?;
    let order_next = order_status.transition(receipt_action(&received))?;
    set_status(&mut tx, "purchase_orders", order.id, order_next.as_ref(), &[]).await?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("received_by", SqlValue::from(auth.user_id)), ("accepted_at", SqlValue::now())],
    )
    .await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(
        delivery_id = id,
        purchase_order_id = order.id,
        purchase_order_status = order_next.as_ref(),
        lines = lines.len(),
        "Delivery accepted"
    );
    Ok(response::ok_with("Delivery accepted successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/reject",
    params(("id", Path, description = "Delivery ID")),
    request_body = RemarksRequest,
    responses(
        (status = 200, description = "Delivery rejected", body = DeliveryDetail),
        (status = 422, description = "Missing remarks or illegal transition", body = MessageResponse)
    ),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn reject_delivery(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RemarksRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Delivery = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = DeliveryStatus::parse(&current.status)?.transition(DeliveryAction::Reject)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[
            ("inspected_by", SqlValue::from(auth.user_id)),
            ("inspected_at", SqlValue::now()),
            ("inspection_remarks", SqlValue::from(payload.remarks.as_str())),
        ],
    )
    .await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(delivery_id = id, user_id = auth.user_id, "Delivery rejected");
    Ok(response::ok_with("Delivery rejected successfully.", detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_become_claim_pairs_in_order() {
        let lines = vec![
            DeliveryLine { purchase_order_item_id: 4, quantity_delivered: 10 },
            DeliveryLine { purchase_order_item_id: 2, quantity_delivered: 3 },
        ];
        assert_eq!(pairs(&lines), vec![(4, 10), (2, 3)]);
    }

    #[test]
    fn zero_quantity_line_fails_validation() {
        let payload = CreateDelivery {
            purchase_order_id: 1,
            delivery_receipt_number: "DR-1".to_string(),
            delivery_date: NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            remarks: None,
            items: vec![DeliveryLine { purchase_order_item_id: 1, quantity_delivered: 0 }],
        };
        let err: ApiError = payload.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("items.0.quantity_delivered"));
    }
}
