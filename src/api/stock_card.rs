use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult},
    model::{
        inventory_item::InventoryItem,
        stock_card::{StockBalance, StockCard, TransactionType, apply_movement},
    },
    utils::{
        db_utils::{Filter, SqlValue, fetch_page, find_by_id, lock_by_id},
        pagination::{Pagination, StockCardPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "stock_cards";
const RESOURCE: &str = "Stock card";

/// A stock change about to be written to the ledger.
#[derive(Debug, Clone)]
pub struct Movement<'a> {
    pub inventory_item_id: u64,
    pub transaction_type: TransactionType,
    /// Positive amount, or the signed variance for count adjustments.
    pub quantity: i64,
    pub reference: Option<&'a str>,
    pub remarks: Option<&'a str>,
    pub transaction_date: NaiveDate,
    pub created_by: Option<u64>,
}

/// Locks the item, moves `quantity_on_hand` and appends the ledger line.
/// Every stock change goes through here, inside the caller's transaction.
pub async fn post_movement(conn: &mut MySqlConnection, movement: Movement<'_>) -> ApiResult<StockCard> {
    let item: InventoryItem =
        lock_by_id(&mut *conn, "inventory_items", movement.inventory_item_id, "Inventory item").await?;

    let change = movement.transaction_type.signed(movement.quantity);
    let balance_after = apply_movement(item.quantity_on_hand, change)?;

    sqlx::query("UPDATE inventory_items SET quantity_on_hand = ? WHERE id = ?")
        .bind(balance_after)
        .bind(item.id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO stock_cards
            (inventory_item_id, transaction_type, quantity, balance_after, reference, remarks, transaction_date, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(item.id)
    .bind(movement.transaction_type.as_ref())
    .bind(change)
    .bind(balance_after)
    .bind(movement.reference)
    .bind(movement.remarks)
    .bind(movement.transaction_date)
    .bind(movement.created_by)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        inventory_item_id = item.id,
        transaction_type = movement.transaction_type.as_ref(),
        change,
        balance_after,
        "Stock movement posted"
    );

    find_by_id(&mut *conn, TABLE, result.last_insert_id(), RESOURCE).await
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StockMovementRequest {
    pub inventory_item_id: u64,
    #[validate(range(min = 1))]
    #[schema(example = 25)]
    pub quantity: i64,
    #[validate(length(max = 100))]
    #[schema(example = "RIS-2026-014")]
    pub reference: Option<String>,
    pub remarks: Option<String>,
    /// Defaults to today.
    pub transaction_date: Option<NaiveDate>,
    /// Donations only; recorded in the remarks.
    #[validate(length(max = 255))]
    pub donor: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StockCardQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub inventory_item_id: Option<u64>,
    pub transaction_type: Option<String>,
    /// Transaction date lower bound, inclusive
    pub from: Option<NaiveDate>,
    /// Transaction date upper bound, inclusive
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LedgerQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

fn donation_remarks(donor: Option<&str>, remarks: Option<&str>) -> Option<String> {
    match (donor.map(str::trim).filter(|d| !d.is_empty()), remarks) {
        (Some(d), Some(r)) => Some(format!("Donor: {}. {}", d, r)),
        (Some(d), None) => Some(format!("Donor: {}", d)),
        (None, r) => r.map(str::to_string),
    }
}

async fn record(
    auth: &AuthUser,
    pool: &MySqlPool,
    payload: &StockMovementRequest,
    transaction_type: TransactionType,
) -> ApiResult<StockCard> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;

    let remarks = match transaction_type {
        TransactionType::Donation => donation_remarks(payload.donor.as_deref(), payload.remarks.as_deref()),
        _ => payload.remarks.clone(),
    };

    let mut tx = pool.begin().await?;
    let card = post_movement(
        &mut tx,
        Movement {
            inventory_item_id: payload.inventory_item_id,
            transaction_type,
            quantity: payload.quantity,
            reference: payload.reference.as_deref(),
            remarks: remarks.as_deref(),
            transaction_date: payload.transaction_date.unwrap_or_else(|| Utc::now().date_naive()),
            created_by: Some(auth.user_id),
        },
    )
    .await
    .map_err(|e| match e {
        ApiError::NotFound(_) => {
            ApiError::invalid("inventory_item_id", "The selected inventory item id is invalid.")
        }
        other => other,
    })?;
    tx.commit().await?;

    info!(
        stock_card_id = card.id,
        inventory_item_id = card.inventory_item_id,
        transaction_type = transaction_type.as_ref(),
        balance_after = card.balance_after,
        user_id = auth.user_id,
        "Stock recorded"
    );
    Ok(card)
}

#[utoipa::path(
    get,
    path = "/api/stock-cards",
    params(StockCardQuery),
    responses((status = 200, description = "Paginated ledger entries", body = StockCardPage)),
    tag = "Stock Cards",
    security(("bearer_auth" = []))
)]
pub async fn list_stock_cards(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<StockCardQuery>,
) -> ApiResult<HttpResponse> {
    let mut filter = Filter::new()
        .eq("inventory_item_id", query.inventory_item_id)
        .eq("transaction_type", query.transaction_type.clone());
    if let Some(from) = query.from {
        filter = filter.raw("transaction_date >= ?", vec![SqlValue::from(from)]);
    }
    if let Some(to) = query.to {
        filter = filter.raw("transaction_date <= ?", vec![SqlValue::from(to)]);
    }

    let page = fetch_page::<StockCard>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "transaction_date DESC, id DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/stock-cards/{id}",
    params(("id", Path, description = "Stock card ID")),
    responses(
        (status = 200, description = "Ledger entry", body = StockCard),
        (status = 404, description = "Stock card not found", body = MessageResponse)
    ),
    tag = "Stock Cards",
    security(("bearer_auth" = []))
)]
pub async fn get_stock_card(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let card: StockCard = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(card))
}

#[utoipa::path(
    get,
    path = "/api/stock-cards/item/{item_id}",
    params(("item_id", Path, description = "Inventory item ID"), LedgerQuery),
    responses(
        (status = 200, description = "Ledger of the item in posting order", body = StockCardPage),
        (status = 404, description = "Inventory item not found", body = MessageResponse)
    ),
    tag = "Stock Cards",
    security(("bearer_auth" = []))
)]
pub async fn item_ledger(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<LedgerQuery>,
) -> ApiResult<HttpResponse> {
    let item_id = path.into_inner();
    find_by_id::<InventoryItem, _>(pool.get_ref(), "inventory_items", item_id, "Inventory item").await?;

    let filter = Filter::new().eq("inventory_item_id", Some(item_id));
    let page = fetch_page::<StockCard>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "id ASC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/stock-cards/item/{item_id}/balance",
    params(("item_id", Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Current balance with movement totals", body = StockBalance),
        (status = 404, description = "Inventory item not found", body = MessageResponse)
    ),
    tag = "Stock Cards",
    security(("bearer_auth" = []))
)]
pub async fn item_balance(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let balance = sqlx::query_as::<_, StockBalance>(
        r#"
        SELECT
            i.id AS inventory_item_id,
            i.item_code,
            i.name,
            i.unit,
            i.quantity_on_hand AS balance,
            CAST(COALESCE(SUM(CASE WHEN s.quantity > 0 THEN s.quantity ELSE 0 END), 0) AS SIGNED) AS total_in,
            CAST(COALESCE(SUM(CASE WHEN s.quantity < 0 THEN -s.quantity ELSE 0 END), 0) AS SIGNED) AS total_out,
            MAX(s.transaction_date) AS last_transaction_date
        FROM inventory_items i
        LEFT JOIN stock_cards s ON s.inventory_item_id = i.id
        WHERE i.id = ?
        GROUP BY i.id, i.item_code, i.name, i.unit, i.quantity_on_hand
        "#,
    )
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Inventory item"))?;

    Ok(HttpResponse::Ok().json(balance))
}

#[utoipa::path(
    post,
    path = "/api/stock-cards/stock-in",
    request_body = StockMovementRequest,
    responses(
        (status = 201, description = "Stock received", body = StockCard),
        (status = 422, description = "Validation error")
    ),
    tag = "Stock Cards",
    security(("bearer_auth" = []))
)]
pub async fn stock_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<StockMovementRequest>,
) -> ApiResult<HttpResponse> {
    let card = record(&auth, pool.get_ref(), &payload, TransactionType::StockIn).await?;
    Ok(response::created("Stock in recorded successfully.", card))
}

#[utoipa::path(
    post,
    path = "/api/stock-cards/stock-out",
    request_body = StockMovementRequest,
    responses(
        (status = 201, description = "Stock issued", body = StockCard),
        (status = 422, description = "Insufficient stock or validation error", body = MessageResponse)
    ),
    tag = "Stock Cards",
    security(("bearer_auth" = []))
)]
pub async fn stock_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<StockMovementRequest>,
) -> ApiResult<HttpResponse> {
    let card = record(&auth, pool.get_ref(), &payload, TransactionType::StockOut).await?;
    Ok(response::created("Stock out recorded successfully.", card))
}

#[utoipa::path(
    post,
    path = "/api/stock-cards/donation",
    request_body = StockMovementRequest,
    responses(
        (status = 201, description = "Donation received", body = StockCard),
        (status = 422, description = "Validation error")
    ),
    tag = "Stock Cards",
    security(("bearer_auth" = []))
)]
pub async fn donation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<StockMovementRequest>,
) -> ApiResult<HttpResponse> {
    let card = record(&auth, pool.get_ref(), &payload, TransactionType::Donation).await?;
    Ok(response::created("Donation recorded successfully.", card))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn donor_is_prefixed_to_remarks() {
        assert_eq!(
            donation_remarks(Some("Rotary Club"), Some("Typhoon relief")).as_deref(),
            Some("Donor: Rotary Club. Typhoon relief")
        );
        assert_eq!(donation_remarks(Some("LGU"), None).as_deref(), Some("Donor: LGU"));
        assert_eq!(donation_remarks(Some("  "), Some("n/a")).as_deref(), Some("n/a"));
        assert_eq!(donation_remarks(None, None), None);
    }

    #[test]
    fn quantity_must_be_positive() {
        let payload = StockMovementRequest {
            inventory_item_id: 1,
            quantity: 0,
            reference: None,
            remarks: None,
            transaction_date: None,
            donor: None,
        };
        assert!(payload.validate().is_err());
    }
}
