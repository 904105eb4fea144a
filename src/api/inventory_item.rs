use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::stock_card::{Movement, post_movement},
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult},
    model::{inventory_item::InventoryItem, stock_card::TransactionType},
    utils::{
        amount::round2,
        db_utils::{Filter, delete_by_id, fetch_page, find_by_id, update_from},
        pagination::{InventoryItemPage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "inventory_items";
const RESOURCE: &str = "Inventory item";
// quantity_on_hand is moved by the stock ledger only
const UPDATABLE: &[&str] = &[
    "item_code",
    "name",
    "description",
    "category",
    "unit",
    "unit_cost",
    "reorder_level",
    "is_active",
];
const SEARCH_COLUMNS: &[&str] = &["item_code", "name", "description"];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInventoryItem {
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "OS-0001")]
    pub item_code: String,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Bond paper, A4")]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(max = 100))]
    #[schema(example = "Office supplies")]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 30))]
    #[schema(example = "ream")]
    pub unit: String,
    #[validate(range(min = 0.0))]
    pub unit_cost: f64,
    #[validate(range(min = 0))]
    pub reorder_level: Option<i64>,
    pub is_active: Option<bool>,
    /// Posted to the ledger as the first stock-in.
    #[validate(range(min = 0))]
    pub opening_quantity: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateInventoryItem {
    #[validate(length(min = 1, max = 50))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_code: Option<String>,
    #[validate(length(min = 1, max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[validate(length(min = 1, max = 30))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[validate(range(min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<f64>,
    #[validate(range(min = 0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reorder_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InventoryItemQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    /// Matches code, name or description
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/inventory-items",
    params(InventoryItemQuery),
    responses((status = 200, description = "Paginated inventory items", body = InventoryItemPage)),
    tag = "Inventory Items",
    security(("bearer_auth" = []))
)]
pub async fn list_inventory_items(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<InventoryItemQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("category", query.category.clone())
        .eq("is_active", query.is_active)
        .like_any(SEARCH_COLUMNS, query.search.as_deref());

    let page = fetch_page::<InventoryItem>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "name ASC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/inventory-items/low-stock",
    params(InventoryItemQuery),
    responses((status = 200, description = "Active items at or below their reorder level", body = InventoryItemPage)),
    tag = "Inventory Items",
    security(("bearer_auth" = []))
)]
pub async fn low_stock_items(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<InventoryItemQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("is_active", Some(true))
        .eq("category", query.category.clone())
        .raw("quantity_on_hand <= reorder_level", Vec::new());

    let page = fetch_page::<InventoryItem>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "quantity_on_hand ASC, name ASC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/inventory-items",
    request_body = CreateInventoryItem,
    responses(
        (status = 201, description = "Inventory item created", body = InventoryItem),
        (status = 409, description = "Item code already used", body = MessageResponse),
        (status = 422, description = "Validation error")
    ),
    tag = "Inventory Items",
    security(("bearer_auth" = []))
)]
pub async fn create_inventory_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateInventoryItem>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        INSERT INTO inventory_items
            (item_code, name, description, category, unit, unit_cost, reorder_level, quantity_on_hand, is_active)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(payload.item_code.trim())
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.category)
    .bind(&payload.unit)
    .bind(round2(payload.unit_cost))
    .bind(payload.reorder_level.unwrap_or(0))
    .bind(payload.is_active.unwrap_or(true))
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    if let Some(quantity) = payload.opening_quantity.filter(|q| *q > 0) {
        post_movement(
            &mut tx,
            Movement {
                inventory_item_id: id,
                transaction_type: TransactionType::StockIn,
                quantity,
                reference: Some("Opening balance"),
                remarks: None,
                transaction_date: Utc::now().date_naive(),
                created_by: Some(auth.user_id),
            },
        )
        .await?;
    }

    let item: InventoryItem = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(inventory_item_id = id, item_code = %item.item_code, "Inventory item created");
    Ok(response::created("Inventory item created successfully.", item))
}

#[utoipa::path(
    get,
    path = "/api/inventory-items/{id}",
    params(("id", Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Inventory item", body = InventoryItem),
        (status = 404, description = "Inventory item not found", body = MessageResponse)
    ),
    tag = "Inventory Items",
    security(("bearer_auth" = []))
)]
pub async fn get_inventory_item(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let item: InventoryItem = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(item))
}

#[utoipa::path(
    put,
    path = "/api/inventory-items/{id}",
    params(("id", Path, description = "Inventory item ID")),
    request_body = UpdateInventoryItem,
    responses(
        (status = 200, description = "Inventory item updated", body = InventoryItem),
        (status = 404, description = "Inventory item not found", body = MessageResponse)
    ),
    tag = "Inventory Items",
    security(("bearer_auth" = []))
)]
pub async fn update_inventory_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateInventoryItem>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    find_by_id::<InventoryItem, _>(pool.get_ref(), TABLE, id, RESOURCE).await?;
    update_from(pool.get_ref(), TABLE, UPDATABLE, id, &payload.into_inner()).await?;

    let item: InventoryItem = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    Ok(response::ok_with("Inventory item updated successfully.", item))
}

#[utoipa::path(
    delete,
    path = "/api/inventory-items/{id}",
    params(("id", Path, description = "Inventory item ID")),
    responses(
        (status = 200, description = "Inventory item deleted", body = MessageResponse),
        (status = 404, description = "Inventory item not found", body = MessageResponse),
        (status = 409, description = "Item has stock card history", body = MessageResponse)
    ),
    tag = "Inventory Items",
    security(("bearer_auth" = []))
)]
pub async fn delete_inventory_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    find_by_id::<InventoryItem, _>(pool.get_ref(), TABLE, id, RESOURCE).await?;

    let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_cards WHERE inventory_item_id = ?")
        .bind(id)
        .fetch_one(pool.get_ref())
        .await?;
    if history > 0 {
        return Err(ApiError::Conflict(
            "Inventory item has stock card history and cannot be deleted.".to_string(),
        ));
    }

    delete_by_id(pool.get_ref(), TABLE, id).await?;
    info!(inventory_item_id = id, user_id = auth.user_id, "Inventory item deleted");
    Ok(response::message("Inventory item deleted successfully."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn on_hand_quantity_is_not_updatable() {
        assert!(!UPDATABLE.contains(&"quantity_on_hand"));
        let payload: Result<UpdateInventoryItem, _> =
            serde_json::from_value(json!({ "name": "Folder", "quantity_on_hand": 99 }));
        let payload = payload.unwrap();
        let serialized = serde_json::to_value(&payload).unwrap();
        assert_eq!(serialized, json!({ "name": "Folder" }));
    }

    #[test]
    fn negative_reorder_level_is_rejected() {
        let payload = UpdateInventoryItem {
            item_code: None,
            name: None,
            description: None,
            category: None,
            unit: None,
            unit_cost: None,
            reorder_level: Some(-1),
            is_active: None,
        };
        assert!(payload.validate().is_err());
    }
}
