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
    api::stock_card::{Movement, post_movement},
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult},
    model::{
        inventory_adjustment::{AdjustmentAction, AdjustmentStatus, AdjustmentType, InventoryAdjustment},
        inventory_item::InventoryItem,
        workflow::Workflow,
    },
    models::RemarksRequest,
    utils::{
        db_utils::{Filter, SqlValue, fetch_page, find_by_id, lock_by_id, set_status, update_in},
        pagination::{InventoryAdjustmentPage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "inventory_adjustments";
const RESOURCE: &str = "Inventory adjustment";
const UPDATABLE: &[&str] = &["adjustment_type", "quantity", "reason", "remarks"];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInventoryAdjustment {
    pub inventory_item_id: u64,
    pub adjustment_type: AdjustmentType,
    #[validate(range(min = 1))]
    #[schema(example = 2)]
    pub quantity: i64,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Water damage in storeroom")]
    pub reason: String,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateInventoryAdjustment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_type: Option<AdjustmentType>,
    #[validate(range(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[validate(length(min = 1, max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InventoryAdjustmentQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub inventory_item_id: Option<u64>,
    pub adjustment_type: Option<String>,
    pub status: Option<String>,
}

/// Locks the row and refuses anything past `pending`.
async fn pending(conn: &mut MySqlConnection, id: u64, action: &str) -> ApiResult<InventoryAdjustment> {
    let current: InventoryAdjustment = lock_by_id(conn, TABLE, id, RESOURCE).await?;
    AdjustmentStatus::parse(&current.status)?.ensure_one_of(&[AdjustmentStatus::Pending], action)?;
    Ok(current)
}

#[utoipa::path(
    get,
    path = "/api/inventory-adjustments",
    params(InventoryAdjustmentQuery),
    responses((status = 200, description = "Paginated inventory adjustments", body = InventoryAdjustmentPage)),
    tag = "Inventory Adjustments",
    security(("bearer_auth" = []))
)]
pub async fn list_inventory_adjustments(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<InventoryAdjustmentQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("inventory_item_id", query.inventory_item_id)
        .eq("adjustment_type", query.adjustment_type.clone())
        .eq("status", query.status.clone());

    let page = fetch_page::<InventoryAdjustment>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "id DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/inventory-adjustments",
    request_body = CreateInventoryAdjustment,
    responses(
        (status = 201, description = "Adjustment requested", body = InventoryAdjustment),
        (status = 422, description = "Validation error")
    ),
    tag = "Inventory Adjustments",
    security(("bearer_auth" = []))
)]
pub async fn create_inventory_adjustment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateInventoryAdjustment>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;

    find_by_id::<InventoryItem, _>(pool.get_ref(), "inventory_items", payload.inventory_item_id, "Inventory item")
        .await
        .map_err(|err| match err {
            ApiError::NotFound(_) => {
                ApiError::invalid("inventory_item_id", "The selected inventory item id is invalid.")
            }
            other => other,
        })?;

    let result = sqlx::query(
        r#"
        INSERT INTO inventory_adjustments
            (inventory_item_id, adjustment_type, quantity, reason, status, requested_by, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.inventory_item_id)
    .bind(payload.adjustment_type.as_ref())
    .bind(payload.quantity)
    .bind(&payload.reason)
    .bind(AdjustmentStatus::Pending.as_ref())
    .bind(auth.user_id)
    .bind(&payload.remarks)
    .execute(pool.get_ref())
    .await?;
    let id = result.last_insert_id();

    let adjustment: InventoryAdjustment = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    info!(
        adjustment_id = id,
        inventory_item_id = payload.inventory_item_id,
        adjustment_type = payload.adjustment_type.as_ref(),
        "Inventory adjustment requested"
    );
    Ok(response::created("Inventory adjustment created successfully.", adjustment))
}

#[utoipa::path(
    get,
    path = "/api/inventory-adjustments/{id}",
    params(("id", Path, description = "Inventory adjustment ID")),
    responses(
        (status = 200, description = "Inventory adjustment", body = InventoryAdjustment),
        (status = 404, description = "Inventory adjustment not found", body = MessageResponse)
    ),
    tag = "Inventory Adjustments",
    security(("bearer_auth" = []))
)]
pub async fn get_inventory_adjustment(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let adjustment: InventoryAdjustment = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(adjustment))
}

#[utoipa::path(
    put,
    path = "/api/inventory-adjustments/{id}",
    params(("id", Path, description = "Inventory adjustment ID")),
    request_body = UpdateInventoryAdjustment,
    responses(
        (status = 200, description = "Inventory adjustment updated", body = InventoryAdjustment),
        (status = 422, description = "Adjustment is no longer pending", body = MessageResponse)
    ),
    tag = "Inventory Adjustments",
    security(("bearer_auth" = []))
)]
pub async fn update_inventory_adjustment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateInventoryAdjustment>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    pending(&mut tx, id, "update").await?;
    update_in(&mut tx, TABLE, UPDATABLE, id, &*payload).await?;
    let adjustment: InventoryAdjustment = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;
    Ok(response::ok_with("Inventory adjustment updated successfully.", adjustment))
}

#[utoipa::path(
    delete,
    path = "/api/inventory-adjustments/{id}",
    params(("id", Path, description = "Inventory adjustment ID")),
    responses(
        (status = 200, description = "Inventory adjustment deleted", body = MessageResponse),
        (status = 422, description = "Adjustment is no longer pending", body = MessageResponse)
    ),
    tag = "Inventory Adjustments",
    security(("bearer_auth" = []))
)]
pub async fn delete_inventory_adjustment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    pending(&mut tx, id, "delete").await?;
    sqlx::query("DELETE FROM inventory_adjustments WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(response::message("Inventory adjustment deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/inventory-adjustments/{id}/approve",
    params(("id", Path, description = "Inventory adjustment ID")),
    responses(
        (status = 200, description = "Adjustment approved and posted to the stock ledger", body = InventoryAdjustment),
        (status = 403, description = "Admin only", body = MessageResponse),
        (status = 422, description = "Illegal transition or insufficient stock", body = MessageResponse)
    ),
    tag = "Inventory Adjustments",
    security(("bearer_auth" = []))
)]
pub async fn approve_inventory_adjustment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: InventoryAdjustment = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = AdjustmentStatus::parse(&current.status)?.transition(AdjustmentAction::Approve)?;
    let kind = AdjustmentType::from_str(&current.adjustment_type)
        .map_err(|_| ApiError::Internal(anyhow!("unknown adjustment type {:?}", current.adjustment_type)))?;
    let reference = format!("ADJ-{}", id);

    let card = post_movement(
        &mut tx,
        Movement {
            inventory_item_id: current.inventory_item_id,
            transaction_type: kind.transaction_type(),
            quantity: current.quantity,
            reference: Some(&reference),
            remarks: Some(&current.reason),
            transaction_date: Utc::now().date_naive(),
            created_by: Some(auth.user_id),
        },
    )
    .await?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("approved_by", SqlValue::from(auth.user_id)), ("approved_at", SqlValue::now())],
    )
    .await?;
    let adjustment: InventoryAdjustment = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(
        adjustment_id = id,
        inventory_item_id = current.inventory_item_id,
        balance_after = card.balance_after,
        "Inventory adjustment approved"
    );
    Ok(response::ok_with("Inventory adjustment approved successfully.", adjustment))
}

#[utoipa::path(
    post,
    path = "/api/inventory-adjustments/{id}/reject",
    params(("id", Path, description = "Inventory adjustment ID")),
    request_body = RemarksRequest,
    responses(
        (status = 200, description = "Adjustment rejected", body = InventoryAdjustment),
        (status = 422, description = "Missing remarks or illegal transition", body = MessageResponse)
    ),
    tag = "Inventory Adjustments",
    security(("bearer_auth" = []))
)]
pub async fn reject_inventory_adjustment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RemarksRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: InventoryAdjustment = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = AdjustmentStatus::parse(&current.status)?.transition(AdjustmentAction::Reject)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("remarks", SqlValue::from(payload.remarks.as_str()))],
    )
    .await?;
    let adjustment: InventoryAdjustment = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(adjustment_id = id, user_id = auth.user_id, "Inventory adjustment rejected");
    Ok(response::ok_with("Inventory adjustment rejected successfully.", adjustment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_adjustment_type_fails_to_deserialize() {
        let payload: Result<CreateInventoryAdjustment, _> = serde_json::from_value(json!({
            "inventory_item_id": 1,
            "adjustment_type": "shrink",
            "quantity": 1,
            "reason": "Spoilage"
        }));
        assert!(payload.is_err());
    }

    #[test]
    fn adjustment_type_is_stored_in_snake_case() {
        let payload = UpdateInventoryAdjustment {
            adjustment_type: Some(AdjustmentType::Decrease),
            quantity: None,
            reason: None,
            remarks: None,
        };
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!({ "adjustment_type": "decrease" }));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let payload = CreateInventoryAdjustment {
            inventory_item_id: 1,
            adjustment_type: AdjustmentType::Increase,
            quantity: 0,
            reason: "Found in storage".to_string(),
            remarks: None,
        };
        assert!(payload.validate().is_err());
    }
}
