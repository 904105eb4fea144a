use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::budget::{check_funds, ensure_budget_exists},
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult},
    model::{
        purchase_request::{
            PurchaseRequest, PurchaseRequestAction, PurchaseRequestDetail, PurchaseRequestItem,
            PurchaseRequestStatus,
        },
        workflow::Workflow,
    },
    models::{LineItemRequest, RemarksRequest},
    utils::{
        amount::{line_total, round2},
        db_utils::{
            Filter, SqlValue, delete_by_id, fetch_page, find_by_id, has_changes, lock_by_id,
            set_status, update_in,
        },
        doc_number::{DocumentSeries, next_number},
        pagination::{Pagination, PurchaseRequestPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "purchase_requests";
const RESOURCE: &str = "Purchase request";
const UPDATABLE: &[&str] = &["department", "purpose", "budget_id", "remarks"];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseRequest {
    #[validate(length(min = 1, max = 150))]
    #[schema(example = "Administrative Division")]
    pub department: String,
    #[validate(length(min = 1))]
    #[schema(example = "Office supplies for Q1")]
    pub purpose: String,
    pub budget_id: Option<u64>,
    pub remarks: Option<String>,
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    pub items: Vec<LineItemRequest>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdatePurchaseRequest {
    #[validate(length(min = 1, max = 150))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[validate(length(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    /// Replaces every line when present.
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    #[serde(skip_serializing)]
    pub items: Option<Vec<LineItemRequest>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PurchaseRequestQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<String>,
    pub department: Option<String>,
    /// Matches PR number or purpose
    pub search: Option<String>,
}

async fn load_detail(conn: &mut MySqlConnection, id: u64) -> ApiResult<PurchaseRequestDetail> {
    let purchase_request: PurchaseRequest = find_by_id(&mut *conn, TABLE, id, RESOURCE).await?;
    let items = sqlx::query_as::<_, PurchaseRequestItem>(
        "SELECT * FROM purchase_request_items WHERE purchase_request_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(PurchaseRequestDetail { purchase_request, items })
}

/// Inserts the lines and returns their total.
async fn insert_items(
    conn: &mut MySqlConnection,
    purchase_request_id: u64,
    items: &[LineItemRequest],
) -> ApiResult<f64> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO purchase_request_items
                (purchase_request_id, inventory_item_id, description, unit, quantity, unit_cost, amount)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(purchase_request_id)
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

/// Locks the PR, applies `action` and stamps the given columns.
async fn apply(
    pool: &MySqlPool,
    id: u64,
    action: PurchaseRequestAction,
    stamps: &[(&str, SqlValue)],
) -> ApiResult<PurchaseRequestDetail> {
    let mut tx = pool.begin().await?;
    let current: PurchaseRequest = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = PurchaseRequestStatus::parse(&current.status)?.transition(action)?;

    set_status(&mut tx, TABLE, id, next.as_ref(), stamps).await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(purchase_request_id = id, status = next.as_ref(), "Purchase request status changed");
    Ok(detail)
}

#[utoipa::path(
    get,
    path = "/api/purchase-requests",
    params(PurchaseRequestQuery),
    responses((status = 200, description = "Paginated purchase requests", body = PurchaseRequestPage)),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn list_purchase_requests(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PurchaseRequestQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("status", query.status.clone())
        .eq("department", query.department.clone())
        .like_any(&["pr_number", "purpose"], query.search.as_deref());

    let page = fetch_page::<PurchaseRequest>(
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
    path = "/api/purchase-requests",
    request_body = CreatePurchaseRequest,
    responses(
        (status = 201, description = "Purchase request created with its items", body = PurchaseRequestDetail),
        (status = 422, description = "Validation error")
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn create_purchase_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePurchaseRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    ensure_budget_exists(&mut tx, payload.budget_id).await?;
    let pr_number = next_number(&mut tx, DocumentSeries::PurchaseRequest, Utc::now().date_naive()).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO purchase_requests
            (pr_number, department, purpose, requested_by, budget_id, status, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&pr_number)
    .bind(&payload.department)
    .bind(&payload.purpose)
    .bind(auth.user_id)
    .bind(payload.budget_id)
    .bind(PurchaseRequestStatus::Draft.as_ref())
    .bind(&payload.remarks)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    let total = insert_items(&mut tx, id, &payload.items).await?;
    sqlx::query("UPDATE purchase_requests SET total_amount = ? WHERE id = ?")
        .bind(total)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(purchase_request_id = id, pr_number = %pr_number, total, "Purchase request created");
    Ok(response::created("Purchase request created successfully.", detail))
}

#[utoipa::path(
    get,
    path = "/api/purchase-requests/{id}",
    params(("id", Path, description = "Purchase request ID")),
    responses(
        (status = 200, description = "Purchase request with items", body = PurchaseRequestDetail),
        (status = 404, description = "Purchase request not found", body = MessageResponse)
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn get_purchase_request(
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
    path = "/api/purchase-requests/{id}",
    params(("id", Path, description = "Purchase request ID")),
    request_body = UpdatePurchaseRequest,
    responses(
        (status = 200, description = "Purchase request updated", body = PurchaseRequestDetail),
        (status = 404, description = "Purchase request not found", body = MessageResponse),
        (status = 422, description = "Not a draft", body = MessageResponse)
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn update_purchase_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdatePurchaseRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: PurchaseRequest = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    PurchaseRequestStatus::parse(&current.status)?
        .ensure_one_of(&[PurchaseRequestStatus::Draft], "update")?;
    ensure_budget_exists(&mut tx, payload.budget_id).await?;

    if payload.items.is_none() || has_changes(&*payload) {
        update_in(&mut tx, TABLE, UPDATABLE, id, &*payload).await?;
    }

    if let Some(items) = &payload.items {
        sqlx::query("DELETE FROM purchase_request_items WHERE purchase_request_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let total = insert_items(&mut tx, id, items).await?;
        sqlx::query("UPDATE purchase_requests SET total_amount = ? WHERE id = ?")
            .bind(total)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    Ok(response::ok_with("Purchase request updated successfully.", detail))
}

#[utoipa::path(
    delete,
    path = "/api/purchase-requests/{id}",
    params(("id", Path, description = "Purchase request ID")),
    responses(
        (status = 200, description = "Purchase request deleted", body = MessageResponse),
        (status = 404, description = "Purchase request not found", body = MessageResponse),
        (status = 422, description = "Not a draft", body = MessageResponse)
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn delete_purchase_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let current: PurchaseRequest = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    PurchaseRequestStatus::parse(&current.status)?
        .ensure_one_of(&[PurchaseRequestStatus::Draft], "delete")?;

    delete_by_id(pool.get_ref(), TABLE, id).await?;
    info!(purchase_request_id = id, user_id = auth.user_id, "Purchase request deleted");
    Ok(response::message("Purchase request deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/purchase-requests/{id}/submit",
    params(("id", Path, description = "Purchase request ID")),
    responses(
        (status = 200, description = "Purchase request submitted", body = PurchaseRequestDetail),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn submit_purchase_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let detail = apply(pool.get_ref(), path.into_inner(), PurchaseRequestAction::Submit, &[]).await?;
    Ok(response::ok_with("Purchase request submitted successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/purchase-requests/{id}/recommend",
    params(("id", Path, description = "Purchase request ID")),
    responses(
        (status = 200, description = "Purchase request recommended", body = PurchaseRequestDetail),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn recommend_purchase_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let detail = apply(pool.get_ref(), path.into_inner(), PurchaseRequestAction::Recommend, &[]).await?;
    Ok(response::ok_with("Purchase request recommended successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/purchase-requests/{id}/approve",
    params(("id", Path, description = "Purchase request ID")),
    responses(
        (status = 200, description = "Purchase request approved", body = PurchaseRequestDetail),
        (status = 422, description = "Illegal transition or insufficient budget", body = MessageResponse)
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn approve_purchase_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: PurchaseRequest = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = PurchaseRequestStatus::parse(&current.status)?.transition(PurchaseRequestAction::Approve)?;

    // funds check only; the budget is charged when money is released
    if let Some(budget_id) = current.budget_id {
        check_funds(&mut tx, budget_id, current.total_amount).await?;
    }

    set_status(&mut tx, TABLE, id, next.as_ref(), &[]).await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(purchase_request_id = id, user_id = auth.user_id, "Purchase request approved");
    Ok(response::ok_with("Purchase request approved successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/purchase-requests/{id}/disapprove",
    params(("id", Path, description = "Purchase request ID")),
    request_body = RemarksRequest,
    responses(
        (status = 200, description = "Purchase request disapproved", body = PurchaseRequestDetail),
        (status = 422, description = "Missing remarks or illegal transition", body = MessageResponse)
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn disapprove_purchase_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RemarksRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    payload.validate()?;

    let detail = apply(
        pool.get_ref(),
        path.into_inner(),
        PurchaseRequestAction::Disapprove,
        &[("remarks", SqlValue::from(payload.remarks.as_str()))],
    )
    .await?;
    Ok(response::ok_with("Purchase request disapproved successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/purchase-requests/{id}/cancel",
    params(("id", Path, description = "Purchase request ID")),
    responses(
        (status = 200, description = "Purchase request cancelled", body = PurchaseRequestDetail),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Purchase Requests",
    security(("bearer_auth" = []))
)]
pub async fn cancel_purchase_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let detail = apply(pool.get_ref(), path.into_inner(), PurchaseRequestAction::Cancel, &[]).await?;
    Ok(response::ok_with("Purchase request cancelled successfully.", detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: i64, unit_cost: f64) -> LineItemRequest {
        LineItemRequest {
            inventory_item_id: None,
            description: "Ballpen, black".to_string(),
            unit: "box".to_string(),
            quantity,
            unit_cost,
        }
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let payload = CreatePurchaseRequest {
            department: "Records".to_string(),
            purpose: "Supplies".to_string(),
            budget_id: None,
            remarks: None,
            items: vec![],
        };
        let err: ApiError = payload.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("items"));
    }

    #[test]
    fn bad_lines_are_reported_by_index() {
        let payload = CreatePurchaseRequest {
            department: "Records".to_string(),
            purpose: "Supplies".to_string(),
            budget_id: None,
            remarks: None,
            items: vec![line(2, 10.0), line(0, 10.0)],
        };
        let err: ApiError = payload.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("items.1.quantity"));
    }

    #[test]
    fn item_only_update_has_no_header_changes() {
        let payload = UpdatePurchaseRequest {
            department: None,
            purpose: None,
            budget_id: None,
            remarks: None,
            items: Some(vec![line(1, 5.0)]),
        };
        assert!(!has_changes(&payload));
    }
}
