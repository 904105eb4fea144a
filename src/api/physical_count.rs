use std::collections::HashSet;

use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    api::stock_card::{Movement, post_movement},
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult, FieldErrors},
    model::{
        physical_count::{
            PhysicalCount, PhysicalCountAction, PhysicalCountDetail, PhysicalCountItem, PhysicalCountStatus,
            VarianceReport, variance_report,
        },
        stock_card::TransactionType,
        workflow::Workflow,
    },
    utils::{
        db_utils::{Filter, SqlValue, fetch_page, find_by_id, lock_by_id, set_status},
        doc_number::{DocumentSeries, next_number},
        pagination::{Pagination, PhysicalCountPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "physical_counts";
const RESOURCE: &str = "Physical count";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePhysicalCount {
    /// Defaults to today.
    #[schema(example = "2026-06-30")]
    pub count_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CountLine {
    pub inventory_item_id: u64,
    #[validate(range(min = 0))]
    #[schema(example = 48)]
    pub counted_quantity: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordCounts {
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    pub items: Vec<CountLine>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PhysicalCountQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<String>,
}

async fn load_items(conn: &mut MySqlConnection, id: u64) -> ApiResult<Vec<PhysicalCountItem>> {
    let items = sqlx::query_as::<_, PhysicalCountItem>(
        "SELECT * FROM physical_count_items WHERE physical_count_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items.into_iter().map(PhysicalCountItem::with_variance).collect())
}

async fn load_detail(conn: &mut MySqlConnection, id: u64) -> ApiResult<PhysicalCountDetail> {
    let physical_count: PhysicalCount = find_by_id(&mut *conn, TABLE, id, RESOURCE).await?;
    let items = load_items(conn, id).await?;
    Ok(PhysicalCountDetail { physical_count, items })
}

/// Every submitted item must already be a line of this count.
fn check_lines(lines: &[CountLine], items: &[PhysicalCountItem]) -> ApiResult<()> {
    let known: HashSet<u64> = items.iter().map(|i| i.inventory_item_id).collect();
    let mut errors = FieldErrors::new();
    for (index, line) in lines.iter().enumerate() {
        if !known.contains(&line.inventory_item_id) {
            errors.insert(
                format!("items.{}.inventory_item_id", index),
                vec!["The selected inventory item is not part of this count.".to_string()],
            );
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn ensure_fully_counted(items: &[PhysicalCountItem]) -> ApiResult<()> {
    let uncounted = items.iter().filter(|i| i.counted_quantity.is_none()).count();
    if uncounted > 0 {
        return Err(ApiError::unprocessable(format!(
            "All items must be counted before completing. Uncounted items: {}",
            uncounted
        )));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/physical-counts",
    params(PhysicalCountQuery),
    responses((status = 200, description = "Paginated physical counts", body = PhysicalCountPage)),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn list_physical_counts(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PhysicalCountQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new().eq("status", query.status.clone());

    let page = fetch_page::<PhysicalCount>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "count_date DESC, id DESC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/physical-counts",
    request_body = CreatePhysicalCount,
    responses((status = 201, description = "Count started with a snapshot of every active item", body = PhysicalCountDetail)),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn create_physical_count(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePhysicalCount>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let count_date = payload.count_date.unwrap_or_else(|| Utc::now().date_naive());

    let mut tx = pool.begin().await?;
    let number = next_number(&mut tx, DocumentSeries::PhysicalCount, count_date).await?;

    let result = sqlx::query(
        "INSERT INTO physical_counts (count_number, count_date, status, conducted_by, remarks) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&number)
    .bind(count_date)
    .bind(PhysicalCountStatus::InProgress.as_ref())
    .bind(auth.user_id)
    .bind(&payload.remarks)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    let snapshot = sqlx::query(
        r#"
        INSERT INTO physical_count_items (physical_count_id, inventory_item_id, system_quantity, unit_cost)
        SELECT ?, id, quantity_on_hand, unit_cost
        FROM inventory_items
        WHERE is_active = TRUE
        ORDER BY id
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(
        physical_count_id = id,
        count_number = %number,
        lines = snapshot.rows_affected(),
        "Physical count started"
    );
    Ok(response::created("Physical count created successfully.", detail))
}

#[utoipa::path(
    get,
    path = "/api/physical-counts/{id}",
    params(("id", Path, description = "Physical count ID")),
    responses(
        (status = 200, description = "Physical count with lines", body = PhysicalCountDetail),
        (status = 404, description = "Physical count not found", body = MessageResponse)
    ),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn get_physical_count(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let mut conn = pool.acquire().await?;
    let detail = load_detail(&mut conn, path.into_inner()).await?;
    Ok(response::data(detail))
}

#[utoipa::path(
    delete,
    path = "/api/physical-counts/{id}",
    params(("id", Path, description = "Physical count ID")),
    responses(
        (status = 200, description = "Physical count deleted", body = MessageResponse),
        (status = 422, description = "Count is no longer in progress", body = MessageResponse)
    ),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn delete_physical_count(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: PhysicalCount = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    PhysicalCountStatus::parse(&current.status)?.ensure_one_of(&[PhysicalCountStatus::InProgress], "delete")?;

    sqlx::query("DELETE FROM physical_counts WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(physical_count_id = id, user_id = auth.user_id, "Physical count deleted");
    Ok(response::message("Physical count deleted successfully."))
}

#[utoipa::path(
    put,
    path = "/api/physical-counts/{id}/items",
    params(("id", Path, description = "Physical count ID")),
    request_body = RecordCounts,
    responses(
        (status = 200, description = "Counted quantities recorded", body = PhysicalCountDetail),
        (status = 422, description = "Unknown item or count no longer in progress", body = MessageResponse)
    ),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn record_counts(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RecordCounts>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: PhysicalCount = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    PhysicalCountStatus::parse(&current.status)?.ensure_one_of(&[PhysicalCountStatus::InProgress], "update")?;

    let items = load_items(&mut tx, id).await?;
    check_lines(&payload.items, &items)?;

    for line in &payload.items {
        sqlx::query(
            "UPDATE physical_count_items SET counted_quantity = ? WHERE physical_count_id = ? AND inventory_item_id = ?",
        )
        .bind(line.counted_quantity)
        .bind(id)
        .bind(line.inventory_item_id)
        .execute(&mut *tx)
        .await?;
    }

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    Ok(response::ok_with("Physical count updated successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/physical-counts/{id}/complete",
    params(("id", Path, description = "Physical count ID")),
    responses(
        (status = 200, description = "Count completed", body = PhysicalCountDetail),
        (status = 422, description = "Uncounted lines or illegal transition", body = MessageResponse)
    ),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn complete_physical_count(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: PhysicalCount = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = PhysicalCountStatus::parse(&current.status)?.transition(PhysicalCountAction::Complete)?;
    ensure_fully_counted(&load_items(&mut tx, id).await?)?;

    set_status(&mut tx, TABLE, id, next.as_ref(), &[]).await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(physical_count_id = id, "Physical count completed");
    Ok(response::ok_with("Physical count completed successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/physical-counts/{id}/cancel",
    params(("id", Path, description = "Physical count ID")),
    responses(
        (status = 200, description = "Count cancelled", body = PhysicalCountDetail),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn cancel_physical_count(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: PhysicalCount = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = PhysicalCountStatus::parse(&current.status)?.transition(PhysicalCountAction::Cancel)?;

    set_status(&mut tx, TABLE, id, next.as_ref(), &[]).await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(physical_count_id = id, "Physical count cancelled");
    Ok(response::ok_with("Physical count cancelled successfully.", detail))
}

#[utoipa::path(
    get,
    path = "/api/physical-counts/{id}/variances",
    params(("id", Path, description = "Physical count ID")),
    responses(
        (status = 200, description = "Lines whose count differs from the snapshot", body = VarianceReport),
        (status = 404, description = "Physical count not found", body = MessageResponse)
    ),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn physical_count_variances(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let mut conn = pool.acquire().await?;
    find_by_id::<PhysicalCount, _>(&mut *conn, TABLE, id, RESOURCE).await?;
    let items = load_items(&mut conn, id).await?;

    Ok(HttpResponse::Ok().json(variance_report(id, &items)))
}

#[utoipa::path(
    post,
    path = "/api/physical-counts/{id}/approve",
    params(("id", Path, description = "Physical count ID")),
    responses(
        (status = 200, description = "Count approved and variances posted to the stock ledger", body = PhysicalCountDetail),
        (status = 403, description = "Admin only", body = MessageResponse),
        (status = 422, description = "Illegal transition or a variance would drive stock negative", body = MessageResponse)
    ),
    tag = "Physical Counts",
    security(("bearer_auth" = []))
)]
pub async fn approve_physical_count(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: PhysicalCount = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = PhysicalCountStatus::parse(&current.status)?.transition(PhysicalCountAction::Approve)?;

    let report = variance_report(id, &load_items(&mut tx, id).await?);
    for line in &report.items {
        if let Err(err) = post_movement(
            &mut tx,
            Movement {
                inventory_item_id: line.inventory_item_id,
                transaction_type: TransactionType::CountAdjustment,
                quantity: line.variance,
                reference: Some(&current.count_number),
                remarks: Some("Physical count variance"),
                transaction_date: current.count_date,
                created_by: Some(auth.user_id),
            },
        )
        .await
        {
            warn!(
                physical_count_id = id,
                inventory_item_id = line.inventory_item_id,
                variance = line.variance,
                "Count variance could not be posted"
            );
            return Err(err);
        }
    }

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("approved_by", SqlValue::from(auth.user_id)), ("approved_at", SqlValue::now())],
    )
    .await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(
        physical_count_id = id,
        adjustments = report.items.len(),
        total_variance_value = report.total_variance_value,
        "Physical count approved"
    );
    Ok(response::ok_with("Physical count approved successfully.", detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(inventory_item_id: u64, counted: Option<i64>) -> PhysicalCountItem {
        PhysicalCountItem {
            id: inventory_item_id,
            physical_count_id: 1,
            inventory_item_id,
            system_quantity: 10,
            counted_quantity: counted,
            unit_cost: 5.0,
            variance: None,
        }
    }

    #[test]
    fn lines_outside_the_count_are_flagged_by_position() {
        let items = [item(1, None), item(2, None)];
        let lines = vec![
            CountLine { inventory_item_id: 2, counted_quantity: 9 },
            CountLine { inventory_item_id: 7, counted_quantity: 1 },
        ];
        let err = check_lines(&lines, &items).unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key("items.1.inventory_item_id"));
    }

    #[test]
    fn completion_requires_every_line_counted() {
        assert!(ensure_fully_counted(&[item(1, Some(10)), item(2, Some(0))]).is_ok());

        let err = ensure_fully_counted(&[item(1, Some(10)), item(2, None)]).unwrap_err();
        let ApiError::Unprocessable(message) = err else {
            panic!("expected unprocessable");
        };
        assert!(message.ends_with("Uncounted items: 1"));
    }

    #[test]
    fn negative_count_fails_validation() {
        let payload = RecordCounts {
            items: vec![CountLine { inventory_item_id: 1, counted_quantity: -1 }],
        };
        assert!(payload.validate().is_err());
    }
}
