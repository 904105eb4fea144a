use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, FINANCE_STAFF},
    error::{ApiError, ApiResult},
    model::{
        budget::{Budget, BudgetAction, BudgetCategory, BudgetStatus, BudgetUtilization},
        workflow::Workflow,
    },
    utils::{
        amount::round2,
        db_utils::{Filter, SqlValue, fetch_page, find_by_id, lock_by_id, set_status, update_in},
        pagination::{BudgetPage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "budgets";
const RESOURCE: &str = "Budget";
const UPDATABLE: &[&str] = &["fiscal_year", "department", "category", "description", "allocated_amount"];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBudget {
    #[validate(range(min = 2000, max = 2100))]
    #[schema(example = 2026)]
    pub fiscal_year: i32,
    #[validate(length(min = 1, max = 150))]
    #[schema(example = "Engineering")]
    pub department: String,
    pub category: BudgetCategory,
    pub description: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    #[schema(example = 250000.0)]
    pub allocated_amount: f64,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateBudget {
    #[validate(range(min = 2000, max = 2100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_year: Option<i32>,
    #[validate(length(min = 1, max = 150))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<BudgetCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated_amount: Option<f64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BudgetQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub fiscal_year: Option<i32>,
    pub department: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

/// 422 keyed `budget_id` when a referenced budget does not exist.
pub(crate) async fn ensure_budget_exists(conn: &mut MySqlConnection, budget_id: Option<u64>) -> ApiResult<()> {
    if let Some(budget_id) = budget_id {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM budgets WHERE id = ?")
            .bind(budget_id)
            .fetch_one(&mut *conn)
            .await?;
        if found == 0 {
            return Err(ApiError::invalid("budget_id", "The selected budget id is invalid."));
        }
    }
    Ok(())
}

/// Locks the budget row for a funds check without charging it.
pub(crate) async fn check_funds(conn: &mut MySqlConnection, budget_id: u64, amount: f64) -> ApiResult<Budget> {
    let budget: Budget = lock_by_id(conn, TABLE, budget_id, RESOURCE).await?;
    budget.ensure_available(amount)?;
    Ok(budget)
}

/// Adds `amount` to the utilized total. Runs inside the caller's transaction.
pub(crate) async fn charge_budget(conn: &mut MySqlConnection, budget_id: u64, amount: f64) -> ApiResult<Budget> {
    let budget = check_funds(&mut *conn, budget_id, amount).await?;
    let utilized = round2(budget.utilized_amount + amount);

    sqlx::query("UPDATE budgets SET utilized_amount = ? WHERE id = ?")
        .bind(utilized)
        .bind(budget_id)
        .execute(&mut *conn)
        .await?;

    info!(budget_id, amount, utilized_amount = utilized, "Budget charged");
    Ok(Budget { utilized_amount: utilized, ..budget })
}

async fn apply(
    pool: &MySqlPool,
    id: u64,
    action: BudgetAction,
    stamps: &[(&str, SqlValue)],
) -> ApiResult<Budget> {
    let mut tx = pool.begin().await?;
    let current: Budget = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = BudgetStatus::parse(&current.status)?.transition(action)?;

    set_status(&mut tx, TABLE, id, next.as_ref(), stamps).await?;
    let budget: Budget = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    info!(budget_id = id, status = next.as_ref(), "Budget status changed");
    Ok(budget)
}

#[utoipa::path(
    get,
    path = "/api/budgets",
    params(BudgetQuery),
    responses((status = 200, description = "Paginated budgets", body = BudgetPage)),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn list_budgets(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<BudgetQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("fiscal_year", query.fiscal_year)
        .eq("department", query.department.clone())
        .eq("category", query.category.clone())
        .eq("status", query.status.clone());

    let page = fetch_page::<Budget>(
        pool.get_ref(),
        "*",
        TABLE,
        &filter,
        "fiscal_year DESC, department ASC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/budgets",
    request_body = CreateBudget,
    responses(
        (status = 201, description = "Budget created in draft", body = Budget),
        (status = 422, description = "Validation error")
    ),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn create_budget(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateBudget>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    payload.validate()?;

    let result = sqlx::query(
        r#"
        INSERT INTO budgets (fiscal_year, department, category, description, allocated_amount, utilized_amount, status)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(payload.fiscal_year)
    .bind(&payload.department)
    .bind(payload.category.as_ref())
    .bind(&payload.description)
    .bind(round2(payload.allocated_amount))
    .bind(BudgetStatus::Draft.as_ref())
    .execute(pool.get_ref())
    .await?;
    let id = result.last_insert_id();

    let budget: Budget = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    info!(budget_id = id, fiscal_year = budget.fiscal_year, department = %budget.department, "Budget created");
    Ok(response::created("Budget created successfully.", budget))
}

#[utoipa::path(
    get,
    path = "/api/budgets/{id}",
    params(("id", Path, description = "Budget ID")),
    responses(
        (status = 200, description = "Budget", body = Budget),
        (status = 404, description = "Budget not found", body = MessageResponse)
    ),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn get_budget(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let budget: Budget = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(budget))
}

#[utoipa::path(
    put,
    path = "/api/budgets/{id}",
    params(("id", Path, description = "Budget ID")),
    request_body = UpdateBudget,
    responses(
        (status = 200, description = "Budget updated", body = Budget),
        (status = 422, description = "Budget is no longer a draft", body = MessageResponse)
    ),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn update_budget(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateBudget>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Budget = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    BudgetStatus::parse(&current.status)?.ensure_one_of(&[BudgetStatus::Draft], "update")?;

    update_in(&mut tx, TABLE, UPDATABLE, id, &*payload).await?;
    let budget: Budget = find_by_id(&mut *tx, TABLE, id, RESOURCE).await?;
    tx.commit().await?;

    Ok(response::ok_with("Budget updated successfully.", budget))
}

#[utoipa::path(
    delete,
    path = "/api/budgets/{id}",
    params(("id", Path, description = "Budget ID")),
    responses(
        (status = 200, description = "Budget deleted", body = MessageResponse),
        (status = 409, description = "Budget is referenced by other records", body = MessageResponse),
        (status = 422, description = "Budget is no longer a draft", body = MessageResponse)
    ),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn delete_budget(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Budget = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    BudgetStatus::parse(&current.status)?.ensure_one_of(&[BudgetStatus::Draft], "delete")?;

    sqlx::query("DELETE FROM budgets WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(budget_id = id, user_id = auth.user_id, "Budget deleted");
    Ok(response::message("Budget deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/budgets/{id}/approve",
    params(("id", Path, description = "Budget ID")),
    responses(
        (status = 200, description = "Budget approved", body = Budget),
        (status = 403, description = "Admin only", body = MessageResponse),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn approve_budget(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let budget = apply(
        pool.get_ref(),
        path.into_inner(),
        BudgetAction::Approve,
        &[("approved_by", SqlValue::from(auth.user_id)), ("approved_at", SqlValue::now())],
    )
    .await?;
    Ok(response::ok_with("Budget approved successfully.", budget))
}

#[utoipa::path(
    post,
    path = "/api/budgets/{id}/activate",
    params(("id", Path, description = "Budget ID")),
    responses(
        (status = 200, description = "Budget active and chargeable", body = Budget),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn activate_budget(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    let budget = apply(pool.get_ref(), path.into_inner(), BudgetAction::Activate, &[]).await?;
    Ok(response::ok_with("Budget activated successfully.", budget))
}

#[utoipa::path(
    post,
    path = "/api/budgets/{id}/close",
    params(("id", Path, description = "Budget ID")),
    responses(
        (status = 200, description = "Budget closed", body = Budget),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn close_budget(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    let budget = apply(pool.get_ref(), path.into_inner(), BudgetAction::Close, &[]).await?;
    Ok(response::ok_with("Budget closed successfully.", budget))
}

#[utoipa::path(
    get,
    path = "/api/budgets/{id}/utilization",
    params(("id", Path, description = "Budget ID")),
    responses(
        (status = 200, description = "Allocated, utilized and remaining amounts", body = BudgetUtilization),
        (status = 404, description = "Budget not found", body = MessageResponse)
    ),
    tag = "Budgets",
    security(("bearer_auth" = []))
)]
pub async fn budget_utilization(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let budget: Budget = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(HttpResponse::Ok().json(budget.utilization()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_allocation_is_rejected() {
        let payload = CreateBudget {
            fiscal_year: 2026,
            department: "Engineering".to_string(),
            category: BudgetCategory::Mooe,
            description: None,
            allocated_amount: 0.0,
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn utilized_amount_is_not_updatable() {
        assert!(!UPDATABLE.contains(&"utilized_amount"));
        assert!(!UPDATABLE.contains(&"status"));
    }

    #[test]
    fn category_serializes_as_column_value() {
        let payload: UpdateBudget =
            serde_json::from_value(json!({ "category": "capital_outlay" })).unwrap();
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!({ "category": "capital_outlay" }));
    }
}
