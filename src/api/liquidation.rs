use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, FINANCE_STAFF},
    error::{ApiError, ApiResult},
    model::{
        cash_advance::{CashAdvance, CashAdvanceAction, CashAdvanceStatus},
        liquidation::{Liquidation, LiquidationAction, LiquidationDetail, LiquidationItem, LiquidationStatus, Settlement, settle},
        workflow::Workflow,
    },
    models::RemarksRequest,
    utils::{
        amount::round2,
        db_utils::{Filter, SqlValue, fetch_page, find_by_id, lock_by_id, set_status},
        doc_number::{DocumentSeries, next_number},
        pagination::{LiquidationPage, Pagination},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "liquidations";
const RESOURCE: &str = "Liquidation";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ExpenseLine {
    #[validate(length(min = 1))]
    #[schema(example = "Bus fare, Manila to Baguio")]
    pub description: String,
    #[validate(range(exclusive_min = 0.0))]
    #[schema(example = 780.0)]
    pub amount: f64,
    #[validate(length(max = 50))]
    pub receipt_number: Option<String>,
    pub expense_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLiquidation {
    pub cash_advance_id: u64,
    pub remarks: Option<String>,
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    pub items: Vec<ExpenseLine>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateLiquidation {
    pub remarks: Option<String>,
    /// Replaces every line and recomputes the totals.
    #[validate(length(min = 1, message = "The items field must have at least 1 item."), nested)]
    pub items: Option<Vec<ExpenseLine>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LiquidationQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub cash_advance_id: Option<u64>,
    pub status: Option<String>,
}

async fn load_detail(conn: &mut MySqlConnection, id: u64) -> ApiResult<LiquidationDetail> {
    let liquidation: Liquidation = find_by_id(&mut *conn, TABLE, id, RESOURCE).await?;
    let items = sqlx::query_as::<_, LiquidationItem>(
        "SELECT * FROM liquidation_items WHERE liquidation_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(LiquidationDetail { liquidation, items })
}

fn settlement_of(advance: &CashAdvance, items: &[ExpenseLine]) -> Settlement {
    settle(advance.amount, items.iter().map(|i| round2(i.amount)))
}

async fn write_items(conn: &mut MySqlConnection, liquidation_id: u64, items: &[ExpenseLine]) -> ApiResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO liquidation_items (liquidation_id, description, amount, receipt_number, expense_date)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(liquidation_id)
        .bind(&item.description)
        .bind(round2(item.amount))
        .bind(&item.receipt_number)
        .bind(item.expense_date)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn store_settlement(conn: &mut MySqlConnection, id: u64, settlement: Settlement) -> ApiResult<()> {
    sqlx::query(
        "UPDATE liquidations SET total_expenses = ?, refund_amount = ?, reimbursement_amount = ? WHERE id = ?",
    )
    .bind(settlement.total_expenses)
    .bind(settlement.refund_amount)
    .bind(settlement.reimbursement_amount)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Only a released advance without a live liquidation can be liquidated.
async fn liquidatable(conn: &mut MySqlConnection, cash_advance_id: u64) -> ApiResult<CashAdvance> {
    let advance = sqlx::query_as::<_, CashAdvance>("SELECT * FROM cash_advances WHERE id = ? FOR UPDATE")
        .bind(cash_advance_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::invalid("cash_advance_id", "The selected cash advance id is invalid."))?;

    if CashAdvanceStatus::parse(&advance.status)? != CashAdvanceStatus::Released {
        return Err(ApiError::invalid(
            "cash_advance_id",
            "Only released cash advances can be liquidated.",
        ));
    }

    let live: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM liquidations WHERE cash_advance_id = ? AND status <> ?",
    )
    .bind(cash_advance_id)
    .bind(LiquidationStatus::Rejected.as_ref())
    .fetch_one(&mut *conn)
    .await?;
    if live > 0 {
        return Err(ApiError::invalid(
            "cash_advance_id",
            "The cash advance already has a liquidation.",
        ));
    }

    Ok(advance)
}

/// Locks a pending liquidation together with its advance for editing.
async fn editable(
    auth: &AuthUser,
    conn: &mut MySqlConnection,
    id: u64,
    verb: &str,
) -> ApiResult<(Liquidation, CashAdvance)> {
    let current: Liquidation = lock_by_id(&mut *conn, TABLE, id, RESOURCE).await?;
    let advance: CashAdvance = find_by_id(&mut *conn, "cash_advances", current.cash_advance_id, "Cash advance").await?;
    auth.require_self_or(advance.employee_id, FINANCE_STAFF)?;
    LiquidationStatus::parse(&current.status)?.ensure_one_of(&[LiquidationStatus::Pending], verb)?;
    Ok((current, advance))
}

/// Finance staff see every liquidation; others only those against their own cash advances.
fn visible_to(auth: &AuthUser, filter: Filter) -> Filter {
    if auth.has_any(FINANCE_STAFF) {
        return filter;
    }
    filter.raw(
        "cash_advance_id IN (SELECT id FROM cash_advances WHERE employee_id = ?)",
        vec![SqlValue::U64(auth.employee_id.unwrap_or(0))],
    )
}

#[utoipa::path(
    get,
    path = "/api/liquidations",
    params(LiquidationQuery),
    responses((status = 200, description = "Paginated liquidations", body = LiquidationPage)),
    tag = "Liquidations",
    security(("bearer_auth" = []))
)]
pub async fn list_liquidations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LiquidationQuery>,
) -> ApiResult<HttpResponse> {
    let filter = visible_to(
        &auth,
        Filter::new()
            .eq("cash_advance_id", query.cash_advance_id)
            .eq("status", query.status.clone()),
    );

    let page = fetch_page::<Liquidation>(
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
    path = "/api/liquidations",
    request_body = CreateLiquidation,
    responses(
        (status = 201, description = "Liquidation filed with computed refund or reimbursement", body = LiquidationDetail),
        (status = 422, description = "Cash advance not released or already liquidated")
    ),
    tag = "Liquidations",
    security(("bearer_auth" = []))
)]
pub async fn create_liquidation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLiquidation>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let advance = liquidatable(&mut tx, payload.cash_advance_id).await?;
    auth.require_self_or(advance.employee_id, FINANCE_STAFF)?;

    let settlement = settlement_of(&advance, &payload.items);
    let number = next_number(&mut tx, DocumentSeries::Liquidation, Utc::now().date_naive()).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO liquidations
            (liquidation_number, cash_advance_id, total_expenses, refund_amount, reimbursement_amount, status, remarks)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&number)
    .bind(advance.id)
    .bind(settlement.total_expenses)
    .bind(settlement.refund_amount)
    .bind(settlement.reimbursement_amount)
    .bind(LiquidationStatus::Pending.as_ref())
    .bind(&payload.remarks)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    write_items(&mut tx, id, &payload.items).await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(
        liquidation_id = id,
        liquidation_number = %number,
        cash_advance_id = advance.id,
        total_expenses = settlement.total_expenses,
        "Liquidation filed"
    );
    Ok(response::created("Liquidation created successfully.", detail))
}

#[utoipa::path(
    get,
    path = "/api/liquidations/{id}",
    params(("id", Path, description = "Liquidation ID")),
    responses(
        (status = 200, description = "Liquidation with expense lines", body = LiquidationDetail),
        (status = 403, description = "Liquidation of another employee's cash advance", body = MessageResponse),
        (status = 404, description = "Liquidation not found", body = MessageResponse)
    ),
    tag = "Liquidations",
    security(("bearer_auth" = []))
)]
pub async fn get_liquidation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let mut conn = pool.acquire().await?;
    let detail = load_detail(&mut conn, path.into_inner()).await?;
    let advance: CashAdvance =
        find_by_id(&mut *conn, "cash_advances", detail.liquidation.cash_advance_id, "Cash advance").await?;
    auth.require_self_or(advance.employee_id, FINANCE_STAFF)?;
    Ok(response::data(detail))
}

#[utoipa::path(
    put,
    path = "/api/liquidations/{id}",
    params(("id", Path, description = "Liquidation ID")),
    request_body = UpdateLiquidation,
    responses(
        (status = 200, description = "Liquidation updated", body = LiquidationDetail),
        (status = 422, description = "Liquidation is no longer pending", body = MessageResponse)
    ),
    tag = "Liquidations",
    security(("bearer_auth" = []))
)]
pub async fn update_liquidation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateLiquidation>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;
    let id = path.into_inner();
    if payload.remarks.is_none() && payload.items.is_none() {
        return Err(ApiError::unprocessable("No updatable fields were provided."));
    }

    let mut tx = pool.begin().await?;
    let (_, advance) = editable(&auth, &mut tx, id, "update").await?;

    if let Some(remarks) = &payload.remarks {
        sqlx::query("UPDATE liquidations SET remarks = ? WHERE id = ?")
            .bind(remarks)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    if let Some(items) = &payload.items {
        sqlx::query("DELETE FROM liquidation_items WHERE liquidation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        write_items(&mut tx, id, items).await?;
        store_settlement(&mut tx, id, settlement_of(&advance, items)).await?;
    }

    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    Ok(response::ok_with("Liquidation updated successfully.", detail))
}

#[utoipa::path(
    delete,
    path = "/api/liquidations/{id}",
    params(("id", Path, description = "Liquidation ID")),
    responses(
        (status = 200, description = "Liquidation deleted", body = MessageResponse),
        (status = 422, description = "Liquidation is no longer pending", body = MessageResponse)
    ),
    tag = "Liquidations",
    security(("bearer_auth" = []))
)]
pub async fn delete_liquidation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    editable(&auth, &mut tx, id, "delete").await?;
    sqlx::query("DELETE FROM liquidations WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(liquidation_id = id, user_id = auth.user_id, "Liquidation deleted");
    Ok(response::message("Liquidation deleted successfully."))
}

#[utoipa::path(
    post,
    path = "/api/liquidations/{id}/approve",
    params(("id", Path, description = "Liquidation ID")),
    responses(
        (status = 200, description = "Liquidation approved, cash advance liquidated", body = LiquidationDetail),
        (status = 403, description = "Admin only", body = MessageResponse),
        (status = 422, description = "Illegal transition", body = MessageResponse)
    ),
    tag = "Liquidations",
    security(("bearer_auth" = []))
)]
pub async fn approve_liquidation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Liquidation = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = LiquidationStatus::parse(&current.status)?.transition(LiquidationAction::Approve)?;

    let advance: CashAdvance =
        lock_by_id(&mut tx, "cash_advances", current.cash_advance_id, "Cash advance").await?;
    let advance_next = CashAdvanceStatus::parse(&advance.status)?.transition(CashAdvanceAction::Liquidate)?;
    set_status(&mut tx, "cash_advances", advance.id, advance_next.as_ref(), &[]).await?;

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
        liquidation_id = id,
        cash_advance_id = advance.id,
        refund_amount = current.refund_amount,
        reimbursement_amount = current.reimbursement_amount,
        "Liquidation approved"
    );
    Ok(response::ok_with("Liquidation approved successfully.", detail))
}

#[utoipa::path(
    post,
    path = "/api/liquidations/{id}/reject",
    params(("id", Path, description = "Liquidation ID")),
    request_body = RemarksRequest,
    responses(
        (status = 200, description = "Liquidation rejected", body = LiquidationDetail),
        (status = 422, description = "Missing remarks or illegal transition", body = MessageResponse)
    ),
    tag = "Liquidations",
    security(("bearer_auth" = []))
)]
pub async fn reject_liquidation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<RemarksRequest>,
) -> ApiResult<HttpResponse> {
    auth.require_any(FINANCE_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current: Liquidation = lock_by_id(&mut tx, TABLE, id, RESOURCE).await?;
    let next = LiquidationStatus::parse(&current.status)?.transition(LiquidationAction::Reject)?;

    set_status(
        &mut tx,
        TABLE,
        id,
        next.as_ref(),
        &[("remarks", SqlValue::from(payload.remarks.as_str()))],
    )
    .await?;
    let detail = load_detail(&mut tx, id).await?;
    tx.commit().await?;

    info!(liquidation_id = id, user_id = auth.user_id, "Liquidation rejected");
    Ok(response::ok_with("Liquidation rejected successfully.", detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;
    use chrono::TimeZone;

    fn advance(amount: f64) -> CashAdvance {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        CashAdvance {
            id: 3,
            ca_number: "CA-2026-0003".into(),
            employee_id: 12,
            purpose: "Field audit".into(),
            amount,
            budget_id: None,
            date_needed: None,
            status: "released".into(),
            approved_by: Some(1),
            approved_at: Some(at),
            released_at: Some(at),
            remarks: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn line(amount: f64) -> ExpenseLine {
        ExpenseLine {
            description: "Meals".into(),
            amount,
            receipt_number: None,
            expense_date: None,
        }
    }

    #[test]
    fn underspend_is_refunded() {
        let s = settlement_of(&advance(5000.0), &[line(1200.5), line(2000.0)]);
        assert_eq!(s.total_expenses, 3200.5);
        assert_eq!(s.refund_amount, 1799.5);
        assert_eq!(s.reimbursement_amount, 0.0);
    }

    #[test]
    fn overspend_is_reimbursed() {
        let s = settlement_of(&advance(1000.0), &[line(750.0), line(400.0)]);
        assert_eq!(s.refund_amount, 0.0);
        assert_eq!(s.reimbursement_amount, 150.0);
    }

    #[test]
    fn empty_expense_list_fails_validation() {
        let payload = CreateLiquidation {
            cash_advance_id: 3,
            remarks: None,
            items: Vec::new(),
        };
        let err: ApiError = payload.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors["items"], vec!["The items field must have at least 1 item.".to_string()]);
    }

    fn caller(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 9,
            email: "caller@agency.gov".into(),
            role,
            employee_id,
            jti: "jti".into(),
            exp: 0,
        }
    }

    #[test]
    fn employees_list_only_their_own_liquidations() {
        let filter = visible_to(&caller(Role::Employee, Some(12)), Filter::new().eq("status", Some("pending")));
        assert_eq!(
            filter.where_clause(),
            " WHERE status = ? AND cash_advance_id IN (SELECT id FROM cash_advances WHERE employee_id = ?)"
        );
        assert_eq!(filter.values()[1], SqlValue::U64(12));

        let unlinked = visible_to(&caller(Role::Supply, None), Filter::new());
        assert_eq!(unlinked.values(), vec![SqlValue::U64(0)]);

        let finance = visible_to(&caller(Role::Accounting, None), Filter::new());
        assert_eq!(finance.where_clause(), "");
    }

    #[test]
    fn other_employees_cannot_open_a_liquidation() {
        let owner = advance(5000.0).employee_id;
        assert!(caller(Role::Employee, Some(owner)).require_self_or(owner, FINANCE_STAFF).is_ok());
        assert!(caller(Role::Employee, Some(owner + 1)).require_self_or(owner, FINANCE_STAFF).is_err());
        assert!(caller(Role::Accounting, None).require_self_or(owner, FINANCE_STAFF).is_ok());
    }
}
