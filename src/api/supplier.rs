use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::auth::{AuthUser, SUPPLY_STAFF},
    error::{ApiError, ApiResult},
    model::supplier::{Supplier, SupplierStatistics},
    utils::{
        db_utils::{Filter, count_by, delete_by_id, fetch_page, find_by_id, update_from},
        pagination::{Pagination, SupplierPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "suppliers";
const RESOURCE: &str = "Supplier";
const UPDATABLE: &[&str] = &[
    "name",
    "contact_person",
    "email",
    "phone",
    "address",
    "tin",
    "category",
    "is_active",
];

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSupplier {
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Acme Office Supplies")]
    pub name: String,
    #[validate(length(max = 255))]
    pub contact_person: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 50))]
    #[schema(example = "123-456-789-000")]
    pub tin: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateSupplier {
    #[validate(length(min = 1, max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[validate(length(max = 255))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    #[validate(email)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[validate(length(max = 50))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tin: Option<String>,
    #[validate(length(max = 100))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplierQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    /// Matches name, contact person, email or TIN
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplierSearch {
    pub q: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

const SEARCH_COLUMNS: &[&str] = &["name", "contact_person", "email", "tin"];

#[utoipa::path(
    get,
    path = "/api/suppliers",
    params(SupplierQuery),
    responses((status = 200, description = "Paginated suppliers", body = SupplierPage)),
    tag = "Suppliers",
    security(("bearer_auth" = []))
)]
pub async fn list_suppliers(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SupplierQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("category", query.category.clone())
        .eq("is_active", query.is_active)
        .like_any(SEARCH_COLUMNS, query.search.as_deref());

    let page = fetch_page::<Supplier>(
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
    path = "/api/suppliers/active",
    params(SupplierQuery),
    responses((status = 200, description = "Active suppliers", body = SupplierPage)),
    tag = "Suppliers",
    security(("bearer_auth" = []))
)]
pub async fn active_suppliers(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SupplierQuery>,
) -> ApiResult<HttpResponse> {
    let filter = Filter::new()
        .eq("is_active", Some(true))
        .eq("category", query.category.clone());

    let page = fetch_page::<Supplier>(
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
    path = "/api/suppliers/search",
    params(SupplierSearch),
    responses(
        (status = 200, description = "Matching suppliers", body = SupplierPage),
        (status = 422, description = "Missing search term")
    ),
    tag = "Suppliers",
    security(("bearer_auth" = []))
)]
pub async fn search_suppliers(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SupplierSearch>,
) -> ApiResult<HttpResponse> {
    let term = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::invalid("q", "The q field is required."))?;

    let filter = Filter::new().like_any(SEARCH_COLUMNS, Some(term));
    let page = fetch_page::<Supplier>(
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
    path = "/api/suppliers/statistics",
    responses((status = 200, description = "Supplier counts", body = SupplierStatistics)),
    tag = "Suppliers",
    security(("bearer_auth" = []))
)]
pub async fn supplier_statistics(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    let (total, active): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), CAST(COALESCE(SUM(is_active), 0) AS SIGNED) FROM suppliers",
    )
    .fetch_one(pool.get_ref())
    .await?;

    let by_category = count_by(pool.get_ref(), TABLE, "category").await?;

    Ok(HttpResponse::Ok().json(SupplierStatistics {
        total,
        active,
        inactive: total - active,
        by_category,
    }))
}

#[utoipa::path(
    post,
    path = "/api/suppliers",
    request_body = CreateSupplier,
    responses(
        (status = 201, description = "Supplier created", body = Supplier),
        (status = 409, description = "Name already used"),
        (status = 422, description = "Validation error")
    ),
    tag = "Suppliers",
    security(("bearer_auth" = []))
)]
pub async fn create_supplier(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSupplier>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;

    let result = sqlx::query(
        r#"
        INSERT INTO suppliers
            (name, contact_person, email, phone, address, tin, category, is_active)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.contact_person)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.address)
    .bind(&payload.tin)
    .bind(&payload.category)
    .bind(payload.is_active.unwrap_or(true))
    .execute(pool.get_ref())
    .await?;

    let supplier: Supplier = find_by_id(pool.get_ref(), TABLE, result.last_insert_id(), RESOURCE).await?;
    info!(supplier_id = supplier.id, user_id = auth.user_id, "Supplier created");

    Ok(response::created("Supplier created successfully.", supplier))
}

#[utoipa::path(
    get,
    path = "/api/suppliers/{id}",
    params(("id", Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier", body = Supplier),
        (status = 404, description = "Supplier not found", body = MessageResponse)
    ),
    tag = "Suppliers",
    security(("bearer_auth" = []))
)]
pub async fn get_supplier(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let supplier: Supplier = find_by_id(pool.get_ref(), TABLE, path.into_inner(), RESOURCE).await?;
    Ok(response::data(supplier))
}

#[utoipa::path(
    put,
    path = "/api/suppliers/{id}",
    params(("id", Path, description = "Supplier ID")),
    request_body = UpdateSupplier,
    responses(
        (status = 200, description = "Supplier updated", body = Supplier),
        (status = 404, description = "Supplier not found", body = MessageResponse)
    ),
    tag = "Suppliers",
    security(("bearer_auth" = []))
)]
pub async fn update_supplier(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateSupplier>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    payload.validate()?;
    let id = path.into_inner();

    find_by_id::<Supplier, _>(pool.get_ref(), TABLE, id, RESOURCE).await?;
    update_from(pool.get_ref(), TABLE, UPDATABLE, id, &payload.into_inner()).await?;

    let supplier: Supplier = find_by_id(pool.get_ref(), TABLE, id, RESOURCE).await?;
    Ok(response::ok_with("Supplier updated successfully.", supplier))
}

#[utoipa::path(
    delete,
    path = "/api/suppliers/{id}",
    params(("id", Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier deleted", body = MessageResponse),
        (status = 404, description = "Supplier not found", body = MessageResponse),
        (status = 409, description = "Supplier is referenced by quotations or purchase orders", body = MessageResponse)
    ),
    tag = "Suppliers",
    security(("bearer_auth" = []))
)]
pub async fn delete_supplier(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_any(SUPPLY_STAFF)?;
    let id = path.into_inner();

    find_by_id::<Supplier, _>(pool.get_ref(), TABLE, id, RESOURCE).await?;
    delete_by_id(pool.get_ref(), TABLE, id).await?;

    info!(supplier_id = id, user_id = auth.user_id, "Supplier deleted");
    Ok(response::message("Supplier deleted successfully."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_and_bad_email_are_reported_together() {
        let payload = CreateSupplier {
            name: String::new(),
            contact_person: None,
            email: Some("not-an-email".to_string()),
            phone: None,
            address: None,
            tin: None,
            category: None,
            is_active: None,
        };
        let err: ApiError = payload.validate().unwrap_err().into();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("email"));
    }

    #[test]
    fn partial_update_keeps_only_given_columns() {
        let payload: UpdateSupplier = serde_json::from_str(r#"{"is_active":false}"#).unwrap();
        assert!(payload.validate().is_ok());
        assert_eq!(serde_json::to_value(&payload).unwrap(), serde_json::json!({ "is_active": false }));
    }
}
