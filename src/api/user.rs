use actix_web::{HttpResponse, web};
use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::{auth::AuthUser, handlers::USER_COLUMNS, password::hash_password},
    config::BootstrapAdmin,
    error::{ApiError, ApiResult},
    model::{
        role::Role,
        user::{User, UserResponse},
    },
    utils::{
        db_utils::{Filter, fetch_page, update_in},
        email_cache, email_filter,
        pagination::{Paginated, Pagination, UserPage},
        response::{self, MessageResponse},
    },
};

const TABLE: &str = "users";
const UPDATABLE: &[&str] = &["role_id", "employee_id", "is_active"];

/// Distinguishes an absent key (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUser {
    #[schema(example = "hr")]
    pub role: Option<Role>,
    /// Employee record to link, `null` to unlink.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<u64>, nullable, example = 12)]
    pub employee_id: Option<Option<u64>>,
    pub is_active: Option<bool>,
}

/// Column-level view of an `UpdateUser`, fed to the partial UPDATE.
#[derive(Debug, Serialize)]
struct UserChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    role_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    employee_id: Option<Option<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_active: Option<bool>,
}

impl From<&UpdateUser> for UserChanges {
    fn from(payload: &UpdateUser) -> Self {
        Self {
            role_id: payload.role.map(Role::id),
            employee_id: payload.employee_id,
            is_active: payload.is_active,
        }
    }
}

/// Admins may relink themselves but never demote or deactivate their own account.
fn check_own_account(auth: &AuthUser, target_id: u64, payload: &UpdateUser) -> ApiResult<()> {
    if auth.user_id != target_id {
        return Ok(());
    }
    if payload.role.is_some_and(|r| r != Role::Admin) {
        return Err(ApiError::invalid("role", "You cannot change your own role."));
    }
    if payload.is_active == Some(false) {
        return Err(ApiError::invalid("is_active", "You cannot deactivate your own account."));
    }
    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// Matches name or email
    pub search: Option<String>,
}

async fn find_user(pool: &MySqlPool, id: u64) -> ApiResult<User> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated user accounts", body = UserPage),
        (status = 403, description = "Not an administrator", body = MessageResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;

    let filter = Filter::new()
        .eq("role_id", query.role.map(|r| u64::from(r.id())))
        .eq("is_active", query.is_active)
        .like_any(&["name", "email"], query.search.as_deref());

    let page = fetch_page::<User>(
        pool.get_ref(),
        USER_COLUMNS,
        TABLE,
        &filter,
        "name ASC",
        Pagination::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(Paginated {
        data: page.data.iter().map(UserResponse::from).collect(),
        page: page.page,
        per_page: page.per_page,
        total: page.total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id", Path, description = "User ID")),
    responses(
        (status = 200, description = "User account", body = UserResponse),
        (status = 404, description = "User not found", body = MessageResponse)
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let user = find_user(pool.get_ref(), path.into_inner()).await?;
    Ok(response::data(UserResponse::from(&user)))
}

/// Changes role, employee link or active flag. Takes effect on the user's next token refresh.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id", Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 403, description = "Not an administrator", body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse),
        (status = 422, description = "Unknown or already linked employee")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUser>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();
    check_own_account(&auth, id, &payload)?;

    let mut tx = pool.begin().await?;

    let sql = format!("SELECT {} FROM users WHERE id = ? FOR UPDATE", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    if let Some(Some(employee_id)) = payload.employee_id {
        let exists: Option<u64> = sqlx::query_scalar("SELECT id FROM employees WHERE id = ?")
            .bind(employee_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ApiError::invalid("employee_id", "The selected employee id is invalid."));
        }

        let linked: Option<u64> =
            sqlx::query_scalar("SELECT id FROM users WHERE employee_id = ? AND id <> ? FOR UPDATE")
                .bind(employee_id)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if linked.is_some() {
            return Err(ApiError::invalid(
                "employee_id",
                "The employee is already linked to another user.",
            ));
        }
    }

    update_in(&mut tx, TABLE, UPDATABLE, id, &UserChanges::from(&*payload)).await?;
    tx.commit().await?;

    let user = find_user(pool.get_ref(), id).await?;
    info!(
        user_id = user.id,
        role_id = user.role_id,
        employee_id = ?user.employee_id,
        by = auth.user_id,
        "User account updated"
    );

    Ok(response::ok_with("User updated successfully.", UserResponse::from(&user)))
}

/// Creates the configured administrator, or promotes the account already using that email.
pub async fn ensure_bootstrap_admin(pool: &MySqlPool, admin: &BootstrapAdmin) -> anyhow::Result<()> {
    let existing: Option<(u64, u8, bool)> =
        sqlx::query_as("SELECT id, role_id, is_active FROM users WHERE email = ?")
            .bind(&admin.email)
            .fetch_optional(pool)
            .await
            .context("failed to look up bootstrap admin")?;

    match existing {
        Some((id, role_id, true)) if role_id == Role::Admin.id() => {
            info!(user_id = id, "Bootstrap admin present");
        }
        Some((id, _, _)) => {
            sqlx::query("UPDATE users SET role_id = ?, is_active = TRUE WHERE id = ?")
                .bind(Role::Admin.id())
                .bind(id)
                .execute(pool)
                .await
                .context("failed to promote bootstrap admin")?;
            warn!(user_id = id, "Existing account promoted to bootstrap admin");
        }
        None => {
            let hashed = hash_password(&admin.password)?;
            let result = sqlx::query(
                "INSERT INTO users (name, email, password, role_id) VALUES (?, ?, ?, ?)",
            )
            .bind(&admin.name)
            .bind(&admin.email)
            .bind(&hashed)
            .bind(Role::Admin.id())
            .execute(pool)
            .await
            .context("failed to create bootstrap admin")?;
            info!(user_id = result.last_insert_id(), "Bootstrap admin created");
        }
    }

    email_filter::insert(&admin.email);
    email_cache::mark_taken(&admin.email).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(user_id: u64) -> AuthUser {
        AuthUser {
            user_id,
            email: "admin@agency.gov".to_string(),
            role: Role::Admin,
            employee_id: None,
            jti: "jti".to_string(),
            exp: 0,
        }
    }

    fn parse(json: &str) -> UpdateUser {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn absent_and_null_employee_ids_differ() {
        assert_eq!(parse("{}").employee_id, None);
        assert_eq!(parse(r#"{"employee_id":null}"#).employee_id, Some(None));
        assert_eq!(parse(r#"{"employee_id":12}"#).employee_id, Some(Some(12)));
    }

    #[test]
    fn changes_carry_only_the_fields_sent() {
        let payload = parse(r#"{"role":"accounting","employee_id":null}"#);
        let changes = serde_json::to_value(UserChanges::from(&payload)).unwrap();
        assert_eq!(changes, serde_json::json!({ "role_id": 5, "employee_id": null }));

        let payload = parse(r#"{"is_active":false}"#);
        let changes = serde_json::to_value(UserChanges::from(&payload)).unwrap();
        assert_eq!(changes, serde_json::json!({ "is_active": false }));
    }

    #[test]
    fn unknown_roles_are_rejected() {
        assert!(serde_json::from_str::<UpdateUser>(r#"{"role":"root"}"#).is_err());
        assert_eq!(parse(r#"{"role":"supply"}"#).role, Some(Role::Supply));
    }

    #[test]
    fn admins_cannot_lock_themselves_out() {
        let me = admin(1);

        let demote = parse(r#"{"role":"employee"}"#);
        assert!(check_own_account(&me, 1, &demote).is_err());
        assert!(check_own_account(&me, 2, &demote).is_ok());

        let deactivate = parse(r#"{"is_active":false}"#);
        assert!(check_own_account(&me, 1, &deactivate).is_err());

        let relink = parse(r#"{"employee_id":3,"role":"admin"}"#);
        assert!(check_own_account(&me, 1, &relink).is_ok());
    }
}
