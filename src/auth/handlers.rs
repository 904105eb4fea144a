use actix_web::{HttpRequest, HttpResponse, web};
use anyhow::Context;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, error, info, instrument};
use validator::Validate;

use crate::{
    auth::{
        auth::AuthUser,
        jwt::{Subject, generate_access_token, generate_refresh_token, verify_token},
        middleware::bearer_token,
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        role::Role,
        user::{User, UserResponse},
    },
    models::{AuthResponse, LoginRequest, RegisterRequest, TokenPairResponse, TokenType},
    utils::{email_cache, email_filter, response::MessageResponse, token_denylist},
};

pub(crate) const USER_COLUMNS: &str = "id, name, email, password, role_id, employee_id, is_active, created_at";

struct TokenPair {
    access_token: String,
    refresh_token: String,
}

/// Employee record with this email that no account is linked to yet.
async fn unclaimed_employee_by_email(conn: &mut MySqlConnection, email: &str) -> ApiResult<Option<u64>> {
    let id = sqlx::query_scalar::<_, u64>(
        r#"
        SELECT e.id FROM employees e
        WHERE e.email = ?
          AND NOT EXISTS (SELECT 1 FROM users u WHERE u.employee_id = e.id)
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(email)
    .fetch_optional(conn)
    .await?;
    Ok(id)
}

/// Issues an access/refresh pair and persists the refresh token's jti.
async fn issue_tokens(
    conn: &mut MySqlConnection,
    user: &User,
    config: &Config,
) -> ApiResult<TokenPair> {
    let subject = Subject {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role_id,
        employee_id: user.employee_id,
    };

    let (access_token, _) = generate_access_token(&subject, &config.jwt_secret, config.access_token_ttl)
        .context("failed to sign access token")?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(&subject, &config.jwt_secret, config.refresh_token_ttl)
            .context("failed to sign refresh token")?;

    debug!(user_id = user.id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user.id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(&mut *conn)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

async fn find_user_by_email(pool: &MySqlPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> ApiResult<bool> {
    let email = email.trim().to_lowercase();

    // Cuckoo filter: a miss means the email was never registered
    if !email_filter::might_exist(&email) {
        return Ok(true);
    }

    // Moka cache: known taken
    if email_cache::is_taken(&email).await {
        return Ok(false);
    }

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await?
        != 0;

    if exists {
        email_cache::mark_taken(&email).await;
    }

    Ok(!exists)
}

fn email_taken() -> ApiError {
    ApiError::invalid("email", "The email has already been taken.")
}

fn bad_credentials() -> ApiError {
    ApiError::invalid("email", "These credentials do not match our records.")
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 422, description = "Validation error", body = Object, example = json!({
            "message": "The email has already been taken.",
            "errors": { "email": ["The email has already been taken."] }
        }))
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(payload, pool, config), fields(email = %payload.email))]
pub async fn register(
    payload: web::Json<RegisterRequest>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    if !is_email_available(&email, pool.get_ref()).await? {
        info!("Registration refused: email taken");
        return Err(email_taken());
    }

    let hashed = hash_password(&payload.password)?;

    let mut tx = pool.begin().await?;

    let employee_id = unclaimed_employee_by_email(&mut tx, &email).await?;

    let result = sqlx::query(
        "INSERT INTO users (name, email, password, role_id, employee_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(&email)
    .bind(&hashed)
    .bind(Role::Employee.id())
    .bind(employee_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| match ApiError::from(e) {
        // lost a race with a concurrent registration
        ApiError::Conflict(_) => email_taken(),
        other => other,
    })?;

    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(result.last_insert_id())
        .fetch_one(&mut *tx)
        .await?;

    let tokens = issue_tokens(&mut tx, &user, &config).await?;
    tx.commit().await?;

    email_filter::insert(&email);
    email_cache::mark_taken(&email).await;

    info!(user_id = user.id, employee_id = ?user.employee_id, "User registered");

    Ok(HttpResponse::Created().json(AuthResponse {
        message: Some("User registered successfully.".to_string()),
        user: UserResponse::from(&user),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
    }))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 422, description = "Invalid credentials", body = Object, example = json!({
            "message": "These credentials do not match our records.",
            "errors": { "email": ["These credentials do not match our records."] }
        }))
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(payload, pool, config), fields(email = %payload.email))]
pub async fn login(
    payload: web::Json<LoginRequest>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();

    let user = match find_user_by_email(pool.get_ref(), &email).await? {
        Some(user) => user,
        None => {
            info!("Invalid credentials: user not found");
            return Err(bad_credentials());
        }
    };

    if !verify_password(&payload.password, &user.password)? {
        info!(user_id = user.id, "Invalid credentials: password mismatch");
        return Err(bad_credentials());
    }

    if !user.is_active {
        info!(user_id = user.id, "Login refused: account inactive");
        return Err(bad_credentials());
    }

    let mut conn = pool.acquire().await?;
    let tokens = issue_tokens(&mut conn, &user, &config).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(user.id)
        .execute(&mut *conn)
        .await
    {
        // not fatal for the login itself
        error!(error = %e, "Failed to update last_login_at");
    }

    email_cache::mark_taken(&email).await;
    info!(user_id = user.id, "Login successful");

    Ok(HttpResponse::Ok().json(AuthResponse {
        message: None,
        user: UserResponse::from(&user),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
    }))
}

/// Revoke the current access token and every refresh token of the user
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
#[instrument(name = "auth_logout", skip(auth, pool), fields(user_id = auth.user_id))]
pub async fn logout(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let mut tx = pool.begin().await?;

    sqlx::query("INSERT IGNORE INTO revoked_tokens (jti, expires_at) VALUES (?, FROM_UNIXTIME(?))")
        .bind(&auth.jti)
        .bind(auth.exp as i64)
        .execute(&mut *tx)
        .await?;

    let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ? AND revoked = 0")
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    token_denylist::revoke(&auth.jti, auth.exp as i64).await;
    info!(refresh_tokens_revoked = revoked, "Logged out");

    Ok(crate::utils::response::message("Logged out successfully."))
}

#[derive(sqlx::FromRow)]
struct RefreshRecord {
    id: u64,
    user_id: u64,
    revoked: bool,
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPairResponse),
        (status = 401, description = "Refresh token missing, unknown, revoked or expired")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
#[instrument(name = "auth_refresh", skip_all)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthenticated)?;

    let claims = verify_token(token, &config.jwt_secret).map_err(|e| {
        debug!(error = %e, "Rejected refresh token");
        ApiError::Unauthenticated
    })?;

    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthenticated);
    }

    let mut tx = pool.begin().await?;

    let record = sqlx::query_as::<_, RefreshRecord>(
        "SELECT id, user_id, revoked FROM refresh_tokens WHERE jti = ? FOR UPDATE",
    )
    .bind(&claims.jti)
    .fetch_optional(&mut *tx)
    .await?;

    let record = match record {
        Some(r) if !r.revoked => r,
        _ => {
            info!(jti = %claims.jti, "Unknown or revoked refresh token");
            return Err(ApiError::Unauthenticated);
        }
    };

    sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE id = ?")
        .bind(record.id)
        .execute(&mut *tx)
        .await?;

    // role or employee link may have changed since the token was issued
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(record.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .filter(|u| u.is_active)
        .ok_or(ApiError::Unauthenticated)?;

    let tokens = issue_tokens(&mut tx, &user, &config).await?;
    tx.commit().await?;

    info!(user_id = user.id, "Refresh token rotated");

    Ok(HttpResponse::Ok().json(TokenPairResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
    }))
}

/// Current user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Authenticated user", body = UserResponse),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    Ok(HttpResponse::Ok().json(json!({ "data": UserResponse::from(&user) })))
}
