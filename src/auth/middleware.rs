use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use tracing::debug;

use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::ApiError;
use crate::model::role::Role;
use crate::models::TokenType;
use crate::utils::token_denylist;

/// Extracts the raw token from `Authorization: Bearer <token>`.
pub fn bearer_token(req: &actix_web::HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(req: &ServiceRequest) -> Option<AuthUser> {
    let config = req.app_data::<Data<Config>>()?;
    let token = bearer_token(req.request())?;

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "Rejected bearer token");
            return None;
        }
    };

    if claims.token_type != TokenType::Access {
        debug!("Refresh token presented as access token");
        return None;
    }

    if token_denylist::is_revoked(&claims.jti).await {
        debug!(jti = %claims.jti, "Revoked token presented");
        return None;
    }

    let role = Role::from_id(claims.role)?;

    Some(AuthUser {
        user_id: claims.user_id,
        email: claims.sub,
        role,
        employee_id: claims.employee_id,
        jti: claims.jti,
        exp: claims.exp,
    })
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    match authenticate(&req).await {
        Some(auth_user) => {
            req.extensions_mut().insert(auth_user);
            next.call(req).await
        }
        None => {
            let resp = ApiError::Unauthenticated.error_response();
            Ok(req.into_response(resp.map_into_boxed_body()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Subject, generate_access_token, generate_refresh_token};
    use actix_web::middleware::from_fn;
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};

    const SECRET: &str = "middleware-test-secret";

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:8080".to_string()),
            "DATABASE_URL" => Some("mysql://localhost/adminsuite".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn subject() -> Subject {
        Subject {
            user_id: 3,
            email: "supply@agency.gov".to_string(),
            role: Role::Supply.id(),
            employee_id: None,
        }
    }

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.email)
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new().app_data(Data::new(config())).service(
                    web::scope("/api")
                        .wrap(from_fn(auth_middleware))
                        .route("/whoami", web::get().to(whoami)),
                ),
            )
            .await
        };
    }

    async fn assert_unauthenticated(resp: ServiceResponse) {
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, serde_json::json!({ "message": "Unauthenticated." }));
    }

    #[actix_web::test]
    async fn missing_token_is_unauthenticated() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/whoami").to_request();
        assert_unauthenticated(test::call_service(&app, req).await).await;
    }

    #[actix_web::test]
    async fn garbage_token_is_unauthenticated() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/whoami")
            .insert_header(("Authorization", "Bearer not.a.jwt"))
            .to_request();
        assert_unauthenticated(test::call_service(&app, req).await).await;
    }

    #[actix_web::test]
    async fn refresh_token_is_not_an_access_token() {
        let app = app!();
        let (token, _) = generate_refresh_token(&subject(), SECRET, 600).unwrap();
        let req = test::TestRequest::get()
            .uri("/api/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        assert_unauthenticated(test::call_service(&app, req).await).await;
    }

    #[actix_web::test]
    async fn valid_token_reaches_handler() {
        let app = app!();
        let (token, _) = generate_access_token(&subject(), SECRET, 600).unwrap();
        let req = test::TestRequest::get()
            .uri("/api/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "supply@agency.gov");
    }

    #[actix_web::test]
    async fn revoked_token_is_unauthenticated() {
        let app = app!();
        let (token, claims) = generate_access_token(&subject(), SECRET, 600).unwrap();
        token_denylist::revoke(&claims.jti, claims.exp as i64).await;
        let req = test::TestRequest::get()
            .uri("/api/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        assert_unauthenticated(test::call_service(&app, req).await).await;
    }
}
