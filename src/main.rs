use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::{self, Data};
use actix_web::{App, HttpResponse, HttpServer};
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::error::ApiError;
use crate::utils::email_cache;
use crate::utils::email_filter;
use crate::utils::token_denylist;
use serde_json::json;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Malformed JSON bodies become 422s with the usual `{ message, errors }` shape.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::invalid("body", err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::invalid("query", err.to_string()).into())
}

/// `/api/suppliers/abc` matches no resource, same as an unknown route.
fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, req| {
        warn!(path = %req.path(), error = %err, "Unparseable path segment");
        ApiError::NotFound("Not found.".to_string()).into()
    })
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "message": "Not found." }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(addr = %config.server_addr, prefix = %config.api_prefix, "AdminSuite starting");

    let pool = init_db(&config)
        .await
        .map_err(|e| std::io::Error::other(format!("database init failed: {e:#}")))?;

    if let Some(admin) = &config.bootstrap_admin {
        api::user::ensure_bootstrap_admin(&pool, admin)
            .await
            .map_err(|e| std::io::Error::other(format!("bootstrap admin failed: {e:#}")))?;
    }

    let limits = routes::RateLimits::from_config(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let pool_for_filter_warmup = pool.clone();
    let pool_for_cache_warmup = pool.clone();

    // revocations must be loaded before the first request is served
    if let Err(e) = token_denylist::warmup_denylist(&pool).await {
        warn!(error = ?e, "Failed to reload revoked tokens");
    }

    let server_addr = config.server_addr.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = email_filter::warmup_email_filter(&pool_for_filter_warmup, 500).await {
            warn!(error = ?e, "Failed to warm up email filter");
        }
    });

    actix_web::rt::spawn(async move {
        // Users registered in the last 30 days, 250 per batch
        if let Err(e) = email_cache::warmup_email_cache(&pool_for_cache_warmup, 30, 250).await {
            warn!(error = ?e, "Failed to warm up email cache");
        }
    });

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard so the UI's JS/CSS assets resolve
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(json_config())
            .app_data(query_config())
            .app_data(path_config())
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .configure(|cfg| routes::configure(cfg, &config, &limits))
            .default_service(web::to(not_found))
    })
    .bind(server_addr)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        amount: f64,
    }

    async fn echo(_body: web::Json<Payload>) -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn malformed_json_is_unprocessable() {
        let app = test::init_service(
            App::new()
                .app_data(json_config())
                .route("/echo", web::post().to(echo)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/echo")
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"amount":"lots"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["message"].is_string());
        assert!(body["errors"]["body"][0].is_string());
    }

    async fn by_id(id: web::Path<u64>) -> HttpResponse {
        HttpResponse::Ok().json(json!({ "id": id.into_inner() }))
    }

    #[derive(Deserialize)]
    struct Listing {
        #[allow(dead_code)]
        page: Option<u64>,
    }

    async fn listing(_q: web::Query<Listing>) -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn bad_query_strings_report_the_query_field() {
        let app = test::init_service(
            App::new()
                .app_data(query_config())
                .route("/items", web::get().to(listing)),
        )
        .await;

        let req = test::TestRequest::get().uri("/items?page=first").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["errors"]["query"][0].is_string());
    }

    #[actix_web::test]
    async fn non_numeric_ids_are_json_404s() {
        let app = test::init_service(
            App::new()
                .app_data(path_config())
                .route("/items/{id}", web::get().to(by_id)),
        )
        .await;

        let req = test::TestRequest::get().uri("/items/abc").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Not found.");

        let req = test::TestRequest::get().uri("/items/7").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], 7);
    }

    #[actix_web::test]
    async fn unknown_routes_return_json_404() {
        let app = test::init_service(App::new().default_service(web::to(not_found))).await;

        let req = test::TestRequest::get().uri("/nowhere").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Not found.");
    }
}
