use crate::{
    api::{
        budget, cash_advance, delivery, disbursement, employee, health, inventory_adjustment,
        inventory_item, leave_request, liquidation, physical_count, purchase_order, purchase_request,
        quotation, service_record, stock_card, supplier, training, user,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;

type LimiterConfig = GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware>;

/// Replenish period and burst for `requests_per_min`, i.e. the whole minute's
/// budget may be spent at once.
fn quota(requests_per_min: u32) -> Result<(Duration, u32)> {
    if requests_per_min == 0 {
        return Err(anyhow!("rate limit must allow at least one request per minute"));
    }
    let period = Duration::from_secs(60) / requests_per_min;
    Ok((period, requests_per_min))
}

fn limiter_config(requests_per_min: u32) -> Result<LimiterConfig> {
    let (period, burst) = quota(requests_per_min)?;
    GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit of {} per minute", requests_per_min))
}

/// Per-IP limiters, built once so every worker shares the same buckets.
#[derive(Clone)]
pub struct RateLimits {
    login: LimiterConfig,
    register: LimiterConfig,
    refresh: LimiterConfig,
    protected: LimiterConfig,
}

impl RateLimits {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: limiter_config(config.rate_login_per_min)?,
            register: limiter_config(config.rate_register_per_min)?,
            refresh: limiter_config(config.rate_refresh_per_min)?,
            protected: limiter_config(config.rate_protected_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limits: &RateLimits) {
    let login_limiter = Arc::new(Governor::new(&limits.login));
    let register_limiter = Arc::new(Governor::new(&limits.register));
    let refresh_limiter = Arc::new(Governor::new(&limits.refresh));
    let protected_limiter = Arc::new(Governor::new(&limits.protected));

    cfg.service(
        web::scope(&config.api_prefix)
            // public
            .route("/health", web::get().to(health::health))
            .service(
                web::scope("/auth")
                    .service(
                        web::resource("/login")
                            .wrap(login_limiter)
                            .route(web::post().to(handlers::login)),
                    )
                    .service(
                        web::resource("/register")
                            .wrap(register_limiter)
                            .route(web::post().to(handlers::register)),
                    )
                    .service(
                        web::resource("/refresh")
                            .wrap(refresh_limiter)
                            .route(web::post().to(handlers::refresh_token)),
                    )
                    .service(
                        web::resource("/logout")
                            .wrap(from_fn(auth_middleware))
                            .route(web::post().to(handlers::logout)),
                    )
                    .service(
                        web::resource("/me")
                            .wrap(from_fn(auth_middleware))
                            .route(web::get().to(handlers::me)),
                    ),
            )
            // everything below requires a bearer token
            .service(
                web::scope("")
                    .wrap(from_fn(auth_middleware))
                    .wrap(protected_limiter)
                    .configure(hr_routes)
                    .configure(procurement_routes)
                    .configure(inventory_routes)
                    .configure(finance_routes)
                    .configure(user_routes),
            ),
    );
}

fn hr_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/employees")
            .service(
                web::resource("")
                    .route(web::get().to(employee::list_employees))
                    .route(web::post().to(employee::create_employee)),
            )
            .service(web::resource("/search").route(web::get().to(employee::search_employees)))
            .service(web::resource("/statistics").route(web::get().to(employee::employee_statistics)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(employee::get_employee))
                    .route(web::put().to(employee::update_employee))
                    .route(web::delete().to(employee::delete_employee)),
            )
            .service(web::resource("/{id}/promote").route(web::post().to(employee::promote_employee)))
            .service(web::resource("/{id}/leave-credits").route(web::get().to(employee::leave_credits))),
    )
    .service(
        web::scope("/leave-requests")
            .service(
                web::resource("")
                    .route(web::get().to(leave_request::list_leave_requests))
                    .route(web::post().to(leave_request::create_leave_request)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(leave_request::get_leave_request))
                    .route(web::put().to(leave_request::update_leave_request))
                    .route(web::delete().to(leave_request::delete_leave_request)),
            )
            .service(web::resource("/{id}/recommend").route(web::post().to(leave_request::recommend_leave_request)))
            .service(web::resource("/{id}/approve").route(web::post().to(leave_request::approve_leave_request)))
            .service(
                web::resource("/{id}/disapprove").route(web::post().to(leave_request::disapprove_leave_request)),
            )
            .service(web::resource("/{id}/cancel").route(web::post().to(leave_request::cancel_leave_request))),
    )
    .service(
        web::scope("/service-records")
            .service(
                web::resource("")
                    .route(web::get().to(service_record::list_service_records))
                    .route(web::post().to(service_record::create_service_record)),
            )
            .service(
                web::resource("/employee/{employee_id}")
                    .route(web::get().to(service_record::employee_service_records)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(service_record::get_service_record))
                    .route(web::put().to(service_record::update_service_record))
                    .route(web::delete().to(service_record::delete_service_record)),
            ),
    )
    .service(
        web::scope("/trainings")
            .service(
                web::resource("")
                    .route(web::get().to(training::list_trainings))
                    .route(web::post().to(training::create_training)),
            )
            .service(web::resource("/statistics").route(web::get().to(training::training_statistics)))
            .service(web::resource("/type/{type}").route(web::get().to(training::trainings_by_type)))
            .service(web::resource("/year/{year}").route(web::get().to(training::trainings_by_year)))
            .service(
                web::resource("/employee/{employee_id}").route(web::get().to(training::employee_trainings)),
            )
            .service(
                web::resource("/employee/{employee_id}/completed")
                    .route(web::get().to(training::employee_completed_trainings)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(training::get_training))
                    .route(web::put().to(training::update_training))
                    .route(web::delete().to(training::delete_training)),
            ),
    );
}

fn procurement_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/suppliers")
            .service(
                web::resource("")
                    .route(web::get().to(supplier::list_suppliers))
                    .route(web::post().to(supplier::create_supplier)),
            )
            .service(web::resource("/active").route(web::get().to(supplier::active_suppliers)))
            .service(web::resource("/search").route(web::get().to(supplier::search_suppliers)))
            .service(web::resource("/statistics").route(web::get().to(supplier::supplier_statistics)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(supplier::get_supplier))
                    .route(web::put().to(supplier::update_supplier))
                    .route(web::delete().to(supplier::delete_supplier)),
            ),
    )
    .service(
        web::scope("/purchase-requests")
            .service(
                web::resource("")
                    .route(web::get().to(purchase_request::list_purchase_requests))
                    .route(web::post().to(purchase_request::create_purchase_request)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(purchase_request::get_purchase_request))
                    .route(web::put().to(purchase_request::update_purchase_request))
                    .route(web::delete().to(purchase_request::delete_purchase_request)),
            )
            .service(web::resource("/{id}/submit").route(web::post().to(purchase_request::submit_purchase_request)))
            .service(
                web::resource("/{id}/recommend").route(web::post().to(purchase_request::recommend_purchase_request)),
            )
            .service(web::resource("/{id}/approve").route(web::post().to(purchase_request::approve_purchase_request)))
            .service(
                web::resource("/{id}/disapprove")
                    .route(web::post().to(purchase_request::disapprove_purchase_request)),
            )
            .service(web::resource("/{id}/cancel").route(web::post().to(purchase_request::cancel_purchase_request))),
    )
    .service(
        web::scope("/quotations")
            .service(
                web::resource("")
                    .route(web::get().to(quotation::list_quotations))
                    .route(web::post().to(quotation::create_quotation)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(quotation::get_quotation))
                    .route(web::put().to(quotation::update_quotation))
                    .route(web::delete().to(quotation::delete_quotation)),
            )
            .service(web::resource("/{id}/evaluate").route(web::post().to(quotation::evaluate_quotation)))
            .service(web::resource("/{id}/select").route(web::post().to(quotation::select_quotation)))
            .service(web::resource("/{id}/reject").route(web::post().to(quotation::reject_quotation))),
    )
    .service(
        web::scope("/purchase-orders")
            .service(
                web::resource("")
                    .route(web::get().to(purchase_order::list_purchase_orders))
                    .route(web::post().to(purchase_order::create_purchase_order)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(purchase_order::get_purchase_order))
                    .route(web::put().to(purchase_order::update_purchase_order))
                    .route(web::delete().to(purchase_order::delete_purchase_order)),
            )
            .service(web::resource("/{id}/approve").route(web::post().to(purchase_order::approve_purchase_order)))
            .service(
                web::resource("/{id}/send-to-supplier").route(web::post().to(purchase_order::send_purchase_order)),
            )
            .service(web::resource("/{id}/cancel").route(web::post().to(purchase_order::cancel_purchase_order))),
    )
    .service(
        web::scope("/deliveries")
            .service(
                web::resource("")
                    .route(web::get().to(delivery::list_deliveries))
                    .route(web::post().to(delivery::create_delivery)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(delivery::get_delivery))
                    .route(web::put().to(delivery::update_delivery))
                    .route(web::delete().to(delivery::delete_delivery)),
            )
            .service(web::resource("/{id}/inspect").route(web::post().to(delivery::inspect_delivery)))
            .service(web::resource("/{id}/accept").route(web::post().to(delivery::accept_delivery)))
            .service(web::resource("/{id}/reject").route(web::post().to(delivery::reject_delivery))),
    );
}

fn inventory_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/inventory-items")
            .service(
                web::resource("")
                    .route(web::get().to(inventory_item::list_inventory_items))
                    .route(web::post().to(inventory_item::create_inventory_item)),
            )
            .service(web::resource("/low-stock").route(web::get().to(inventory_item::low_stock_items)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(inventory_item::get_inventory_item))
                    .route(web::put().to(inventory_item::update_inventory_item))
                    .route(web::delete().to(inventory_item::delete_inventory_item)),
            ),
    )
    .service(
        web::scope("/stock-cards")
            .service(web::resource("").route(web::get().to(stock_card::list_stock_cards)))
            .service(web::resource("/stock-in").route(web::post().to(stock_card::stock_in)))
            .service(web::resource("/stock-out").route(web::post().to(stock_card::stock_out)))
            .service(web::resource("/donation").route(web::post().to(stock_card::donation)))
            .service(web::resource("/item/{item_id}").route(web::get().to(stock_card::item_ledger)))
            .service(web::resource("/item/{item_id}/balance").route(web::get().to(stock_card::item_balance)))
            .service(web::resource("/{id}").route(web::get().to(stock_card::get_stock_card))),
    )
    .service(
        web::scope("/inventory-adjustments")
            .service(
                web::resource("")
                    .route(web::get().to(inventory_adjustment::list_inventory_adjustments))
                    .route(web::post().to(inventory_adjustment::create_inventory_adjustment)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(inventory_adjustment::get_inventory_adjustment))
                    .route(web::put().to(inventory_adjustment::update_inventory_adjustment))
                    .route(web::delete().to(inventory_adjustment::delete_inventory_adjustment)),
            )
            .service(
                web::resource("/{id}/approve")
                    .route(web::post().to(inventory_adjustment::approve_inventory_adjustment)),
            )
            .service(
                web::resource("/{id}/reject").route(web::post().to(inventory_adjustment::reject_inventory_adjustment)),
            ),
    )
    .service(
        web::scope("/physical-counts")
            .service(
                web::resource("")
                    .route(web::get().to(physical_count::list_physical_counts))
                    .route(web::post().to(physical_count::create_physical_count)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(physical_count::get_physical_count))
                    .route(web::delete().to(physical_count::delete_physical_count)),
            )
            .service(web::resource("/{id}/items").route(web::put().to(physical_count::record_counts)))
            .service(web::resource("/{id}/complete").route(web::post().to(physical_count::complete_physical_count)))
            .service(web::resource("/{id}/cancel").route(web::post().to(physical_count::cancel_physical_count)))
            .service(
                web::resource("/{id}/variances").route(web::get().to(physical_count::physical_count_variances)),
            )
            .service(web::resource("/{id}/approve").route(web::post().to(physical_count::approve_physical_count))),
    );
}

fn finance_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/budgets")
            .service(
                web::resource("")
                    .route(web::get().to(budget::list_budgets))
                    .route(web::post().to(budget::create_budget)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(budget::get_budget))
                    .route(web::put().to(budget::update_budget))
                    .route(web::delete().to(budget::delete_budget)),
            )
            .service(web::resource("/{id}/approve").route(web::post().to(budget::approve_budget)))
            .service(web::resource("/{id}/activate").route(web::post().to(budget::activate_budget)))
            .service(web::resource("/{id}/close").route(web::post().to(budget::close_budget)))
            .service(web::resource("/{id}/utilization").route(web::get().to(budget::budget_utilization))),
    )
    .service(
        web::scope("/cash-advances")
            .service(
                web::resource("")
                    .route(web::get().to(cash_advance::list_cash_advances))
                    .route(web::post().to(cash_advance::create_cash_advance)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(cash_advance::get_cash_advance))
                    .route(web::put().to(cash_advance::update_cash_advance))
                    .route(web::delete().to(cash_advance::delete_cash_advance)),
            )
            .service(web::resource("/{id}/approve").route(web::post().to(cash_advance::approve_cash_advance)))
            .service(web::resource("/{id}/release").route(web::post().to(cash_advance::release_cash_advance)))
            .service(web::resource("/{id}/reject").route(web::post().to(cash_advance::reject_cash_advance))),
    )
    .service(
        web::scope("/disbursements")
            .service(
                web::resource("")
                    .route(web::get().to(disbursement::list_disbursements))
                    .route(web::post().to(disbursement::create_disbursement)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(disbursement::get_disbursement))
                    .route(web::put().to(disbursement::update_disbursement))
                    .route(web::delete().to(disbursement::delete_disbursement)),
            )
            .service(web::resource("/{id}/certify").route(web::post().to(disbursement::certify_disbursement)))
            .service(web::resource("/{id}/approve").route(web::post().to(disbursement::approve_disbursement)))
            .service(web::resource("/{id}/mark-paid").route(web::post().to(disbursement::mark_disbursement_paid)))
            .service(web::resource("/{id}/reject").route(web::post().to(disbursement::reject_disbursement))),
    )
    .service(
        web::scope("/liquidations")
            .service(
                web::resource("")
                    .route(web::get().to(liquidation::list_liquidations))
                    .route(web::post().to(liquidation::create_liquidation)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(liquidation::get_liquidation))
                    .route(web::put().to(liquidation::update_liquidation))
                    .route(web::delete().to(liquidation::delete_liquidation)),
            )
            .service(web::resource("/{id}/approve").route(web::post().to(liquidation::approve_liquidation)))
            .service(web::resource("/{id}/reject").route(web::post().to(liquidation::reject_liquidation))),
    );
}

fn user_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .service(web::resource("").route(web::get().to(user::list_users)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(user::get_user))
                    .route(web::put().to(user::update_user)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test, web::Data};

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:8080".to_string()),
            "DATABASE_URL" => Some("mysql://localhost/adminsuite".to_string()),
            "JWT_SECRET" => Some("routes-test-secret".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn limits(config: &Config) -> RateLimits {
        RateLimits::from_config(config).unwrap()
    }

    #[actix_web::test]
    async fn quota_spreads_the_minute_budget() {
        assert_eq!(quota(60).unwrap(), (Duration::from_secs(1), 60));
        assert_eq!(quota(1000).unwrap(), (Duration::from_millis(60), 1000));
    }

    #[actix_web::test]
    async fn rates_above_one_per_millisecond_keep_their_quota() {
        let (period, burst) = quota(120_000).unwrap();
        assert_eq!(period, Duration::from_micros(500));
        assert_eq!(burst, 120_000);
        assert!(limiter_config(120_000).is_ok());
    }

    #[actix_web::test]
    async fn zero_rate_is_an_error() {
        assert!(quota(0).is_err());
        assert!(limiter_config(0).is_err());
    }

    #[actix_web::test]
    async fn health_needs_no_token() {
        let config = config();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config.clone()))
                .configure(|cfg| configure(cfg, &config, &limits(&config))),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/health")
            .peer_addr("127.0.0.1:40000".parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn resource_routes_need_a_token() {
        let config = config();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(config.clone()))
                .configure(|cfg| configure(cfg, &config, &limits(&config))),
        )
        .await;
        for uri in [
            "/api/employees",
            "/api/stock-cards/item/1/balance",
            "/api/budgets/3/utilization",
            "/api/users",
            "/api/users/1",
        ] {
            let req = test::TestRequest::get()
                .uri(uri)
                .peer_addr("127.0.0.1:40000".parse().unwrap())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }
}
