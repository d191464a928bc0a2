use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;

use crate::cache::OrderCache;
use crate::metrics::Metrics;

// ============================================================================
// HTTP server - read path, metrics, health
// ============================================================================
//
// One actix-web app serves the order lookup alongside /metrics and
// /health. Lookups never touch the database: the cache answers or the
// order does not exist as far as this endpoint is concerned.
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<OrderCache>,
    pub metrics: Arc<Metrics>,
}

#[derive(Deserialize)]
struct OrderQuery {
    order_uid: Option<String>,
}

/// Start the HTTP server
/// This should be called in a separate thread/runtime to avoid blocking
/// the consumer.
pub async fn start_http_server(state: AppState, port: u16) -> std::io::Result<()> {
    tracing::info!("HTTP server starting on http://0.0.0.0:{}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .route("/order", web::get().to(order_handler))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn order_handler(
    state: web::Data<AppState>,
    query: web::Query<OrderQuery>,
) -> impl Responder {
    let order_uid = match query.order_uid.as_deref() {
        Some(uid) if !uid.is_empty() => uid,
        _ => return HttpResponse::BadRequest().body("Missing order_uid parameter"),
    };

    match state.cache.get(order_uid) {
        Some(order) => {
            state.metrics.record_lookup(true);
            match serde_json::to_string_pretty(&order) {
                Ok(body) => HttpResponse::Ok()
                    .content_type("application/json")
                    .body(body),
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        order_uid = %order_uid,
                        "Failed to serialize order"
                    );
                    HttpResponse::InternalServerError().body("Internal server error")
                }
            }
        }
        None => {
            state.metrics.record_lookup(false);
            HttpResponse::NotFound().body("Order not found")
        }
    }
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order_ingest"
    }))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test;

    use super::*;
    use crate::models::fixtures::sample_order;
    use crate::models::Order;

    fn test_state() -> AppState {
        AppState {
            cache: Arc::new(OrderCache::new()),
            metrics: Arc::new(Metrics::new().unwrap()),
        }
    }

    fn app_config(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
        move |cfg| {
            cfg.app_data(web::Data::new(state))
                .route("/order", web::get().to(order_handler))
                .route("/health", web::get().to(health_handler))
                .route("/metrics", web::get().to(metrics_handler));
        }
    }

    #[actix_web::test]
    async fn test_order_lookup_hit_returns_pretty_json() {
        let state = test_state();
        state.cache.set(sample_order("TEST123"));
        let app = test::init_service(App::new().configure(app_config(state))).await;

        let req = test::TestRequest::get()
            .uri("/order?order_uid=TEST123")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let body_str = std::str::from_utf8(&body).unwrap();
        // Pretty-printed JSON spans multiple lines.
        assert!(body_str.contains('\n'));

        let returned: Order = serde_json::from_str(body_str).unwrap();
        assert_eq!(returned, sample_order("TEST123"));
    }

    #[actix_web::test]
    async fn test_order_lookup_miss_is_not_found() {
        let app = test::init_service(App::new().configure(app_config(test_state()))).await;

        let req = test::TestRequest::get()
            .uri("/order?order_uid=MISSING")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_order_lookup_without_param_is_bad_request() {
        let app = test::init_service(App::new().configure(app_config(test_state()))).await;

        let req = test::TestRequest::get().uri("/order").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/order?order_uid=").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = test::init_service(App::new().configure(app_config(test_state()))).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_exposes_lookup_counters() {
        let state = test_state();
        state.cache.set(sample_order("TEST123"));
        let app = test::init_service(App::new().configure(app_config(state))).await;

        let req = test::TestRequest::get()
            .uri("/order?order_uid=TEST123")
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = test::read_body(resp).await;
        let body_str = std::str::from_utf8(&body).unwrap();
        assert!(body_str.contains("order_lookups_total"));
    }
}
