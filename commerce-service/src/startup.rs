//! Application startup and lifecycle management.

use std::net::SocketAddr;

use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::epay::{CardDataEncryptor, PaymentGatewayClient};
use crate::handlers;
use crate::services::{
    init_metrics, Database, InvoiceSettings, OrderSettlementCoordinator, PaymentOrchestrator,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub settlement: OrderSettlementCoordinator,
    pub payments: PaymentOrchestrator,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connects to the database, runs migrations, authenticates with the
    /// gateway and binds the listener. Port 0 picks a random port.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let encryptor = match &config.epay.public_key_pem {
            Some(pem) => CardDataEncryptor::from_public_key_pem(pem),
            None => CardDataEncryptor::provider(),
        }
        .map_err(|e| {
            tracing::error!("Failed to load gateway public key: {}", e);
            AppError::ConfigError(e.into())
        })?;

        let gateway = PaymentGatewayClient::new(config.epay.clone())
            .await
            .map_err(|e| {
                tracing::error!("Failed to initialize payment gateway client: {}", e);
                AppError::ServiceUnavailable
            })?;

        let settings = InvoiceSettings {
            currency: config.epay.currency.clone(),
            post_link: config.epay.post_link.clone(),
        };

        let state = AppState {
            config: config.clone(),
            db: db.clone(),
            settlement: OrderSettlementCoordinator::new(db.clone()),
            payments: PaymentOrchestrator::new(db, gateway, encryptor, settings),
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Commerce service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state);
        axum::serve(self.listener, router).await
    }
}

pub fn router(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout;

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/users", post(handlers::users::create_user))
        .route("/users/:id", get(handlers::users::get_user))
        .route("/products", post(handlers::products::create_product))
        .route("/products/:id", get(handlers::products::get_product))
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/payments",
            get(handlers::orders::list_order_payments),
        )
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/:id", get(handlers::payments::get_payment))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
