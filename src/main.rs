//! invoice-billing server binary.
//!
//! Wires configuration, the Postgres stores, the gateway client, the HTTP
//! router and the credit reconciler, then serves until Ctrl-C or SIGTERM.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use invoice_billing::adapters::gateway::{GatewayClientConfig, RazorpayGateway};
use invoice_billing::adapters::http::{payment_router, PaymentAppState};
use invoice_billing::adapters::postgres::{
    PostgresEntitlementStore, PostgresPaymentClaimStore, PostgresPaymentLedger,
};
use invoice_billing::application::handlers::billing::{
    CreditConfig, EntitlementCrediter, VerifyPaymentConfig,
};
use invoice_billing::application::{CreditReconciler, ReconcilerConfig};
use invoice_billing::config::{AppConfig, ConfigError, ServerConfig, ValidationError};
use invoice_billing::domain::billing::{PlanCatalog, SignatureVerifier};
use invoice_billing::domain::foundation;
use invoice_billing::ports::GatewayError;

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Invalid gateway secret: {0}")]
    Secret(#[from] foundation::ValidationError),

    #[error("Gateway client: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        tracing::error!(error = %error, "invoice-billing exited with error");
        eprintln!("invoice-billing exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;
    tracing::info!(
        environment = ?config.server.environment,
        catalog_version = PlanCatalog::CURRENT.version,
        "Configuration loaded"
    );

    let pool = config.database.pool_options().connect(&config.database.url).await?;
    tracing::info!("Postgres connection established");
    if config.database.run_migrations {
        sqlx::migrate!().run(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let secret = config
        .payment
        .key_secret
        .clone()
        .ok_or(ValidationError::MissingRequired("PAYMENT__KEY_SECRET"))?;
    let gateway = Arc::new(RazorpayGateway::new(
        GatewayClientConfig::new(config.payment.key_id.clone(), secret.clone())
            .with_base_url(config.payment.api_base_url.clone())
            .with_timeout(config.payment.gateway_timeout()),
    )?);
    let verifier = SignatureVerifier::new(secret)?;

    let entitlement_store = Arc::new(PostgresEntitlementStore::new(pool.clone()));
    let ledger = Arc::new(PostgresPaymentLedger::new(pool.clone()));
    let claims = Arc::new(PostgresPaymentClaimStore::new(pool.clone()));
    let crediter = Arc::new(EntitlementCrediter::new(
        entitlement_store.clone(),
        CreditConfig {
            renewal_policy: config.billing.renewal_policy,
            max_attempts: config.billing.entitlement_write_attempts,
            initial_backoff: config.billing.retry_backoff(),
            store_timeout: config.billing.store_timeout(),
        },
    ));

    let reconciler = CreditReconciler::new(
        claims.clone(),
        ledger.clone(),
        crediter.clone(),
        PlanCatalog::CURRENT,
        ReconcilerConfig::default()
            .with_interval(config.billing.reconcile_interval())
            .with_batch_size(config.billing.reconcile_batch_size)
            .with_claim_lease(config.billing.claim_lease()),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_handle = tokio::spawn(async move { reconciler.run(shutdown_rx).await });

    let state = PaymentAppState {
        gateway,
        entitlement_store,
        ledger,
        claims,
        crediter,
        verifier,
        catalog: PlanCatalog::CURRENT,
        verify_config: VerifyPaymentConfig {
            gateway_timeout: config.payment.gateway_timeout(),
            claim_lease: config.billing.claim_lease(),
        },
    };
    let app = build_app(state, &config.server);

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Credit reconciler already stopped");
    }
    if let Err(e) = reconciler_handle.await {
        tracing::error!(error = %e, "Credit reconciler task failed");
    }
    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    if server.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_app(state: PaymentAppState, server: &ServerConfig) -> Router {
    payment_router()
        .with_state(state)
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(cors_layer(server))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static("x-user-id")]);

    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if !origins.is_empty() {
        layer.allow_origin(AllowOrigin::list(origins))
    } else if server.is_production() {
        layer
    } else {
        layer.allow_origin(Any)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
