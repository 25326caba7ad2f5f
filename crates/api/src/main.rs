//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::state::Gateways;
use gateways::{
    Cache, InMemoryMailer, InMemoryPaymentGateway, Mailer, MokaCache, PaymentGateway, RedisCache,
    SmtpMailer, StripeGateway,
};
use metrics_exporter_prometheus::PrometheusHandle;
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use store::{DocumentStore, InMemoryDocumentStore, PostgresDocumentStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build_gateways(config: &Config) -> Gateways {
    let cache: Arc<dyn Cache> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCache::connect(url)
                .await
                .expect("failed to connect to Redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set, using in-process cache");
            Arc::new(MokaCache::default())
        }
    };

    let payments: Arc<dyn PaymentGateway> = match &config.stripe {
        Some(stripe) => Arc::new(StripeGateway::new(
            stripe.secret_key.clone(),
            stripe.webhook_secret.clone(),
        )),
        None => {
            tracing::warn!("Stripe keys not set, using in-memory payment gateway");
            Arc::new(InMemoryPaymentGateway::default())
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.email {
        Some(email) => Arc::new(
            SmtpMailer::new(
                &email.host,
                email.port,
                email.username.clone(),
                &email.password,
                email.from.clone(),
            )
            .expect("failed to build SMTP transport"),
        ),
        None => {
            tracing::warn!("EMAIL_HOST not set, emails will only be logged");
            Arc::new(InMemoryMailer::new())
        }
    };

    Gateways {
        cache,
        mailer,
        payments,
    }
}

async fn serve<S: DocumentStore + Clone + 'static>(
    store: S,
    config: &Config,
    gateways: Gateways,
    metrics_handle: PrometheusHandle,
) {
    let state = api::create_state(store, config, gateways);
    let app = api::create_app(state.clone(), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    state.cache.close().await;
}

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    init_tracing(&config);
    tracing::debug!(?config, "configuration loaded");

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Connect external services
    let gateways = build_gateways(&config).await;

    // 5. Pick the document store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url.expose_secret())
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresDocumentStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            serve(store, &config, gateways, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            serve(InMemoryDocumentStore::new(), &config, gateways, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
