//! API server entry point.

use api::config::Config;
use chrono::{Duration, Utc};
use domain::{DiscountKind, Money, NewProduct, PromoCodeInput};
use rust_decimal::Decimal;
use store::{InMemoryStore, PostgresStore, StorefrontStore};
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

/// Seeds a demo catalog and promo codes for in-memory runs.
async fn seed_demo_data<S: StorefrontStore>(store: &S) {
    let products = [
        ("Espresso Beans 1kg", 1850, 40),
        ("Pour-Over Kettle", 4599, 12),
        ("Ceramic Mug", 1200, 60),
        ("Cold Brew Bottle", 2450, 25),
    ];
    for (name, price_cents, stock) in products {
        store
            .create_product(NewProduct {
                name: name.to_string(),
                description: None,
                price: Money::from_cents(price_cents),
                stock,
                is_active: true,
            })
            .await
            .expect("failed to seed product");
    }

    let promos = [
        PromoCodeInput {
            code: Some("WELCOME10".to_string()),
            kind: DiscountKind::Percentage,
            value: Decimal::from(10),
            min_purchase: Some(Money::from_dollars(20)),
            usage_limit: None,
            expires_at: None,
            is_active: true,
        },
        PromoCodeInput {
            code: Some("SUMMER20".to_string()),
            kind: DiscountKind::Percentage,
            value: Decimal::from(20),
            min_purchase: Some(Money::from_dollars(50)),
            usage_limit: Some(100),
            expires_at: Some(Utc::now() + Duration::days(30)),
            is_active: true,
        },
        PromoCodeInput {
            code: Some("FLAT5".to_string()),
            kind: DiscountKind::Fixed,
            value: Decimal::from(5),
            min_purchase: None,
            usage_limit: Some(500),
            expires_at: None,
            is_active: true,
        },
    ];
    for promo in promos {
        store
            .create_promo(promo)
            .await
            .expect("failed to seed promo code");
    }
    tracing::info!("seeded demo catalog and promo codes");
}

async fn serve<S: StorefrontStore + 'static>(store: S, config: &Config) {
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let state = api::AppState::new(store);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(20)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            serve(store, &config).await;
        }
        None => {
            let store = InMemoryStore::new();
            seed_demo_data(&store).await;
            tracing::info!("using in-memory store with demo data");
            serve(store, &config).await;
        }
    }
}
