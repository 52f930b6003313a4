use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use boxoffice_server::config::Config;
use boxoffice_server::db::PgStore;
use boxoffice_server::payments::MercadoPagoClient;
use boxoffice_server::routes::create_routes;
use boxoffice_server::state::AppState;
use boxoffice_server::storage::LocalObjectStorage;

const DEFAULT_LOG_FILTER: &str = "info,boxoffice_server=debug";

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let storage = LocalObjectStorage::new(
        config.blob_storage_path.clone(),
        config.blob_public_url.clone(),
        config.max_upload_bytes,
    )
    .await
    .expect("Failed to open blob storage");

    let payments =
        MercadoPagoClient::new(config.mercado_pago.clone()).expect("Failed to build payment client");

    let store = Arc::new(PgStore::new(pool));
    let addr = config.http_addr;
    let state = AppState::new(
        config,
        store.clone(),
        store.clone(),
        store,
        Arc::new(storage),
        Arc::new(payments),
    );

    let app = create_routes(state);

    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
