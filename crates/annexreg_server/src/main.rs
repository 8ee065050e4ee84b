//! annexreg_server — standalone REST server for the compliance registry.
//!
//! Configuration (environment variables):
//!   ANNEXREG_DATABASE_URL     Postgres connection string (required)
//!   ANNEXREG_JWT_SECRET       HS256 secret for access-token validation (required)
//!   ANNEXREG_BOOTSTRAP_TOKEN  token guarding POST /api/organizations (required)
//!   ANNEXREG_BIND_ADDR        listen address (default 0.0.0.0:4200)
//!   ANNEXREG_STORAGE_ROOT     object-store directory (default ./annexreg-objects)
//!   ANNEXREG_PUBLIC_BASE_URL  base URL for presigned links (default http://localhost:4200)
//!   ANNEXREG_RUN_MIGRATIONS   run embedded migrations at startup (default true)

use std::sync::Arc;

use tokio::net::TcpListener;

use annexreg_core::ratelimit::RateLimiter;
use annexreg_postgres::{connect, DatabaseConfig, MIGRATOR};
use annexreg_server::llm::OfflineCompletionProvider;
use annexreg_server::middleware::auth::JwtConfig;
use annexreg_server::router::build_router;
use annexreg_server::state::AppState;
use annexreg_server::storage::FsObjectStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,annexreg_server=debug".into()),
        )
        .init();

    let jwt_secret =
        std::env::var("ANNEXREG_JWT_SECRET").expect("ANNEXREG_JWT_SECRET must be set");
    let bootstrap_token =
        std::env::var("ANNEXREG_BOOTSTRAP_TOKEN").expect("ANNEXREG_BOOTSTRAP_TOKEN must be set");
    let bind_addr =
        std::env::var("ANNEXREG_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:4200".into());
    let storage_root =
        std::env::var("ANNEXREG_STORAGE_ROOT").unwrap_or_else(|_| "./annexreg-objects".into());
    let public_base_url = std::env::var("ANNEXREG_PUBLIC_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:4200".into());

    let db_config = DatabaseConfig::default();
    let pool = connect(&db_config)
        .await
        .expect("failed to connect to database");

    let run_migrations = std::env::var("ANNEXREG_RUN_MIGRATIONS")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);
    if run_migrations {
        MIGRATOR.run(&pool).await.expect("migrations failed");
        tracing::info!("database migrations applied");
    }

    let files_store = Arc::new(FsObjectStore::new(
        storage_root,
        jwt_secret.clone(),
        public_base_url,
    ));

    let state = AppState {
        pool,
        storage: files_store.clone(),
        llm: Arc::new(OfflineCompletionProvider::new()),
        limiter: Arc::new(RateLimiter::new()),
        jwt: JwtConfig::from_secret(jwt_secret.as_bytes()),
        bootstrap_token,
    };

    let app = build_router(state, files_store);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {bind_addr}: {e}"));
    tracing::info!("annexreg_server listening on {bind_addr}");

    axum::serve(listener, app).await.expect("server error");
}
