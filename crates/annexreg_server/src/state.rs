//! Shared application state.

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};

use annexreg_core::ports::{CompletionProvider, ObjectStorage};
use annexreg_core::ratelimit::RateLimiter;

use crate::error::AppError;
use crate::middleware::auth::JwtConfig;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub storage: Arc<dyn ObjectStorage>,
    pub llm: Arc<dyn CompletionProvider>,
    pub limiter: Arc<RateLimiter>,
    pub jwt: JwtConfig,
    pub bootstrap_token: String,
}

impl AppState {
    /// One transaction per request; handlers commit exactly once.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(AppError::internal)
    }
}

pub async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), AppError> {
    tx.commit().await.map_err(AppError::internal)
}
