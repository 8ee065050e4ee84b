//! Per-caller sliding-window rate limiting for LLM routes.
//!
//! Runs after authentication so the window is keyed by user id. The
//! limiter also carries the login/invite windows for the external auth
//! surface; those classes are enforced wherever that surface terminates.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use annexreg_core::ratelimit::LimitClass;
use annexreg_core::{CurrentUser, RegistryError};

use crate::error::AppError;
use crate::state::AppState;

pub async fn llm_rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let identifier = req
        .extensions()
        .get::<CurrentUser>()
        .map(|u| u.user_id.to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if !state.limiter.check(LimitClass::Llm, &identifier) {
        return Err(AppError(RegistryError::RateLimited(
            "too many LLM requests, please try again later".to_string(),
        ))
        .into_response());
    }

    Ok(next.run(req).await)
}
