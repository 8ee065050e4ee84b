//! Router construction: public surface, bearer-protected API, signed file
//! routes.

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{delete, get, patch, post},
    Extension, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::handlers::files::FilesState;
use crate::middleware::auth::bearer_auth;
use crate::middleware::headers::security_headers;
use crate::middleware::rate_limit::llm_rate_limit;
use crate::state::AppState;
use crate::storage::FsObjectStore;

pub fn build_router(state: AppState, files_store: Arc<FsObjectStore>) -> Router {
    // Bearer-protected API routes.
    let protected = Router::new()
        // User administration
        .route("/api/users", get(handlers::users::list))
        .route(
            "/api/users/:id",
            get(handlers::users::get)
                .patch(handlers::users::update)
                .delete(handlers::users::delete),
        )
        // AI systems
        .route(
            "/api/systems",
            get(handlers::systems::list).post(handlers::systems::create),
        )
        .route(
            "/api/systems/:id",
            get(handlers::systems::get)
                .patch(handlers::systems::update)
                .delete(handlers::systems::delete),
        )
        // High-risk screening
        .route(
            "/api/assessments/questions",
            get(handlers::assessments::questions),
        )
        .route(
            "/api/systems/:id/assessments",
            get(handlers::assessments::list).post(handlers::assessments::submit),
        )
        // Versions
        .route(
            "/api/systems/:id/versions",
            get(handlers::versions::list).post(handlers::versions::create),
        )
        .route(
            "/api/systems/:id/versions/compare",
            get(handlers::versions::compare),
        )
        .route(
            "/api/systems/:id/versions/:vid",
            get(handlers::versions::get)
                .patch(handlers::versions::update)
                .delete(handlers::versions::delete),
        )
        .route(
            "/api/systems/:id/versions/:vid/status",
            patch(handlers::versions::change_status),
        )
        .route(
            "/api/systems/:id/versions/:vid/clone",
            post(handlers::versions::clone),
        )
        .route(
            "/api/systems/:id/versions/:vid/manifest",
            get(handlers::versions::manifest),
        )
        .route(
            "/api/systems/:id/versions/:vid/completeness",
            get(handlers::versions::completeness),
        )
        // Sections
        .route(
            "/api/systems/:id/versions/:vid/sections",
            get(handlers::sections::list),
        )
        .route(
            "/api/systems/:id/versions/:vid/sections/:key",
            get(handlers::sections::get).patch(handlers::sections::update),
        )
        // Evidence
        .route(
            "/api/evidence",
            get(handlers::evidence::list).post(handlers::evidence::create),
        )
        .route(
            "/api/evidence/upload-url",
            post(handlers::evidence::upload_url),
        )
        .route(
            "/api/evidence/:id",
            get(handlers::evidence::get)
                .patch(handlers::evidence::update)
                .delete(handlers::evidence::delete),
        )
        .route(
            "/api/evidence/:id/download",
            get(handlers::evidence::download),
        )
        .route(
            "/api/evidence/:id/download-url",
            get(handlers::evidence::download_url),
        )
        // Evidence mappings
        .route(
            "/api/systems/:id/versions/:vid/evidence",
            get(handlers::mappings::list).post(handlers::mappings::create),
        )
        .route(
            "/api/systems/:id/versions/:vid/evidence/:mid",
            delete(handlers::mappings::delete),
        )
        // Exports
        .route(
            "/api/systems/:id/versions/:vid/exports",
            get(handlers::exports::list).post(handlers::exports::generate),
        )
        .route(
            "/api/exports/:id/download",
            get(handlers::exports::download),
        )
        // Decision logging administration
        .route(
            "/api/systems/:id/versions/:vid/logging/enable",
            post(handlers::logging::enable),
        )
        .route(
            "/api/logging/keys/:kid",
            delete(handlers::logging::revoke),
        )
        .route(
            "/api/systems/:id/versions/:vid/logs",
            get(handlers::logging::list),
        )
        .route(
            "/api/systems/:id/versions/:vid/logs/export",
            get(handlers::logging::export),
        )
        .route(
            "/api/systems/:id/versions/:vid/logs/:lid",
            get(handlers::logging::get),
        )
        // Drafting (rate limited per user)
        .route(
            "/api/llm/draft",
            post(handlers::drafts::generate).layer(axum_mw::from_fn_with_state(
                state.clone(),
                llm_rate_limit,
            )),
        )
        .layer(axum_mw::from_fn(bearer_auth))
        .layer(Extension(state.jwt.clone()));

    // Public routes: health, bootstrap, API-key ingestion.
    let public = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/organizations",
            post(handlers::organizations::bootstrap),
        )
        .route("/api/v1/logs", post(handlers::ingest::ingest));

    // Signed file routes backing the filesystem object store.
    let files = Router::new()
        .route(
            "/files/*uri",
            get(handlers::files::download).put(handlers::files::upload),
        )
        .with_state(FilesState { store: files_store });

    Router::new()
        .merge(public.with_state(state.clone()))
        .merge(protected.with_state(state))
        .merge(files)
        .layer(axum_mw::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
