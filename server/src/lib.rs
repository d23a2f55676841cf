pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use auth::TokenService;
pub use config::Config;
pub use db::Database;

/// Shared handles built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    pub fn new(db: Database, tokens: TokenService) -> Self {
        Self {
            db: Arc::new(db),
            tokens: Arc::new(tokens),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/users", get(handlers::list_users))
        .route_layer(middleware::from_fn(auth::require_admin));

    let protected = Router::new()
        .route("/api/auth/profile", get(handlers::profile))
        // Aircraft, scoped to the caller
        .route(
            "/api/aircraft",
            get(handlers::list_aircraft).post(handlers::create_aircraft),
        )
        .route(
            "/api/aircraft/{id}",
            get(handlers::get_aircraft)
                .put(handlers::update_aircraft)
                .delete(handlers::delete_aircraft),
        )
        // Presentations
        .route(
            "/api/presentations",
            get(handlers::list_presentations).post(handlers::create_presentation),
        )
        .route(
            "/api/presentations/{id}",
            get(handlers::get_presentation)
                .put(handlers::update_presentation)
                .delete(handlers::delete_presentation),
        )
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/health", get(handlers::health))
        .merge(protected)
        .fallback(handlers::not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
