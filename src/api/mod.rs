pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    control::RelayControlService, sensors::TelemetryService, settings::SettingsStore,
    users::UserService,
};
use handlers::ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub telemetry: TelemetryService,
    pub relay: RelayControlService,
    pub settings: SettingsStore,
    pub users: UserService,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            telemetry: TelemetryService::new(pool.clone()),
            relay: RelayControlService::new(pool.clone()),
            settings: SettingsStore::new(pool.clone()),
            users: UserService::new(pool),
        }
    }
}

pub fn router(pool: SqlitePool) -> Router {
    let state = AppState::new(pool);

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/telemetry/ingest", get(handlers::ingest_telemetry))
        .route("/relay/manual", get(handlers::set_relay))
        .route("/readings/latest", get(handlers::get_latest_reading))
        .route("/readings", get(handlers::get_readings))
        .route("/thresholds", get(handlers::get_thresholds))
        .route(
            "/thresholds/update",
            get(handlers::update_thresholds_get).post(handlers::update_thresholds_post),
        )
        .route("/users/register", post(handlers::register_user))
        .route("/users/login", post(handlers::login_user))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
        // every client in the original system talks to these endpoints
        // cross-origin, so the CORS policy is wide open
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
