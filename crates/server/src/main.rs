use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use server_api::ApiContext;
use storage::{LocalDisks, Storage};
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod auth;
mod config;

use app_state::AppState;
use auth::AuthConfig;
use config::{load_settings, prepare_database_url};

/// Largest accepted request: a maximal media upload plus form overhead.
const MAX_BODY_BYTES: usize = 101 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let public_root = PathBuf::from(&settings.storage_root);
    std::fs::create_dir_all(&public_root).with_context(|| {
        format!("failed to create storage root '{}'", public_root.display())
    })?;
    let disks = LocalDisks::public(&public_root, &settings.public_url)?;

    let api = ApiContext::new(
        storage,
        Arc::new(disks),
        Duration::from_secs(settings.cache_ttl_seconds),
    );
    let state = AppState {
        api,
        auth: AuthConfig {
            jwt_secret: settings.jwt_secret,
            ttl_seconds: settings.jwt_ttl_seconds,
        },
    };
    let app = build_router(Arc::new(state), public_root);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, public_url = %settings.public_url, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, public_root: PathBuf) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/media", get(api::media::index).post(api::media::store))
        .route(
            "/media/:id",
            get(api::media::show).delete(api::media::destroy),
        )
        .route("/pages", get(api::pages::index).post(api::pages::store))
        .route(
            "/pages/:id",
            get(api::pages::show)
                .put(api::pages::update)
                .patch(api::pages::update)
                .delete(api::pages::destroy),
        )
        .route(
            "/team-members",
            get(api::team_members::index).post(api::team_members::store),
        )
        .route(
            "/team-members/:id",
            get(api::team_members::show)
                .put(api::team_members::update)
                .patch(api::team_members::update)
                // Multipart clients that cannot send PUT bodies.
                .post(api::team_members::update)
                .delete(api::team_members::destroy),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/login", post(auth::login))
        .merge(protected)
        .nest_service("/storage", ServeDir::new(public_root))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            error!(error = %format!("{err:#}"), "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
