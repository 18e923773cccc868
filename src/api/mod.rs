pub mod cache;
pub mod handlers;
pub mod types;

use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::control::ControlPlane;
use cache::ResponseCache;

pub struct AppState {
    pub pool: PgPool,
    pub control: Arc<ControlPlane>,
    pub cache: Arc<ResponseCache>,
}

pub fn router(pool: PgPool, control: Arc<ControlPlane>, cache: Arc<ResponseCache>) -> Router {
    let state = Arc::new(AppState {
        pool,
        control,
        cache,
    });

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/events", get(handlers::list_events))
        .route(
            "/api/v1/events/integrator/{address}",
            get(handlers::integrator_events),
        )
        .route(
            "/api/v1/chains",
            get(handlers::list_chains).post(handlers::add_chain),
        )
        .route(
            "/api/v1/chains/{id}",
            get(handlers::get_chain)
                .put(handlers::update_chain)
                .delete(handlers::delete_chain),
        )
        .route("/api/v1/chains/{id}/start", post(handlers::start_chain))
        .route("/api/v1/chains/{id}/stop", post(handlers::stop_chain))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    pool: PgPool,
    control: Arc<ControlPlane>,
    cache: Arc<ResponseCache>,
    host: &str,
    port: u16,
) -> eyre::Result<()> {
    let app = router(pool, control, cache);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
