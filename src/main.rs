use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use mockable::{Clock, DefaultClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod dto;
mod error;
mod handlers;
mod models;
mod store;
mod streaks;


use auth::rate_limit::RateLimitState;
use config::Config;
use store::{HabitStore, MemoryStore, PgStore};
use streaks::StreakEngine;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HabitStore>,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock + Send + Sync>,
    pub rate_limiter: RateLimitState,
}

impl AppState {
    pub fn new(
        store: Arc<dyn HabitStore>,
        config: Arc<Config>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let rate_limiter = RateLimitState::new(
            config.auth_rate_limit_max,
            config.auth_rate_limit_window_secs,
        );
        Self {
            store,
            config,
            clock,
            rate_limiter,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// The single canonical calendar day used for every streak computation.
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Build the full router. CORS and request tracing are added by `main`.
pub fn app(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/v1/auth/signup", post(handlers::auth::signup))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .merge(auth_routes);

    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::auth::me))
        // Habits
        .route(
            "/api/v1/habits",
            get(handlers::habits::list_habits).post(handlers::habits::create_habit),
        )
        .route(
            "/api/v1/habits/:id",
            get(handlers::habits::get_habit)
                .put(handlers::habits::update_habit)
                .delete(handlers::habits::delete_habit),
        )
        // Completions
        .route(
            "/api/v1/habits/:id/toggle_completion",
            post(handlers::completions::toggle_completion),
        )
        .route(
            "/api/v1/habits/:id/completions",
            get(handlers::completions::list_completions)
                .post(handlers::completions::create_completion),
        )
        .route(
            "/api/v1/habits/:id/completions/:completion_id",
            delete(handlers::completions::delete_completion),
        )
        // Streaks
        .route("/api/v1/habits/:id/streak", get(handlers::habits::get_streak))
        .route(
            "/api/v1/habits/:id/calendar",
            get(handlers::habits::get_calendar),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = vec![config.frontend_url.parse::<HeaderValue>()?];
    // In dev, also allow LAN access (e.g. testing from another device)
    for origin in &config.cors_extra_origins {
        match origin.parse::<HeaderValue>() {
            Ok(hv) => origins.push(hv),
            Err(_) => tracing::warn!(origin = %origin, "Ignoring invalid CORS origin"),
        }
    }

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelon_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env()?);
    let engine = StreakEngine::new(config.longest_streak_policy);
    tracing::info!(policy = %engine.policy(), "Longest streak policy");

    let store: Arc<dyn HabitStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url, config.database_max_connections).await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool, engine))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new(engine))
        }
    };

    let state = AppState::new(store, config.clone(), Arc::new(DefaultClock));
    auth::rate_limit::spawn_cleanup_worker(state.rate_limiter.clone());

    let app = app(state)
        .layer(cors_layer(&config)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    // Use into_make_service_with_connect_info to provide client IP for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
