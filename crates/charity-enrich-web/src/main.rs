//! charity-enrich-web - HTTP server for the enrichment API
//!
//! Loads settings from the environment (and `.env`), runs migrations, then
//! serves `/api/v1` with CORS and request tracing.

use std::net::SocketAddr;

use anyhow::Context;
use charity_enrich::api::{build_app, AppState, API_PREFIX};
use charity_enrich::database::{mask_database_url, DatabaseConfig, DatabaseManager};
use charity_enrich::Settings;
use http::{header, HeaderName, HeaderValue, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    let mut allow_headers = vec![
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        HeaderName::from_static("x-csrf-token"),
    ];
    match HeaderName::from_bytes(settings.api_key_header.as_bytes()) {
        Ok(name) => allow_headers.push(name),
        Err(_) => tracing::warn!("Invalid API key header name: {}", settings.api_key_header),
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(allow_headers)
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static("x-require-2fa"),
        ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "charity_enrich=debug,charity_enrich_web=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    tracing::info!(
        app = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        "Starting Charity Enrichment API"
    );

    let db = match DatabaseManager::new(DatabaseConfig::from_settings(&settings)).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(
                "Failed to connect to database at {}: {}",
                mask_database_url(&settings.database_url),
                e
            );
            tracing::error!(
                "Please check DATABASE_URL environment variable and ensure PostgreSQL is running"
            );
            return Err(e).context("Database connection failed");
        }
    };

    db.run_migrations()
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", settings.host, settings.port))?;
    let cors = cors_layer(&settings);

    let state = AppState::new(db.into_pool(), settings).context("Failed to build app state")?;
    let app = build_app(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("===========================================");
    tracing::info!("  Charity Enrichment API on http://{}{}", addr, API_PREFIX);
    tracing::info!("===========================================");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(
                    "Port {} is already in use. Try: lsof -ti:{} | xargs kill -9",
                    addr.port(),
                    addr.port()
                );
            }
            return Err(e).with_context(|| format!("Failed to bind to {}", addr));
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
