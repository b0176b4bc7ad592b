use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use stockroom_api::{
    build_app, config, db,
    events::spawn_event_processor,
    services::InventoryService,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = config::load_config().context("failed to load configuration")?;
    config::init_tracing(app_config.log_level(), app_config.log_json);

    info!(
        environment = %app_config.environment,
        "starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let db_pool = Arc::new(
        db::establish_connection_from_app_config(&app_config)
            .await
            .context("failed to connect to the database")?,
    );

    if app_config.auto_migrate {
        db::run_migrations(&db_pool)
            .await
            .context("database migration failed")?;
    }

    let (event_sender, _event_handle) = spawn_event_processor(app_config.event_channel_capacity);

    let cors = cors_layer(&app_config)?;
    let state = AppState::new(db_pool, app_config.clone(), event_sender);
    spawn_record_purger(
        state.services.inventory.clone(),
        app_config.record_purge_grace_secs,
    );
    let app = build_app(state).layer(cors);

    let addr = format!("{}:{}", app_config.host, app_config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

fn cors_layer(app_config: &config::AppConfig) -> anyhow::Result<CorsLayer> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ];

    match &app_config.cors_allowed_origins {
        Some(origins) => {
            let parsed: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|origin| {
                    origin
                        .parse::<HeaderValue>()
                        .with_context(|| format!("invalid CORS origin '{}'", origin))
                })
                .collect::<anyhow::Result<_>>()?;
            Ok(CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods(methods)
                .allow_headers(Any))
        }
        None => {
            if app_config.is_development() {
                Ok(CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(methods)
                    .allow_headers(Any))
            } else {
                warn!("no CORS origins configured, cross-origin requests disabled");
                Ok(CorsLayer::new())
            }
        }
    }
}

/// Periodically deletes zeroed inventory records older than the grace period.
fn spawn_record_purger(inventory: Arc<InventoryService>, grace_secs: u64) {
    tokio::spawn(async move {
        let grace = chrono::Duration::seconds(grace_secs as i64);
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match inventory.purge_stale_records(grace).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged stale inventory records"),
                Err(e) => warn!(error = %e, "stale inventory record purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received terminate signal"),
    }
}
