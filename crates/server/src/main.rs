mod api;
mod config;
mod scan;
mod settings;
mod state;
mod utils;

use std::sync::Arc;

use api::api_router;
use axum::Router;
use config::{
    config_path_from_env, load_or_create_config, resolve_music_root, resolve_path, MUSIC_ROOT_ENV,
};
use library::{CatalogStore, Library};
use parking_lot::RwLock;
use scan::start_scan;
use settings::SettingsStore;
use state::{AppState, ScanStatus};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let env_root = std::env::var(MUSIC_ROOT_ENV).ok();
    let (music_root, is_default) =
        resolve_music_root(&config_path, &config.music_root, env_root.as_deref());
    if is_default {
        warn!(
            "{} is not set; using default music root {:?}",
            MUSIC_ROOT_ENV, music_root
        );
    }
    info!("Music library path: {:?}", music_root);

    let index_path = resolve_path(&config_path, &config.index_path);
    let db = CatalogStore::open_db(&index_path)?;
    let library = Library::with_db(music_root, Arc::clone(&db))?;
    let settings = SettingsStore::new(Arc::clone(&db));
    settings.init_tables()?;

    let stats = library.stats()?;
    info!(
        "Catalog holds {} artists, {} albums, {} tracks",
        stats.artists, stats.albums, stats.tracks
    );

    let state = AppState {
        library,
        settings,
        scan_status: Arc::new(RwLock::new(ScanStatus::Idle)),
    };
    if config.scan_on_start {
        start_scan(state.clone());
    }

    let app = Router::new()
        .nest("/api", api_router(state))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
