use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use directories::ProjectDirs;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    handlers::{health, load_secret, store_secret},
    lifecycle::SecretService,
    store::{self, MemoryStore, RedbStore, SecretStore},
    AppState,
};

/// Which record store backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Redb,
    Memory,
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redb" => Ok(Self::Redb),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown store backend {other:?} (expected redb or memory)"),
        }
    }
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub store: StoreKind,
    /// Origin used in share URLs ($UNSEAL_PUBLIC_URL). Derived per request if unset.
    pub public_url: Option<String>,
    pub cors_origins: Option<String>,
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("UNSEAL_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("UNSEAL_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("UNSEAL_DATA_DIR").ok().map(PathBuf::from),
            store: store_kind_from_env(std::env::var("UNSEAL_STORE").ok().as_deref()),
            public_url: std::env::var("UNSEAL_PUBLIC_URL").ok(),
            cors_origins: std::env::var("UNSEAL_CORS_ORIGINS").ok(),
            sweep_interval: Duration::from_secs(
                std::env::var("UNSEAL_SWEEP_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}

/// Backend named by `$UNSEAL_STORE`. An unknown name is logged and falls back
/// to redb.
fn store_kind_from_env(raw: Option<&str>) -> StoreKind {
    let Some(raw) = raw else {
        return StoreKind::Redb;
    };
    raw.parse().unwrap_or_else(|e: anyhow::Error| {
        warn!(error = %e, "ignoring UNSEAL_STORE, using redb");
        StoreKind::Redb
    })
}

/// Resolve the data directory: the configured path (flag or
/// `$UNSEAL_DATA_DIR`), else the platform data dir (`~/.local/share/unseal/`
/// etc). The directory is created if missing.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    let path = match data_dir {
        Some(d) => d.clone(),
        None => ProjectDirs::from("", "", "unseal")
            .context("could not determine platform data directory")?
            .data_dir()
            .to_owned(),
    };
    std::fs::create_dir_all(&path).context("create data dir")?;
    Ok(path)
}

/// Open the configured backend.
pub fn open_store(cfg: &ServerConfig) -> Result<Arc<dyn SecretStore>> {
    match cfg.store {
        StoreKind::Memory => {
            info!("using in-memory store; secrets will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Redb => {
            let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
            info!(data_dir = %data_dir.display(), "using data directory");
            let store = RedbStore::open(&data_dir.join("unseal.db")).context("open store")?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the HTTP router for `state`.
pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/store", post(store_secret))
        .route("/load", get(load_secret))
        .with_state(state)
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let backend = open_store(&cfg)?;

    // Expired keys already read as absent; the sweep reclaims their space.
    store::spawn_sweep(backend.clone(), cfg.sweep_interval);

    let state = AppState {
        secrets: SecretService::new(backend),
        public_url: cfg.public_url.clone(),
    };
    let app = router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "unseal server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<http::HeaderValue> = o
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
