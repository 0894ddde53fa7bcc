mod handlers;
mod middleware;
pub mod state;


use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::prelude::{eprintln, *};
pub use state::ApiState;

/// Interval between sweeps of expired files and limiter entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Multipart framing allowed on top of the configured file size.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, clap::Args, Clone)]
pub struct ServeOptions {
    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Directory holding the temp/ and converted/ folders
    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: PathBuf,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "MAX_FILE_SIZE", default_value = "10485760")]
    pub max_file_size: u64,

    /// General rate limit window, in milliseconds
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value = "900000")]
    pub rate_limit_window: u64,

    /// Requests allowed per client IP and window on /api routes
    #[arg(long, env = "RATE_LIMIT_MAX", default_value = "100")]
    pub rate_limit_max: u32,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Deployment environment reported by the health endpoints
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub environment: String,
}

impl ServeOptions {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window)
    }

    pub fn cors_origins(&self) -> Vec<HeaderValue> {
        self.cors_origin
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("Ignoring invalid CORS origin: {origin}");
                    None
                }
            })
            .collect()
    }

    #[cfg(test)]
    pub fn for_dir(dir: &std::path::Path) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            upload_dir: dir.to_path_buf(),
            max_file_size: 10 * 1024 * 1024,
            rate_limit_window: 15 * 60 * 1000,
            rate_limit_max: 100,
            cors_origin: "http://localhost:3000".to_string(),
            environment: "test".to_string(),
        }
    }
}

fn security_headers() -> [(HeaderName, HeaderValue); 10] {
    [
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(
                "default-src 'self'; style-src 'self' 'unsafe-inline'; script-src 'self'; img-src 'self' data: https:",
            ),
        ),
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
        ),
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::X_XSS_PROTECTION, HeaderValue::from_static("0")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
        (
            header::X_DNS_PREFETCH_CONTROL,
            HeaderValue::from_static("off"),
        ),
        (
            HeaderName::from_static("x-download-options"),
            HeaderValue::from_static("noopen"),
        ),
        (
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ),
        (
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("same-origin"),
        ),
    ]
}

/// Build the application router.
///
/// Outermost first: security headers, compression, IP blocker, suspicious
/// request screen, CORS, request log. `/api` routes add the general limiter
/// and upload/download their own.
pub fn build_router(state: ApiState) -> Router {
    use axum::middleware::from_fn_with_state;

    let body_limit = usize::try_from(state.config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        .route(
            "/upload",
            post(handlers::upload)
                .route_layer(from_fn_with_state(state.clone(), middleware::upload_limit))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/download/{filename}",
            get(handlers::download)
                .route_layer(from_fn_with_state(state.clone(), middleware::download_limit)),
        )
        .route("/health", get(handlers::api_health))
        .route("/stats", get(handlers::stats))
        .route_layer(from_fn_with_state(state.clone(), middleware::general_limit));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(state.config.cors_origins()))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let router = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn(middleware::log_request))
        .layer(cors)
        .layer(from_fn_with_state(state.clone(), middleware::screen_request))
        .layer(from_fn_with_state(state.clone(), middleware::ip_blocker))
        .layer(CompressionLayer::new());

    security_headers()
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(name, value))
        })
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: tokio::net::TcpListener, state: ApiState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Periodically remove expired files and limiter entries.
fn spawn_sweeper(state: ApiState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let files = state.store.sweep(crate::store::OUTPUT_TTL).await;
            let entries = state.evict_expired();
            log::debug!("Sweep removed {files} files and {entries} limiter entries");
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutdown signal received, draining connections");
}

pub async fn run(options: ServeOptions, global: crate::Global) -> Result<()> {
    let addr = format!("{}:{}", options.host, options.port);

    if global.verbose {
        eprintln!("Starting ConverteAI server on {addr}...");
    }

    let state = ApiState::new(options)
        .map_err(|e| eyre!("Failed to prepare upload directories: {e}"))?;
    let sweeper = spawn_sweeper(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("Failed to bind to {}: {}", addr, e))?;

    log::info!(
        "Server running on {addr} ({} environment), files under {}",
        state.config.environment,
        state.store.root().display()
    );
    if global.verbose {
        eprintln!("Upload endpoint: http://{addr}/api/upload");
        eprintln!("Health check: http://{addr}/api/health");
    }

    serve(listener, state, shutdown_signal())
        .await
        .map_err(|e| eyre!("Server error: {e}"))?;

    sweeper.abort();
    Ok(())
}
