//! `kv-agent`: the key-value variant of the batching proxy.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use batch_sidecar::backends::key_value::{KeyValueExecutor, KvOp};
use batch_sidecar::config::{self, env_override, env_override_string, CommonArgs, SharedConfig};
use batch_sidecar::core::{Batcher, BatcherConfig};
use batch_sidecar::http::kv_routes::{self, KvAppState};
use batch_sidecar::lifecycle::{self, signals};
use batch_sidecar::metrics;

#[derive(Parser, Debug)]
struct KvArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[arg(long, default_value = "127.0.0.1")]
    redis_host: String,

    #[arg(long, default_value_t = 6379)]
    redis_port: u16,

    #[arg(long)]
    redis_password: Option<String>,

    #[arg(long, default_value_t = 10)]
    redis_pool_size: u32,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}

fn redis_url(host: &str, port: u16, password: &Option<String>) -> String {
    match password {
        Some(pw) if !pw.is_empty() => format!("redis://:{pw}@{host}:{port}"),
        _ => format!("redis://{host}:{port}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let mut args = KvArgs::parse();
    args.redis_host = env_override_string(args.redis_host, "REDIS_HOST");
    args.redis_password = match std::env::var("REDIS_PASSWORD") {
        Ok(pw) => Some(pw),
        Err(_) => args.redis_password,
    };
    args.redis_port = match env_override(args.redis_port, "REDIS_PORT") {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            return ExitCode::FAILURE;
        },
    };
    args.redis_pool_size = match env_override(args.redis_pool_size, "REDIS_POOL_SIZE") {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            return ExitCode::FAILURE;
        },
    };

    let config = match SharedConfig::resolve(args.common) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            return ExitCode::FAILURE;
        },
    };
    config::log_effective("kv-agent", &config);

    let url = redis_url(&args.redis_host, args.redis_port, &args.redis_password);
    let executor = match KeyValueExecutor::new(&url, args.redis_pool_size).await {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("failed to construct redis connection pool: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = executor.probe().await {
        config::warn_on_probe_failure("redis", e);
    }

    let batcher = Batcher::<KvOp, KeyValueExecutor>::new(
        BatcherConfig {
            enabled: config.batching_enabled,
            batch_window: config.batch_window,
            max_batch_size: config.max_batch_size,
        },
        executor,
    );

    let shared_config = Arc::new(config.clone());
    let state = KvAppState { batcher: batcher.clone(), config: shared_config.clone() };

    let api_router = Router::new()
        .route("/health", get(lifecycle::health_check))
        .route("/redis/get", get(kv_routes::get::<KeyValueExecutor>))
        .route("/redis/set", post(kv_routes::set::<KeyValueExecutor>))
        .route("/redis/del", delete(kv_routes::del::<KeyValueExecutor>))
        .route("/redis/exists", get(kv_routes::exists::<KeyValueExecutor>))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state);

    let router = if config.debug {
        let debug_router = Router::new()
            .route("/debug/config", get(lifecycle::debug_config))
            .with_state(shared_config);
        api_router.merge(debug_router)
    } else {
        api_router
    };
    let router = router.layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind port {}: {e}", config.port);
            return ExitCode::FAILURE;
        },
    };

    let (shutdown_tx, _shutdown_rx) = signals::setup_signal_handlers();

    let result = lifecycle::run_server(listener, router, shutdown_tx).await;
    batcher.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("server error: {e}");
            ExitCode::FAILURE
        },
    }
}
