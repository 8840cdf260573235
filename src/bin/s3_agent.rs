//! `s3-agent`: the object-store variant of the batching proxy.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use batch_sidecar::backends::object_store::{ObjectStoreExecutor, S3Op};
use batch_sidecar::config::{self, CommonArgs, SharedConfig};
use batch_sidecar::core::{Batcher, BatcherConfig};
use batch_sidecar::http::s3_routes::{self, S3AppState};
use batch_sidecar::lifecycle::{self, signals};
use batch_sidecar::metrics;

#[derive(Parser, Debug)]
struct S3Args {
    #[command(flatten)]
    common: CommonArgs,

    /// AWS region override. Not part of the environment-overrides-flag
    /// table (spec.md §6 lists no env var for this flag).
    #[arg(long)]
    aws_region: Option<String>,

    #[arg(long)]
    default_bucket: Option<String>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = S3Args::parse();
    let config = match SharedConfig::resolve(args.common) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            return ExitCode::FAILURE;
        },
    };
    config::log_effective("s3-agent", &config);

    let mut aws_conf_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = &args.aws_region {
        aws_conf_loader = aws_conf_loader.region(aws_sdk_s3::config::Region::new(region.clone()));
    }
    let aws_conf = aws_conf_loader.load().await;
    let client = aws_sdk_s3::Client::new(&aws_conf);
    let executor = Arc::new(ObjectStoreExecutor::new(client));

    if let Err(e) = executor.probe().await {
        config::warn_on_probe_failure("s3", e);
    }

    let batcher = Batcher::<S3Op, ObjectStoreExecutor>::new(
        BatcherConfig {
            enabled: config.batching_enabled,
            batch_window: config.batch_window,
            max_batch_size: config.max_batch_size,
        },
        executor,
    );

    let shared_config = Arc::new(config.clone());
    let state = S3AppState {
        batcher: batcher.clone(),
        config: shared_config.clone(),
        default_bucket: args.default_bucket.clone(),
    };

    let api_router = Router::new()
        .route("/health", get(lifecycle::health_check))
        .route("/s3/listBuckets", get(s3_routes::list_buckets::<ObjectStoreExecutor>))
        .route("/s3/listObjects", get(s3_routes::list_objects::<ObjectStoreExecutor>))
        .route("/s3/getObject", get(s3_routes::get_object::<ObjectStoreExecutor>))
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
