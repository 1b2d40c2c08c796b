//! Image Registry Operator
//!
//! Reconciles the singleton `ImageRegistry` resource of one namespace into a
//! running registry and reports its health through a `ClusterOperator`.

use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use image_registry_operator::{
    BackoffConfig, Collaborators, Controller, ControllerMetrics, DriverContext, Error,
    InMemoryBackend, KubeGenerator, KubeInstallConfig, KubeRegistryApi, KubeStatusHandler,
    KubeVolumeClaims, OperatorParams, Reconciler, Result, Watchers, WorkQueue,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Image Registry Operator - reconciles the registry and its storage
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Namespace the operator watches and deploys into
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: String,

    /// Name of the ClusterOperator this operator reports on
    #[arg(long, env = "OPERATOR_NAME")]
    operator_name: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// YAML map of cloud credentials handed to the storage drivers
    #[arg(long, env = "CLOUD_CREDENTIALS_FILE")]
    credentials_file: Option<PathBuf>,

    /// Initial requeue delay after a failed pass, in milliseconds
    #[arg(long, env = "BACKOFF_INITIAL_MS", default_value = "5")]
    backoff_initial_ms: u64,

    /// Maximum requeue delay, in seconds
    #[arg(long, env = "BACKOFF_MAX_SECS", default_value = "1000")]
    backoff_max_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Image Registry Operator");
    info!("  Version: {}", image_registry_operator::VERSION);
    info!("  Namespace: {}", args.namespace);
    info!("  Operator: {}", args.operator_name);

    let params = Arc::new(OperatorParams::new(&args.namespace, &args.operator_name));
    let credentials = load_credentials(args.credentials_file.as_ref())?;

    let registry = Registry::new();
    let metrics = Arc::new(ControllerMetrics::new(&registry).context("registering metrics")?);

    let client = kube::Client::try_default()
        .await
        .context("building Kubernetes client")?;

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, registry).await {
            error!("Metrics server error: {}", e);
        }
    });

    let watchers = Watchers::new(client.clone(), &params.namespace);

    let drivers = DriverContext {
        params: params.clone(),
        object_store: Arc::new(InMemoryBackend::new()),
        volume_claims: Arc::new(KubeVolumeClaims::new(client.clone(), &params)),
        credentials: Arc::new(credentials),
    };

    let deps = Collaborators {
        api: Arc::new(KubeRegistryApi::new(client.clone(), &params.namespace)),
        generator: Arc::new(KubeGenerator::new(client.clone(), params.clone())),
        cluster_status: Arc::new(KubeStatusHandler::new(client.clone(), &params.operator_name)),
        platform: Arc::new(KubeInstallConfig::new(client)),
        drivers,
        deployments: watchers.deployments.clone(),
        services: watchers.services.clone(),
    };

    let reconciler = Arc::new(Reconciler::new(params.clone(), deps, metrics.clone()));
    let queue = WorkQueue::new(BackoffConfig {
        initial: Duration::from_millis(args.backoff_initial_ms),
        max: Duration::from_secs(args.backoff_max_secs),
    });
    let controller = Controller::new(reconciler, queue, metrics);

    let token = CancellationToken::new();
    {
        let token = token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => warn!("Unable to listen for shutdown signal: {}", e),
            }
            token.cancel();
        });
    }

    controller
        .run(&watchers, token)
        .await
        .context("running controller")?;

    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Credentials
// =============================================================================

fn load_credentials(path: Option<&PathBuf>) -> Result<BTreeMap<String, String>> {
    let Some(path) = path else {
        return Ok(BTreeMap::new());
    };
    let raw = std::fs::read_to_string(path)?;
    let credentials: BTreeMap<String, String> = serde_yaml::from_str(&raw)?;
    info!("Loaded {} cloud credential keys from {}", credentials.len(), path.display());
    Ok(credentials)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: hyper::StatusCode, body: &'static str) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(hyper::Body::from(body));
    *response.status_mut() = status;
    response
}

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" | "/readyz" => text_response(StatusCode::OK, "ok"),
                _ => text_response(StatusCode::NOT_FOUND, "not found"),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, registry: Registry) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{header, Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => {
                            let encoder = TextEncoder::new();
                            let mut buffer = Vec::new();
                            match encoder.encode(&registry.gather(), &mut buffer) {
                                Ok(()) => {
                                    let mut response = Response::new(Body::from(buffer));
                                    if let Ok(value) = header::HeaderValue::from_str(encoder.format_type()) {
                                        response.headers_mut().insert(header::CONTENT_TYPE, value);
                                    }
                                    response
                                }
                                Err(e) => {
                                    error!("Unable to encode metrics: {}", e);
                                    text_response(StatusCode::INTERNAL_SERVER_ERROR, "encoding error")
                                }
                            }
                        }
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
