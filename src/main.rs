//! s3gw -- S3-compatible object storage gateway.
//!
//! Starts two HTTP listeners: the S3-facing gateway on `server.port` and
//! the admin (user-provisioning) surface on `admin.port` (spec §6). Both
//! share one [`s3gw::AppState`] and shut down together on SIGINT/SIGTERM.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use s3gw::auth::AuthMode;
use s3gw::backend::memory::MemoryBackendFactory;
use s3gw::backend::BackendConfig;
use s3gw::backend::BackendFactory;
use s3gw::AppState;

/// Command-line arguments for the s3gw gateway.
#[derive(Parser, Debug)]
#[command(name = "s3gw", version, about = "S3-compatible object storage gateway")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "s3gw.example.yaml")]
    config: String,

    /// Auth enforcement mode: `none`, `access-key`, or `signature`.
    #[arg(long, default_value = "signature")]
    auth_mode: String,
}

fn parse_auth_mode(raw: &str) -> anyhow::Result<AuthMode> {
    match raw {
        "none" => Ok(AuthMode::NoAuth),
        "access-key" => Ok(AuthMode::AccessKeyOnly),
        "signature" => Ok(AuthMode::AccessKeyAndSignature),
        other => anyhow::bail!("unknown --auth-mode '{other}': expected none, access-key, or signature"),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let auth_mode = parse_auth_mode(&cli.auth_mode)?;

    let config = s3gw::config::load_config(&cli.config)?;
    init_tracing(&config.logging);
    info!("configuration loaded from {}", cli.config);

    // Size tokio's blocking-thread pool from `worker.worker_num` (spec
    // §2.7, §5): each blocking-pool thread becomes one worker with its
    // own exclusive backend handle (see `worker.rs`), so the pool's size
    // directly is the gateway's worker count.
    let worker_num = config.worker.clamped_worker_num();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(worker_num as usize)
        .build()?;

    runtime.block_on(run(config, auth_mode))
}

async fn run(config: s3gw::config::Config, auth_mode: AuthMode) -> anyhow::Result<()> {
    s3gw::metrics::init_metrics();
    s3gw::metrics::describe_metrics();
    info!("prometheus metrics initialized");

    let backend_config = BackendConfig {
        meta_ip_ports: config.backend.zp_meta_ip_ports.clone(),
        table_name: config.backend.zp_table_name.clone(),
        lock_registry_ip_port: config.lock_registry.redis_ip_port.clone(),
        lock_registry_password: config.lock_registry.redis_passwd.clone(),
        lock_ttl_seconds: config.lock_registry.lock_ttl_seconds,
        self_host_port: format!("{}:{}", config.server.ip, config.server.port),
    };
    let factory: Arc<dyn BackendFactory> = Arc::new(MemoryBackendFactory::new(backend_config));

    let server_addr = format!("{}:{}", config.server.ip, config.server.port);
    let admin_addr = format!("{}:{}", config.server.ip, config.admin.port);

    let state = AppState::new(config, factory, auth_mode);

    let gateway_listener = tokio::net::TcpListener::bind(&server_addr).await?;
    info!("s3gw gateway listening on {}", server_addr);
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;
    info!("s3gw admin surface listening on {}", admin_addr);

    let maintenance = s3gw::server::spawn_maintenance(state.clone());

    let gateway_app = s3gw::server::app(state.clone());
    let admin_app = s3gw::server::admin_app(state);

    let gateway_server = axum::serve(gateway_listener, gateway_app).with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, admin_app).with_graceful_shutdown(shutdown_signal());

    let (gateway_result, admin_result) = tokio::join!(gateway_server, admin_server);
    maintenance.abort();
    gateway_result?;
    admin_result?;

    info!("s3gw shut down");
    Ok(())
}

/// Initialize the global tracing subscriber per `logging.format`
/// (`"json"` or plain text), honoring `RUST_LOG` over `logging.level`.
fn init_tracing(logging: &s3gw::config::LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(logging.level.clone()));

    if logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful
/// shutdown. Crash-only design: no cleanup runs here, only a stop to
/// accepting new connections.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        },
    }
}
