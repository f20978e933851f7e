//! clustermesh CLI.
//!
//! `serve` constructs a `Container` from the configured (and
//! hot-reloadable) topology seed, registers its seeded nodes and
//! contexts, and serves the admin HTTP surface. `validate-config` is an
//! offline convenience that never binds a socket. `dump-topology` is an
//! admin API client: it connects to a running instance and prints its
//! live topology.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clustermesh::balancer::BalancerConfig;
use clustermesh::config::{Config, ConfigLoader, HealthCheckerKind};
use clustermesh::container::Container;
use clustermesh::health::{HealthCheckScheduler, HealthChecker, HttpPingChecker, TcpConnectChecker};
use clustermesh::node::NodeConfig;

#[derive(Parser)]
#[command(name = "clustermesh", version, about = "Cluster membership, routing, and election engine")]
struct Cli {
    /// Path to the configuration file (YAML or TOML).
    #[arg(long, short = 'c', global = true, env = "CLUSTERMESH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine: seed topology from config, serve the admin API,
    /// and hot-reload the config file on change.
    Serve,
    /// Parse and validate a configuration file, then exit.
    ValidateConfig,
    /// Connect to a running instance's admin API and print its live
    /// topology as JSON.
    DumpTopology {
        /// Base URL of the target instance's admin API.
        #[arg(long, default_value = "http://127.0.0.1:9080")]
        admin_url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Serve => serve(cli.config).await,
        Commands::ValidateConfig => validate_config(cli.config),
        Commands::DumpTopology { admin_url } => dump_topology(&admin_url).await,
    };

    if let Err(e) = result {
        error!(error = %e, "clustermesh exited with error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<PathBuf>) -> clustermesh::Result<Config> {
    match path {
        Some(path) => Config::from_file(&path),
        None => Config::discover_and_load(),
    }
}

fn validate_config(path: Option<PathBuf>) -> clustermesh::Result<()> {
    let config = load_config(path)?;
    config.validate()?;
    info!("configuration is valid");
    Ok(())
}

async fn dump_topology(admin_url: &str) -> clustermesh::Result<()> {
    let url = format!("{}/topology", admin_url.trim_end_matches('/'));
    let body: serde_json::Value = reqwest::get(&url).await?.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn build_health_checker(kind: &HealthCheckerKind) -> Arc<dyn HealthChecker> {
    match kind {
        HealthCheckerKind::TcpConnect { timeout_ms } => {
            Arc::new(TcpConnectChecker::new(Duration::from_millis(*timeout_ms)))
        }
        HealthCheckerKind::HttpPing { path, timeout_ms } => {
            Arc::new(HttpPingChecker::new(path.clone(), Duration::from_millis(*timeout_ms)))
        }
    }
}

/// Registers every statically-seeded node (and its contexts) from
/// `config` onto a freshly built `Container`.
async fn seed_topology(container: &Arc<Container>, config: &Config) {
    let balancer_configs: HashMap<_, _> = config
        .balancers
        .iter()
        .map(|b| {
            (
                b.name.clone(),
                BalancerConfig {
                    sticky_session: Some(b.sticky_session),
                    sticky_session_cookie: Some(b.sticky_session_cookie.clone()),
                    sticky_session_path: Some(b.sticky_session_path.clone()),
                    sticky_session_force: Some(b.sticky_session_force),
                    sticky_session_remove: Some(b.sticky_session_remove),
                    max_attempts: Some(b.max_attempts),
                },
            )
        })
        .collect();

    for seed in &config.nodes {
        let balancer_config = balancer_configs
            .get(&seed.balancer_name)
            .cloned()
            .unwrap_or_default();
        let node_config = NodeConfig {
            jvm_route: seed.jvm_route.clone(),
            connection_uri: seed.connection_uri.clone(),
            balancer_name: seed.balancer_name.clone(),
            domain: seed.domain.clone(),
            hot_standby: seed.hot_standby,
            io_thread: seed.io_thread,
            load_factor: seed.load_factor,
        };
        if let Err(e) = container.add_node(node_config, &balancer_config).await {
            error!(jvm_route = %seed.jvm_route, error = %e, "seeded node rejected, skipping its contexts");
            continue;
        }
        for ctx in &seed.contexts {
            if let Err(e) = container
                .enable_context(&seed.jvm_route, &ctx.path, &ctx.virtual_hosts)
                .await
            {
                error!(jvm_route = %seed.jvm_route, path = %ctx.path, error = %e, "failed to seed context");
            }
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> clustermesh::Result<()> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from("clustermesh.yaml"));
    let loader = ConfigLoader::new(config_path)?.watch()?;
    let config = loader.get();

    let checker = build_health_checker(&config.cluster.health_checker);
    let interval = Duration::from_millis(config.cluster.health_check_interval_ms);
    let broken_threshold = clustermesh::health::compute_broken_threshold(
        config.cluster.remove_broken_nodes_ms,
        config.cluster.health_check_interval_ms,
    );
    let scheduler = HealthCheckScheduler::new(checker, interval, broken_threshold);
    let container = Container::new(scheduler, interval);

    seed_topology(&container, &config).await;

    let addr: SocketAddr = format!("{}:{}", config.server.admin_host, config.server.admin_port)
        .parse()
        .map_err(|e| clustermesh::Error::Config(format!("invalid admin bind address: {e}")))?;

    let admin_state = clustermesh::admin::AdminState {
        container: container.clone(),
    };
    let app = clustermesh::admin::router(admin_state);

    info!(%addr, "clustermesh admin API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining admin listener");
}
