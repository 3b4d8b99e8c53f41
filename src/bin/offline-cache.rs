use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use offline_cache::server::run_server;
use offline_cache::{
    AppConfig, CacheStorage, DiskStorage, HttpNetwork, MemoryStorage, OfflineCacheController,
    ServiceWorkerHost, StorageBackend, build_http_client,
};
use tokio_util::sync::CancellationToken;

fn print_usage() {
    eprintln!("Usage: offline-cache [OPTIONS]");
    eprintln!();
    eprintln!("Serves a static origin through an offline-first cache.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>       Config file (created with defaults if missing)");
    eprintln!("  -u, --upstream <URL>      Origin to cache (overrides [cache] scope)");
    eprintln!("      --cache-version <TAG> Cache version tag (overrides [cache] version)");
    eprintln!("      --host <HOST>         Bind address (default: 127.0.0.1)");
    eprintln!("  -p, --port <PORT>         Bind port (default: 9723)");
    eprintln!("      --storage-dir <PATH>  Persist cache stores under PATH");
    eprintln!("      --memory              Keep cache stores in memory only");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Set RUST_LOG=debug for per-request logging.");
}

/// Command-line overrides applied on top of the config file.
#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    upstream: Option<String>,
    version: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    storage_dir: Option<PathBuf>,
    memory: bool,
}

fn exit_with(msg: &str) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .unwrap_or_else(|| exit_with(&format!("{flag} requires a value")))
        };
        match arg.as_str() {
            "-c" | "--config" => args.config = Some(PathBuf::from(value("--config"))),
            "-u" | "--upstream" => args.upstream = Some(value("--upstream")),
            "--cache-version" => args.version = Some(value("--cache-version")),
            "--host" => args.host = Some(value("--host")),
            "-p" | "--port" => {
                let port = value("--port");
                args.port = Some(
                    port.parse()
                        .unwrap_or_else(|_| exit_with(&format!("invalid port: {port}"))),
                );
            }
            "--storage-dir" => args.storage_dir = Some(PathBuf::from(value("--storage-dir"))),
            "--memory" => args.memory = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                print_usage();
                exit_with(&format!("unknown argument: {other}"));
            }
        }
    }
    args
}

fn apply_overrides(config: &mut AppConfig, args: Args) {
    if let Some(upstream) = args.upstream {
        config.cache.scope = upstream;
    }
    if let Some(version) = args.version {
        config.cache.version = version;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.storage_dir {
        config.storage.backend = StorageBackend::Disk;
        config.storage.dir = dir;
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
}

/// Resolves on SIGINT or SIGTERM (systemd sends SIGTERM).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                    _ = sigterm.recv() => log::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {e}");
                tokio::signal::ctrl_c().await.ok();
                log::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        log::info!("Received SIGINT");
    }
}

async fn run<S: CacheStorage + 'static>(config: AppConfig, storage: S) -> offline_cache::Result<()> {
    let timeout = config.cache.fetch_timeout_secs.map(Duration::from_secs);
    let network = HttpNetwork::new(build_http_client(timeout)?, config.cache.scope_url()?);
    let controller = OfflineCacheController::new(config.cache.clone(), storage, network)?;
    let host = Arc::new(ServiceWorkerHost::new(controller));

    // A failed install leaves the worker redundant; the proxy keeps serving
    // straight from the network so the site stays usable online.
    match host.start().await {
        Ok(state) => log::info!("Worker {state} with store {}", host.controller().cache_name()),
        Err(e) => log::error!("Worker not installed, passing requests through: {e}"),
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    run_server(Arc::clone(&host), &config.server, shutdown).await?;
    log::info!("{}", host.controller().stats().snapshot().summary());
    Ok(())
}

#[tokio::main]
async fn main() -> offline_cache::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_create(&config_path)?;
    log::info!("Loaded config from {}", config_path.display());
    apply_overrides(&mut config, args);

    match config.storage.backend {
        StorageBackend::Memory => run(config, MemoryStorage::new()).await,
        StorageBackend::Disk => {
            let storage = DiskStorage::new(&config.storage.dir);
            log::info!("Cache stores under {}", storage.root().display());
            run(config, storage).await
        }
    }
}
