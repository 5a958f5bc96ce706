use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use meshgate::config::GatewayConfig;
use meshgate::AppState;
use tracing::info;

#[derive(Parser)]
#[command(name = "meshgated", about = "mesh gateway daemon", version)]
struct Args {
    /// WebSocket + REST listen port.
    #[arg(long, env = "MESHGATE_PORT")]
    port: Option<u16>,

    /// Mesh data root — discover resolves relative paths against this directory.
    #[arg(long, env = "MESHGATE_ROOT")]
    root: Option<PathBuf>,

    /// Tracing filter string (e.g. "info", "meshgate=debug").
    #[arg(long, env = "MESHGATE_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily), in addition to stdout.
    #[arg(long, env = "MESHGATE_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = args.log.clone().unwrap_or_else(|| "info".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref());

    let config = GatewayConfig::new(args.port, args.root, args.log);
    info!(port = config.port, root = %config.root.display(), "config loaded");

    let state = AppState::new(config);
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "meshgate listening (WebSocket + REST on same port)");

    let process = state.process.clone();
    let app = meshgate::app(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            make_shutdown_future().await;
            info!("shutdown signal received — closing active connections");
            process.shutdown().await;
        })
        .await?;

    info!("meshgate stopped");
    Ok(())
}

/// Initializes the tracing subscriber. If `log_file` is set, logs go to both
/// stdout and a daily-rolling file; returns the guard that must stay alive
/// for the process lifetime. Falls back to stdout-only if the log
/// directory can't be created — never panics on a bad log path.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("meshgate.log"));

        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            tracing_subscriber::fmt().with_env_filter(log_level.to_string()).compact().init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(log_level))
            .with(tracing_subscriber::fmt::layer().compact())
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level.to_string()).compact().init();
        None
    }
}

/// On Unix, resolves on SIGTERM *or* Ctrl-C; elsewhere, Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
