use clap::Parser;
use sessiongate::{AppState, build_app, config::GatewayConfig, observability};

/// CLI arguments for the session gate
#[derive(Parser, Debug)]
#[command(version, about = "Authentication gate for per-user backend sessions", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "sessiongate.toml")]
    config: String,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the gate server (default)
    Serve,
    /// Validate the configuration file and list the enabled providers
    Check,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Check) => run_check(&args.config),
        Some(Command::Serve) | None => run_server(&args.config).await,
    }
}

fn load_config(path: &str) -> GatewayConfig {
    match GatewayConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {path}: {e}");
            std::process::exit(1);
        }
    }
}

fn run_check(path: &str) {
    let config = load_config(path);
    println!("Configuration OK: {path}");
    println!("Providers (in order): {}", config.enabled_providers().join(", "));
    println!("Exempt paths: {}", config.auth.exempt_paths.join(", "));
}

async fn run_server(path: &str) {
    let config = load_config(path);

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {e}");
        std::process::exit(1);
    }

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics");
    }

    tracing::info!(
        config_file = %path,
        providers = ?config.enabled_providers(),
        "Starting session gate"
    );

    if config.auth.cache_ttl_secs == 0 {
        tracing::warn!("Identity caching is disabled; every request hits the identity providers");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize authentication providers");
            std::process::exit(1);
        }
    };
    let app = build_app(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind to address");
            std::process::exit(1);
        }
    };
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
