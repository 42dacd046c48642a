//! wayfare -- travel-spot generation server.
//!
//! This is the application entry point. It wires together all modules:
//!   - Configuration loading
//!   - Database initialization
//!   - Cost ledger + pricing table
//!   - Completion audit logger
//!   - Image resolver + enrichment orchestrator
//!   - HTTP server with graceful shutdown on SIGTERM / SIGINT

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use wayfare::api;
use wayfare::budget::{CostLedger, PricingTable, spawn_audit_logger};
use wayfare::config::Config;
use wayfare::db::Database;
use wayfare::enrich::EnrichmentOrchestrator;
use wayfare::images::ImageResolver;
use wayfare::llm::OpenAiClient;
use wayfare::spots::GenerationService;
use wayfare::{AppState, build_image_client};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: PathBuf,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("wayfare.toml");

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("wayfare {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    CliArgs { config_path }
}

fn print_usage() {
    println!(
        "\
wayfare {version} -- travel-spot generation server

USAGE:
    wayfare [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: wayfare.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    WAYFARE_CONFIG         Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // 1. Parse CLI arguments
    let cli = parse_args();

    // Allow WAYFARE_CONFIG env var as alternative to --config flag
    let config_path = std::env::var("WAYFARE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);

    // 2. Load configuration
    let config = Config::load(&config_path)?;

    // 3. Initialize tracing/logging
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting wayfare"
    );

    // 4. Open database
    let db = Database::open(&config.database.path)?;
    tracing::info!(path = %config.database.path.display(), "Database opened");

    // 5. Cost ledger over the pricing table
    let pricing = PricingTable::from_config(&config.pricing);
    let ledger = Arc::new(CostLedger::new(
        db.clone(),
        pricing,
        config.budget.daily_limit_usd,
    ));
    tracing::info!(
        daily_limit_usd = config.budget.daily_limit_usd,
        "Cost ledger initialized"
    );

    // 6. Spawn the completion audit logger
    let (audit, _audit_handle) = spawn_audit_logger(db.clone());
    tracing::debug!("Audit logger spawned");

    // 7. Image resolution + enrichment
    let resolver = Arc::new(ImageResolver::new(&config.images));
    let enricher = Arc::new(EnrichmentOrchestrator::new(
        resolver,
        config.images.max_concurrent_lookups,
    ));

    // 8. Chat completion client + generation service
    let provider = Arc::new(OpenAiClient::new(
        &config.generation.endpoint,
        config.generation.timeout_secs,
    ));
    let generation = Arc::new(GenerationService::new(
        provider,
        Arc::clone(&ledger),
        audit,
        enricher,
        config.generation.model.clone(),
        config.generation.temperature,
    ));

    // 9. Build shared application state
    let image_client = build_image_client(&config);
    let config_arc = Arc::new(config);
    let state = AppState {
        config: Arc::clone(&config_arc),
        db,
        ledger,
        generation,
        image_client,
    };

    // 10. Build the router
    let app = build_app(state);

    // 11. Bind and serve
    let listen_addr = config_arc.listen_addr();
    let listener = TcpListener::bind(&listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Listening");

    println!();
    println!("  wayfare v{} is running", env!("CARGO_PKG_VERSION"));
    println!("  Spots:   POST http://{listen_addr}/api/spots");
    println!("  Images:  GET  http://{listen_addr}/api/image?url=...");
    println!("  Health:  GET  http://{listen_addr}/health");
    println!();

    // 12. Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully");
    // Dropping the state drops the audit sender, which drains the writer.

    Ok(())
}

// ---------------------------------------------------------------------------
// Router assembly
// ---------------------------------------------------------------------------

/// Build the application router with all middleware layers.
fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();
    let trace = TraceLayer::new_for_http();

    api::build_api_router()
        .layer(propagate_id)
        .layer(request_id)
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from config.
fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.server.cors_origins.is_empty() {
        // Default: allow all origins for development convenience
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("wayfare={level},tower_http={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Wait for a shutdown signal (SIGTERM or SIGINT / Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
