//! procwarden - version 0.1.0
//!
//! Process and service triage with policy-gated remediation.
//! This is the main entry point that sets up logging and dispatches the
//! subcommands, including the HTTP server.

mod cli;
mod commands;
mod config;
mod handlers;
mod startup_checks;
mod state;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::fs::OpenOptions;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;

use procwarden::model::{Action, EntityRef};

use cli::{Args, Commands};
use commands::{
    command_act, command_check, command_clean, command_config, command_details, command_export,
    command_generate_testdata, command_policy, command_scan, command_services,
};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{
    actions_handler, health_handler, metrics_handler, policy_handler, process_details_handler,
    root_handler, scan_handler, service_details_handler, unnecessary_services_handler,
};
use state::{AppState, Components};

/// Maps the configured level name onto a filter.
fn level_filter(level: Option<&str>) -> LevelFilter {
    match level.map(str::to_ascii_lowercase).as_deref() {
        Some("off") => LevelFilter::OFF,
        Some("error") => LevelFilter::ERROR,
        Some("warn") => LevelFilter::WARN,
        Some("debug") => LevelFilter::DEBUG,
        Some("trace") => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    }
}

/// Initializes tracing logging subsystem with configured log level.
///
/// Logs go to stderr so command output on stdout stays machine-readable,
/// or to `log_file` when file logging is enabled.
fn setup_logging(config: &Config) {
    let level = level_filter(config.log_level.as_deref());

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    let log_file = config
        .log_file
        .as_ref()
        .filter(|_| config.enable_file_logging.unwrap_or(false));

    let result = match log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => tracing::subscriber::set_global_default(
                builder.with_ansi(false).with_writer(Mutex::new(file)).finish(),
            ),
            Err(e) => {
                eprintln!("❌ Cannot open log file {}: {}", path.display(), e);
                tracing::subscriber::set_global_default(
                    builder.with_writer(std::io::stderr).finish(),
                )
            }
        },
        None => tracing::subscriber::set_global_default(
            builder.with_writer(std::io::stderr).finish(),
        ),
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    debug!("Logging initialized with level: {}", level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Runs the live-host requirement checks; failures are logged, not fatal.
fn check_live_requirements(config: &Config) {
    if config.test_data_file.is_some() {
        return;
    }
    let services = config.scan_services.unwrap_or(true);
    if let Err(e) = startup_checks::validate_requirements(&config.proc_root(), services) {
        warn!("⚠️  Startup validation failed: {}", e);
        warn!("   Scans may be incomplete and actions may be refused");
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.show_user_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        if args.show_config {
            return show_config(&config, args.config_format, false);
        }

        if args.show_user_config {
            return show_config(&config, args.config_format, true);
        }
    }

    let config = load_validated_config(&args)?;
    setup_logging(&config);

    // Configure parallel processing
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .unwrap_or_else(|e| error!("Failed to set rayon thread pool: {}", e));
            debug!("Rayon thread pool configured with {} threads", threads);
        }
    }

    let command = args.command.unwrap_or(Commands::Scan {
        format: cli::OutputFormat::Text,
        verbose: false,
    });

    // Commands that need no snapshot provider
    match command {
        Commands::Config {
            output,
            format,
            commented,
        } => return command_config(output, format, commented),
        Commands::Check {
            proc,
            services,
            all,
        } => return command_check(proc, services, all, &config),
        Commands::Policy { table } => return command_policy(&config.build_registry()?, table),
        Commands::GenerateTestdata {
            output,
            processes,
            services,
        } => return command_generate_testdata(output, processes, services, &config),
        Commands::Serve { port, bind } => {
            run_server(config, port, bind).await?;
            return Ok(());
        }
        _ => {}
    }

    check_live_requirements(&config);
    let components = Components::build(&config)?;

    match command {
        Commands::Scan { format, verbose } => command_scan(&components, format, verbose),
        Commands::Services { stopped_auto } => command_services(&components, stopped_auto),
        Commands::Details { pid, service } => command_details(&components, pid, service),
        Commands::Terminate { pid, force } => {
            let action = if force {
                Action::ForceTerminate
            } else {
                Action::Terminate
            };
            command_act(&components, EntityRef::process(pid), action, force)
        }
        Commands::Stop { service } => {
            command_act(&components, EntityRef::service(service), Action::Stop, false)
        }
        Commands::Start { service } => {
            command_act(&components, EntityRef::service(service), Action::Start, false)
        }
        Commands::Disable { service } => {
            command_act(&components, EntityRef::service(service), Action::Disable, false)
        }
        Commands::Clean { yes } => command_clean(&components, yes),
        Commands::Export { output } => {
            command_export(&components, output.unwrap_or_else(|| config.export_dir()))
        }
        Commands::Config { .. }
        | Commands::Check { .. }
        | Commands::Policy { .. }
        | Commands::GenerateTestdata { .. }
        | Commands::Serve { .. } => Ok(()),
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Serves scans, details and actions over HTTP until a shutdown signal.
async fn run_server(config: Config, port: Option<u16>, bind: Option<IpAddr>) -> anyhow::Result<()> {
    info!("Starting procwarden server");
    check_live_requirements(&config);

    let bind_ip: IpAddr = match bind {
        Some(ip) => ip,
        None => config
            .bind
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDR)
            .parse()
            .context("invalid bind address")?,
    };
    let port = port.or(config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::new(bind_ip, port);

    let components = Components::build(&config)
        .map_err(|e| anyhow::anyhow!("failed to initialize engine: {e}"))?;
    components.warm_up();
    let state = Arc::new(AppState::new(components, config)?);

    // Initial scan so /scan and /metrics have data right away
    info!("Performing initial scan");
    let worker = state.clone();
    let initial = tokio::task::spawn_blocking(move || worker.scan_blocking()).await?;
    match initial {
        Ok(summary) => {
            info!(
                "Initial scan completed: {} issues",
                summary.result.total_issues()
            );
            *state.last_scan.write().await = Some(summary);
        }
        Err(e) => error!("Initial scan failed: {}", e),
    }

    // Configure HTTP server routes
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/scan", get(scan_handler))
        .route("/services/unnecessary", get(unnecessary_services_handler))
        .route("/details/process/{pid}", get(process_details_handler))
        .route("/details/service/{name}", get(service_details_handler))
        .route("/policy", get(policy_handler))
        .route("/actions", post(actions_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state.clone());

    if !bind_ip.is_loopback() {
        warn!("⚠️  Listening on {} - POST /actions is reachable from the network", bind_ip);
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("procwarden listening on http://{}", addr);

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
        }
    }

    info!("procwarden stopped gracefully");
    Ok(())
}
