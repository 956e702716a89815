use std::path::Path;

use clap::Parser;
use kotsadm_rbac::{
    authz::{AccessEngine, pattern::DEEP_WILDCARD},
    build_engine, build_state,
    config::ConsoleConfig,
    observability, routes,
};

const DEFAULT_CONFIG_PATH: &str = "kotsadm-rbac.toml";

#[derive(Parser, Debug)]
#[command(name = "kotsadm-rbac", version, about = "Admin console RBAC service")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file. Built-in defaults are used when the default path
    /// does not exist.
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Evaluate a single access decision against the configured roles
    Check {
        /// Role id held by the caller (repeatable)
        #[arg(short, long = "role", required = true)]
        roles: Vec<String>,
        /// Principal name used to expand groups
        #[arg(short, long)]
        principal: Option<String>,
        /// Action, e.g. "read"
        #[arg(short, long)]
        action: String,
        /// Concrete resource, e.g. "app.my-app.backup."
        #[arg(long)]
        resource: String,
    },
    /// Load the config and build the registry without serving
    Validate,
}

fn load_config(explicit: Option<&str>) -> ConsoleConfig {
    let path = explicit.unwrap_or(DEFAULT_CONFIG_PATH);
    if explicit.is_none() && !Path::new(path).exists() {
        return ConsoleConfig::default();
    }

    match ConsoleConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {path}: {e}");
            std::process::exit(1);
        }
    }
}

fn load_engine(config: &ConsoleConfig) -> AccessEngine {
    match build_engine(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Invalid RBAC configuration: {e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config).await,
        Command::Check {
            roles,
            principal,
            action,
            resource,
        } => run_check(&config, &roles, principal.as_deref(), &action, &resource),
        Command::Validate => run_validate(&config),
    }
}

fn run_check(
    config: &ConsoleConfig,
    roles: &[String],
    principal: Option<&str>,
    action: &str,
    resource: &str,
) {
    let engine = load_engine(config);
    let roles = engine.registry().effective_roles(roles, principal);

    let decision = match engine.authorize(&roles, action, resource) {
        Ok(decision) => decision,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    println!(
        "{} {action} {resource}",
        if decision.allowed { "ALLOW" } else { "DENY" }
    );
    println!("  roles: {}", roles.join(", "));
    if let Some(pattern) = &decision.allow_pattern {
        println!("  best allow: {pattern}");
    }
    if let Some(pattern) = &decision.deny_pattern {
        println!("  best deny:  {pattern}");
    }

    if !decision.allowed {
        std::process::exit(1);
    }
}

fn run_validate(config: &ConsoleConfig) {
    let engine = load_engine(config);
    let registry = engine.registry();

    println!("Configuration is valid");
    println!("  evaluation: {:?}", engine.mode());
    println!(
        "  matcher: {:?} (delimiter '{}')",
        registry.matcher().strategy(),
        registry.matcher().delimiter()
    );
    println!("  roles: {}", registry.role_ids().join(", "));
    println!("  groups: {}", registry.groups().len());
    println!("  sessions: {}", config.sessions.len());

    for group in registry.groups() {
        if group.selector == "*"
            && group.roles.iter().any(|role| {
                registry.role(role).is_some_and(|r| {
                    r.policies
                        .iter()
                        .any(|p| p.patterns().contains(&DEEP_WILDCARD))
                })
            })
        {
            println!("  warning: a group grants '**' patterns to every principal");
        }
    }
}

async fn run_server(config: ConsoleConfig) {
    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    let state = match build_state(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Invalid RBAC configuration");
            std::process::exit(1);
        }
    };

    let app = match routes::router(state) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build routes");
            std::process::exit(1);
        }
    };

    let addr = config.server.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(
        %addr,
        evaluation = ?config.rbac.evaluation,
        matcher = ?config.rbac.matcher,
        roles = config.rbac.roles.len(),
        "Listening"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
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
