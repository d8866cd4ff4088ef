mod api;
mod learning;
mod queues;
mod routing;
mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use nx_bus::Bus;
use nx_context::ToolCatalogFn;
use nx_domain::config::{Config, ConfigSeverity, CorsConfig};
use nx_identity::IdentityService;
use nx_llm::ProviderRegistry;
use nx_store::MessageStore;
use nx_tools::{ClockTool, EchoTool, ToolRegistry};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use crate::queues::{OwnerQueues, RunQueues};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "nexus", about = "NEXUS conversational-AI orchestrator gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,
    /// Directory for identity records and the message log.
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway server (default).
    Serve,
    /// Validate configuration and report readiness without starting.
    Doctor,
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the crate version.
    Version,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Validate config.toml and report issues.
    Validate,
    /// Print the resolved configuration as JSON.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config), cli.data_dir).await
        }
        Command::Doctor => {
            let config = load_config(&cli.config)?;
            report_validation(&config)
        }
        Command::Config(ConfigCommand::Validate) => {
            let config = load_config(&cli.config)?;
            report_validation(&config)
        }
        Command::Config(ConfigCommand::Show) => {
            let config = load_config(&cli.config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Version => {
            println!("nexus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(source) => Config::load_from_toml(&source).with_context(|| format!("parsing {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn report_validation(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        println!("{issue}");
    }
    let errors = issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count();
    if errors > 0 {
        std::process::exit(1);
    }
    println!("config OK ({} warning(s))", issues.len());
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,nx_gateway=debug")))
        .json()
        .init();
}

async fn run_server(config: Arc<Config>, data_dir: PathBuf) -> anyhow::Result<()> {
    tracing::info!("NEXUS gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!("config validation failed with {} error(s)", issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count());
    }

    std::fs::create_dir_all(&data_dir).context("creating data directory")?;

    let bus = Bus::new();

    let identity = Arc::new(IdentityService::new(data_dir.join("identities")));
    let store = Arc::new(MessageStore::new(data_dir.join("messages.jsonl")));
    nx_store::register(&bus, store.clone());

    let tools = Arc::new(ToolRegistry::new());
    tools.register(Arc::new(EchoTool));
    tools.register(Arc::new(ClockTool));
    nx_tools::register(&bus, tools.clone());
    tracing::info!(tools = tools.snapshot().len(), "tool registry ready");

    let tool_catalog: ToolCatalogFn = {
        let tools = tools.clone();
        Arc::new(move || tools.snapshot())
    };
    nx_context::register(&bus, identity.clone(), store.clone(), tool_catalog, config.memory.history_context_size as usize);

    let llm = Arc::new(ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?);
    if llm.is_empty() {
        tracing::warn!("no LLM providers initialized — /chat will surface provider errors until credentials are configured");
    } else {
        tracing::info!(providers = llm.len(), "LLM provider registry ready");
    }
    nx_llm::register(&bus, llm.clone());

    let active_runs = nx_orchestrator::register(&bus, identity.clone(), config.clone());

    learning::register(&bus, identity.clone(), store.clone(), llm.clone(), config.clone());

    let run_queues = Arc::new(RunQueues::new());
    let owner_queues = Arc::new(OwnerQueues::new());
    routing::register(&bus, run_queues.clone(), owner_queues.clone());

    bus.run_forever();

    let state = AppState {
        config: config.clone(),
        bus,
        identity,
        store,
        active_runs,
        run_queues,
        owner_queues,
    };

    let cors_layer = build_cors_layer(&config.server.cors);

    let max_concurrent = std::env::var("NX_MAX_CONCURRENT_REQUESTS").ok().and_then(|v| v.parse::<usize>().ok()).unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(requests_per_second = rl.requests_per_second, burst_size = rl.burst_size, "per-IP rate limiting enabled");

        GovernorLayer { config: std::sync::Arc::new(gov_config) }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config)");
    }

    let router = api::router(state.clone()).layer(cors_layer).layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "NEXUS gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Builds a [`CorsLayer`] from the configured allowed origins. Origins may
/// end in `:*` to match any port on that host; a literal `"*"` allows all
/// origins.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
