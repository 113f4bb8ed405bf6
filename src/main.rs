use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use mealie_mcp::config::{AuthModeKind, Config, ConfigOverrides, LogFormat, TransportKind};
use mealie_mcp::mcp::{serve_http, serve_stdio, HttpState};
use mealie_mcp::startup::{bootstrap, stdio_caller, StartupLogger};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = mealie_mcp::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long)]
    log_level: Option<String>,

    /// Transport to serve (stdio or http)
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Inbound auth mode (none, static, jwt, oauth-proxy, oidc-proxy, remote-oauth)
    #[arg(long)]
    auth: Option<AuthModeKind>,

    /// Exchange caller tokens for delegated recipe API tokens
    #[arg(long)]
    delegation: bool,

    /// Audience requested for delegated tokens
    #[arg(long)]
    audience: Option<String>,

    /// Scopes requested for delegated tokens, comma separated
    #[arg(long, value_delimiter = ',')]
    scopes: Option<Vec<String>>,

    /// Policy decision point URL
    #[arg(long)]
    policy_endpoint: Option<String>,

    /// Fail mutating calls when the client cannot confirm them
    #[arg(long)]
    require_confirmation: bool,

    /// Validate configuration and exit
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            transport: self.transport,
            host: self.host.clone(),
            port: self.port,
            auth_mode: self.auth,
            delegation: self.delegation.then_some(true),
            audience: self.audience.clone(),
            scopes: self.scopes.clone(),
            policy_endpoint: self.policy_endpoint.clone(),
            require_confirmation: self.require_confirmation.then_some(true),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config, cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), LogFormat::Text)?;
            fail_startup(&e)
        }
    };
    init_logging(&config.logging.level, config.logging.format)?;

    let runtime = match bootstrap(config).await {
        Ok(runtime) => runtime,
        Err(e) => fail_startup(&e),
    };

    StartupLogger::display_startup_info(
        &runtime.config,
        &runtime.auth,
        runtime.server.pipeline(),
        runtime.server.catalog().len(),
    );

    if cli.check {
        info!("✅ Configuration is valid");
        return Ok(());
    }

    match runtime.config.server.transport {
        TransportKind::Stdio => {
            let caller = match stdio_caller(&runtime.auth).await {
                Ok(caller) => caller,
                Err(e) => fail_startup(&e),
            };
            serve_stdio(runtime.server.clone(), caller).await?;
        }
        TransportKind::Http => {
            let state = HttpState::new(
                runtime.server.clone(),
                runtime.auth.clone(),
                &runtime.config.public_base_url(),
            );
            serve_http(state, &runtime.config.server.host, runtime.config.server.port).await?;
        }
    }

    Ok(())
}

/// Report a startup failure and exit with status 1
fn fail_startup(error: &mealie_mcp::GatewayError) -> ! {
    error!(kind = error.category(), "Startup failed: {}", error);
    eprintln!("mealie-mcp: {}", error);
    std::process::exit(1)
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr; stdout carries the stdio transport
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}
