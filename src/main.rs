use anyhow::{Context, Result};
use clap::Parser;
use ewfcore::connection::identity::{InMemoryIdentityProvider, Role};
use ewfcore::request::LogReporter;
use ewfcore::web::demo::demo_catalog;
use ewfcore::{AppConfig, AppHost, DatabaseRegistry, RequestEnvironment, router};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ewfcore")]
#[command(about = "Serves the demo pages of the web framework core")]
struct Cli {
    /// JSON configuration file; defaults to a development installation
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Create a user that can sign in on the log-in page
    #[arg(long, requires = "demo_password")]
    demo_email: Option<String>,

    #[arg(long)]
    demo_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config = config.bind_address(bind);
    }

    let identity = Arc::new(InMemoryIdentityProvider::new());
    if let (Some(email), Some(password)) = (&cli.demo_email, &cli.demo_password) {
        identity
            .create_user(email, password, Role::Standard)
            .context("failed to create demo user")?;
        info!(email = %email, "demo user created");
    }

    let databases = DatabaseRegistry::from_configs(&config.databases).context("failed to open databases")?;
    let environment = RequestEnvironment::new(config.installation.clone(), databases)
        .identity(identity.clone())
        .reporter(Arc::new(LogReporter));
    let host = Arc::new(
        AppHost::new(environment, demo_catalog(identity)).with_session_capacity(config.session_capacity),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;

    info!(
        bind_addr = %config.bind_address,
        system = %config.installation.system_name,
        "page host started"
    );

    axum::serve(listener, router(host))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ewfcore=info,tower_http=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "unable to install ctrl+c handler");
        std::future::pending::<()>().await;
    }
}
