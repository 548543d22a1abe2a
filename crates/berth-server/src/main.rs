//! # berthd
//!
//! Container lifecycle service. Configuration comes from flags or the
//! matching environment variables.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use berth_common::config::{AuthConfig, BerthConfig, EngineBackendKind, EngineConfig};
use berth_common::constants::{
    DEFAULT_API_PREFIX, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_ENGINE_TIMEOUT_SECS,
    DEFAULT_LISTEN_ADDR,
};
use berth_engine::EngineClient;
use berth_server::auth::TokenGate;
use berth_server::{AppState, create_router};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Backend {
    Docker,
    Memory,
}

impl From<Backend> for EngineBackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Docker => Self::Docker,
            Backend::Memory => Self::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Container lifecycle service.
#[derive(Debug, Parser)]
#[command(name = "berthd", version, about)]
struct Args {
    /// Address the HTTP surface binds to.
    #[arg(long, env = "BERTH_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// Prefix for versioned routes.
    #[arg(long, env = "BERTH_API_PREFIX", default_value = DEFAULT_API_PREFIX)]
    api_prefix: String,

    /// Engine backend.
    #[arg(long, env = "BERTH_ENGINE", value_enum, default_value = "docker")]
    engine: Backend,

    /// Engine address; local defaults when unset.
    #[arg(long, env = "DOCKER_HOST")]
    engine_host: Option<String>,

    /// Engine client timeout in seconds.
    #[arg(long, env = "BERTH_ENGINE_TIMEOUT", default_value_t = DEFAULT_ENGINE_TIMEOUT_SECS)]
    engine_timeout: u64,

    /// Deadline around each engine call in seconds.
    #[arg(long, env = "BERTH_CALL_TIMEOUT", default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    call_timeout: u64,

    /// File of `subject:sha256-hex` token lines.
    #[arg(long, env = "BERTH_TOKENS_FILE")]
    tokens_file: Option<PathBuf>,

    /// Single plaintext token granted to `admin`.
    #[arg(long, env = "BERTH_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Log output format.
    #[arg(long, env = "BERTH_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Args {
    fn config(&self) -> BerthConfig {
        BerthConfig {
            listen_addr: self.listen.clone(),
            api_prefix: self.api_prefix.clone(),
            call_timeout_secs: self.call_timeout,
            engine: EngineConfig {
                backend: self.engine.into(),
                host: self.engine_host.clone(),
                timeout_secs: self.engine_timeout,
            },
            auth: AuthConfig {
                tokens_file: self.tokens_file.clone(),
                api_token: self.api_token.clone(),
            },
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.config();
    config.validate().context("invalid configuration")?;

    let gate = TokenGate::from_config(&config.auth).context("cannot load credentials")?;
    tracing::info!(credentials = gate.len(), "token gate ready");

    let engine = EngineClient::connect(&config.engine).context("cannot reach engine")?;
    match engine.ping().await {
        Ok(()) => tracing::info!(backend = engine.backend_name(), "engine reachable"),
        Err(e) => tracing::warn!(backend = engine.backend_name(), error = %e, "engine ping failed"),
    }

    let state = AppState {
        engine,
        gate: Arc::new(gate),
        call_timeout: config.call_timeout(),
    };
    let app = create_router(state, &config.api_prefix);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, prefix = %config.api_prefix, "berthd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}
