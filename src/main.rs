use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use coalesce_gateway::api::{ApiServer, ApiState};
use coalesce_gateway::{
    Config, EchoGenerator, HttpResponseGenerator, IngestGateway, LogNotifier, OutboundNotifier,
    ResponseGenerator, WebhookNotifier,
};

/// Coalesce - buffers bursts of chat messages into single replies
#[derive(Parser)]
#[command(name = "coalesce", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "COALESCE_PORT")]
    port: Option<u16>,

    /// Path to a TOML config file
    #[arg(short, long, env = "COALESCE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,coalesce_gateway=info",
        1 => "info,coalesce_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let generator: Arc<dyn ResponseGenerator> = if let Some(url) = &config.generator.url {
        tracing::info!(url = %url, "using HTTP response generator");
        Arc::new(HttpResponseGenerator::new(
            url.clone(),
            config.generator.api_key.clone(),
            config.generator.timeout,
        )?)
    } else {
        tracing::warn!("no generator URL configured, replies will echo the combined text");
        Arc::new(EchoGenerator)
    };

    let notifier: Arc<dyn OutboundNotifier> = if let Some(url) = &config.notifier.url {
        tracing::info!(url = %url, "using webhook notifier");
        Arc::new(WebhookNotifier::new(url.clone(), config.notifier.retry.clone()))
    } else {
        tracing::warn!("no notifier URL configured, replies will only be logged");
        Arc::new(LogNotifier)
    };

    let gateway = Arc::new(IngestGateway::on_current_runtime(
        config.debounce,
        generator,
        notifier,
        Some(config.generator.fallback_reply.clone()),
    ));

    tracing::info!(
        port = config.server.port,
        text_delay_secs = config.debounce.text_delay.as_secs(),
        file_delay_secs = config.debounce.file_delay.as_secs(),
        "starting coalesce gateway"
    );

    let state = Arc::new(ApiState::new(gateway.clone(), config.server.webhook_secret.clone()));
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
        }
    };

    ApiServer::new(state, config.server.port).run(shutdown).await?;

    gateway.shutdown().await;
    Ok(())
}
