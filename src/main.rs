use clap::Parser;
use std::sync::Arc;
use tracing::{debug, error, info};

use autoai_scout::config::{ClientConfig, CliArgs, Command};
use autoai_scout::session::{AnalysisSession, RetryPolicy, SharedSession};
use autoai_scout::transport::{AnalysisTransport, HttpTransport, WithDeadline};
use autoai_scout::RequestState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the result JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoai_scout=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    info!("Starting autoai-scout v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_args(&args)?;
    info!("Analysis service: {}", config.api_url);
    info!("Deadline: {:?}, retries: {}", config.timeout, config.max_retries);

    let http = HttpTransport::new(&config)?;
    let transport: Arc<dyn AnalysisTransport> = match config.timeout {
        Some(deadline) => Arc::new(WithDeadline::new(http, deadline)),
        None => Arc::new(http),
    };
    let session = AnalysisSession::new(transport, RetryPolicy::from_config(&config));

    match args.command {
        Command::Analyze { input, include_raw } => {
            run_analyze(&session, &input.join(" "), include_raw).await
        }
        Command::Health => run_health(&session).await,
    }
}

async fn run_analyze(session: &SharedSession, input: &str, include_raw: bool) -> anyhow::Result<()> {
    let handle = match session.submit(input).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Nothing to analyze: {}", e);
            std::process::exit(2);
        }
    };
    handle.await?;

    match session.state() {
        RequestState::Success { request_id, result } => {
            debug!("Printing result of request {}", request_id);
            let mut json = serde_json::to_value(result.as_ref())?;
            if !include_raw {
                if let Some(obj) = json.as_object_mut() {
                    obj.remove("raw");
                }
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        RequestState::Failed { request_id, error } => {
            error!("Request {} failed: {}", request_id, error);
            if let Some(raw) = error.raw_payload() {
                debug!("Payload of failed request {}: {}", request_id, raw);
            }
            eprintln!("{}", error.user_message());
            std::process::exit(1);
        }
        other => {
            anyhow::bail!("Request ended in unexpected state: {}", other.label());
        }
    }
}

async fn run_health(session: &SharedSession) -> anyhow::Result<()> {
    match session.check_health().await {
        Ok(status) => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}
