use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use plan_snapshot::aggregator::{AggregatorOptions, ExtractionRequest, PlanAggregator};
use plan_snapshot::config::{self, CliArgs, Command, ExtractArgs, ExtractorConfig, ServeArgs};
use plan_snapshot::connection::{ConnectionResolver, StaticResolver};
use plan_snapshot::server;
use plan_snapshot::state::{AppState, SharedState};
use plan_snapshot::transport::HttpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plan_snapshot=info,tower_http=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    info!("Starting plan-snapshot v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Extract(extract_args) => run_extract(extract_args).await,
        Command::Serve(serve_args) => run_serve(serve_args).await,
    }
}

fn build_transport(config: &ExtractorConfig) -> anyhow::Result<HttpTransport> {
    let resolver: Arc<dyn ConnectionResolver> = Arc::new(StaticResolver::from_env(config)?);
    info!("Org URL: {}", config.org_url);
    info!("On-premises: {}", config.on_premises);
    Ok(HttpTransport::new(resolver)?)
}

async fn run_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let config = ExtractorConfig::from_connection_args(args.connection, config::DEFAULT_PORT);
    let transport = build_transport(&config)?;
    let aggregator = PlanAggregator::new(transport, AggregatorOptions::from_config(&config));

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling extraction");
            ctrl_c_cancel.cancel();
        }
    });

    let request = ExtractionRequest::new(args.project, args.plan_id);
    let snapshot = match aggregator.extract(&request, &cancel).await {
        Ok(snapshot) => snapshot,
        Err(failure) => {
            error!("{}", failure);
            return Err(failure.into());
        }
    };

    match args.output {
        Some(path) => {
            snapshot.write_json(&path)?;
            info!("Snapshot written to {:?}", path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(snapshot.to_pretty_json()?.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = ExtractorConfig::from_connection_args(args.connection, args.port);
    let port = config.port;
    let transport = build_transport(&config)?;
    let state = Arc::new(AppState::new(config, Arc::new(transport)));

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    info!("Server shutting down");
    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
    state.cancel_all();
}
