mod cache;
mod config;
mod error;
mod limiter;
mod model;
mod pipeline;
mod providers;
mod report;
mod risk;
mod scheduler;
mod shutdown;
mod store;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use model::PipelineOutcome;
use providers::{AlpacaMarketData, LlmAnalysisProvider, LlmClient};
use scheduler::Orchestrator;
use store::FileResultStore;

#[derive(Parser, Debug)]
#[command(name = "portfolio_sentinel", about = "AI-assisted portfolio monitoring agent")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Run a single analysis cycle instead of continuous monitoring
    #[arg(long)]
    single: bool,

    /// Analyze one ticker symbol once and exit
    #[arg(long)]
    ticker: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();

    let app_config = match AppConfig::load(&cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Starting Portfolio Sentinel");
    info!(
        "Watching {} instruments, cycle interval {}s, confidence threshold {:.0}%",
        app_config.instruments.len(),
        app_config.update_interval_secs,
        app_config.confidence_threshold
    );
    info!("DISCLAIMER: AI-generated analysis, not professional financial advice.");

    let market = match AlpacaMarketData::new(&app_config.market_data) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let llm_client = match LlmClient::from_config(&app_config.llm) {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let analysis = Arc::new(LlmAnalysisProvider::new(llm_client));
    let store = match FileResultStore::new(app_config.output_dir.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to initialize result store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_handle, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down after in-flight work");
            shutdown_handle.trigger();
        }
    });

    let orchestrator = Orchestrator::new(app_config, market, analysis, store, shutdown);

    if let Some(ticker) = cli.ticker {
        return match orchestrator.run_single_instrument(&ticker).await {
            PipelineOutcome::Persisted(rec) => {
                report::print_recommendation(&rec);
                ExitCode::SUCCESS
            }
            PipelineOutcome::Skipped { reason, detail, .. } => {
                error!("[{}] no recommendation: {} ({})", ticker, reason, detail);
                ExitCode::FAILURE
            }
        };
    }

    if cli.single {
        let summary = orchestrator.run_single().await;
        return if summary.persisted_count() > 0 {
            ExitCode::SUCCESS
        } else {
            error!("single cycle persisted no recommendations");
            ExitCode::FAILURE
        };
    }

    orchestrator.run_continuous().await;
    ExitCode::SUCCESS
}
