use anyhow::Context;
use clap::Parser;
use pokedolar::sources::rate_source_from_config;
use pokedolar::storage::STORAGE_SIGNING_KEY_SECRET;
use pokedolar::{
    EnvSecretStore, Fetcher, GraphApiPlatform, HttpObjectStore, HttpRenderer, HttpTextModel,
    MemoryLedger, PgLedger, PipelineConfig, PokeApiCatalog, PublicationLedger,
    PublicationPipeline, RunOutcome, SecretStore,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Publish today's PokeDolar post if the dollar moved since the last one.
#[derive(Parser, Debug)]
#[command(name = "pokedolar", version, about)]
struct Cli {
    /// Load environment variables from this file instead of `./.env`
    #[arg(long, env = "POKEDOLAR_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Keep the ledger in memory (nothing persists between runs)
    #[arg(long)]
    memory_ledger: bool,

    /// Create the ledger table before running
    #[arg(long)]
    init_schema: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::from_env().context("invalid configuration")?;
    info!(
        "Starting PokeDolar ({:?} rate source, {:?} media)",
        config.rate_source, config.media_kind
    );

    let secrets: Arc<dyn SecretStore> = Arc::new(EnvSecretStore::new());
    let fetcher = Fetcher::new(config.fetch.clone())?;

    let ledger: Arc<dyn PublicationLedger> = if cli.memory_ledger {
        warn!("Using an in-memory ledger; the idempotency gate will not see earlier runs");
        Arc::new(MemoryLedger::new())
    } else {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is required unless --memory-ledger is set")?;
        let ledger = PgLedger::connect(database_url)
            .await
            .context("failed to connect to the ledger database")?;
        if cli.init_schema {
            ledger.ensure_schema().await?;
        }
        Arc::new(ledger)
    };

    let signing_key = secrets.get_secret(STORAGE_SIGNING_KEY_SECRET).await?;
    let storage = HttpObjectStore::new(config.storage_url.clone(), signing_key, &config.fetch)?;
    let platform = GraphApiPlatform::new(
        config.graph_api_url.clone(),
        config.instagram_account_id.clone(),
        &config.fetch,
    )?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; abandoning any pending media poll");
            let _ = cancel_tx.send(true);
        }
    });

    let pipeline = PublicationPipeline::builder(config.clone())
        .rate_source(rate_source_from_config(&config, fetcher.clone(), secrets.clone()))
        .ledger(ledger)
        .catalog(Arc::new(PokeApiCatalog::new(
            config.pokeapi_url.clone(),
            fetcher,
            config.max_descriptions,
        )))
        .text_model(Arc::new(HttpTextModel::new(config.text_model_url.clone(), &config.fetch)?))
        .renderer(Arc::new(HttpRenderer::new(config.renderer_url.clone(), &config.fetch)?))
        .storage(Arc::new(storage))
        .platform(Arc::new(platform))
        .secrets(secrets)
        .cancellation(cancel_rx)
        .build()?;

    if report(pipeline.run().await) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Log the run outcome. A failed run was already logged inside its span, so
/// it only turns into a non-zero exit.
fn report(result: pokedolar::Result<RunOutcome>) -> bool {
    match result {
        Ok(RunOutcome::Skipped { rate, index }) => {
            info!("Nothing published: rate {} (#{}) already posted", rate, index);
            true
        }
        Ok(RunOutcome::Published(record)) => {
            info!(
                "Published #{} {} at rate {}",
                record.pokedex_number, record.pokemon, record.dollar_rate
            );
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pokedolar::PipelineError;

    #[test]
    fn failed_run_is_a_failure_exit() {
        let result = Err(PipelineError::LedgerWrite("disk full".to_string()));
        assert!(!report(result));
    }

    #[test]
    fn skipped_run_is_a_success_exit() {
        let result = Ok(RunOutcome::Skipped {
            rate: "5,23".to_string(),
            index: 523,
        });
        assert!(report(result));
    }
}
