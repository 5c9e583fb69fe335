use anyhow::Context;
use block_indexer::{BlockIndexer, IndexerService};
use chain_explorer::{init_tracing, ExplorerConfig};
use clap::Parser;
use ledger_store::{DatabaseConnection, SqlLedgerStore};
use node_rpc::HttpNodeClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Index a full node's chain into a local address ledger.
#[derive(Debug, Parser)]
#[command(name = "chain-explorer", version)]
struct Cli {
    /// TOML configuration file; `EXPLORER_*` environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = ExplorerConfig::load(cli.config.as_deref()).context("loading configuration")?;
    info!(
        "Starting {} ({}) explorer against node {}",
        config.explorer.coin_name,
        config.explorer.coin_ticker,
        config.node.endpoint()
    );

    let db = DatabaseConnection::new(config.database.clone())
        .await
        .context("opening ledger database")?;
    db.health_check().await.context("checking ledger database")?;
    let store = Arc::new(SqlLedgerStore::new(db).await.context("migrating ledger database")?);

    let node = Arc::new(HttpNodeClient::new(config.node.clone()).context("building node client")?);

    let indexer = Arc::new(BlockIndexer::new(node, store.clone(), config.indexer.clone()).await?);
    let handle = IndexerService::spawn(indexer, config.indexer.poll_interval());

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutting down");

    handle.shutdown().await?;
    store.connection().close().await;

    Ok(())
}
