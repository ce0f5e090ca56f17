//! Entry point: initialise logging, bootstrap [`node_runtime::NodeRuntime`]
//! from a default [`node_runtime::NodeConfig`], and run until `ctrl_c`.
//!
//! `main` is the one place in this workspace where `anyhow` is allowed
//! (SPEC_FULL.md §7): every error returned from `bootstrap`/`run` is a
//! typed `NodeError`, collapsed here into a single process-exit diagnostic.

use anyhow::Context;
use node_runtime::{NodeConfig, NodeRuntime};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")?;

    let config = NodeConfig::default();
    tracing::info!(
        genesis_path = %config.genesis_path.display(),
        network_id = config.network.network_id,
        chain_id = config.blockchain.chain_id,
        "starting node"
    );

    let runtime = NodeRuntime::bootstrap(config).context("failed to bootstrap node runtime")?;
    runtime.run().await.context("node runtime exited with an error")?;
    Ok(())
}
