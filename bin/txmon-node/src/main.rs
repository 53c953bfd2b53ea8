use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secp256k1::SecretKey;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use txmon_chain::{connect_with_retry, BitcoinDClient, ChainMonitorTask, Reconnector};
use txmon_common::logging::{self, LoggerConfig};
use txmon_config::{Config, StartBlock};
use txmon_dispatch::CallbackDispatcher;
use txmon_primitives::{DispatchCommand, MonitorCommand};
use txmon_store::Store;

mod args;

use args::Args;

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("txmon-rt")
        .build()
        .context("init: build tokio runtime")?;

    logging::init(LoggerConfig::new("txmon-node".to_owned()));
    let result = runtime.block_on(run(args));
    logging::finalize();
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::load(&args.config).context("loading configuration")?;

    let signing_key = load_signing_key(&config.signing.signkey_path)?;

    let store = Arc::new(Mutex::new(
        Store::open(&config.store.database_path).context("opening store")?,
    ));

    let bitcoind = config.bitcoind.clone();
    let connect_bitcoind = {
        let bitcoind = bitcoind.clone();
        move || {
            let bitcoind = bitcoind.clone();
            async move {
                BitcoinDClient::new(bitcoind.url, bitcoind.rpc_user, bitcoind.rpc_password).await
            }
        }
    };
    let client = connect_with_retry(connect_bitcoind, Duration::from_secs(5))
        .await
        .context("connecting to bitcoin node")?;
    let client = Arc::new(client);

    let reconnect: Reconnector<BitcoinDClient> = Arc::new(move || {
        let bitcoind = bitcoind.clone();
        Box::pin(async move {
            BitcoinDClient::new(bitcoind.url, bitcoind.rpc_user, bitcoind.rpc_password)
                .await
                .map(Arc::new)
        })
    });

    let (monitor_tx, monitor_rx) =
        mpsc::channel::<MonitorCommand>(config.monitor.command_queue_size);
    let (dispatch_tx, dispatch_rx) =
        mpsc::channel::<DispatchCommand>(config.dispatch.queue_size);

    let start_block = match config.monitor.start_block {
        StartBlock::Last => -1,
        StartBlock::Offset(n) => n,
    };

    let chain_task = ChainMonitorTask::new(
        client,
        config.bitcoind.chain,
        config.monitor.confirmations,
        start_block,
        config.monitor.cache_capacity,
        Duration::from_secs(config.monitor.poll_period_secs),
        config.monitor.reload_subscriptions,
        store.clone(),
        dispatch_tx.clone(),
        reconnect,
    )
    .await
    .context("initializing chain monitor")?;

    let dispatcher = CallbackDispatcher::new(
        store.clone(),
        signing_key,
        config.dispatch.nthreads,
        config.dispatch.queue_size,
        config.dispatch.retries,
        config.dispatch.retry_period_secs,
        config.dispatch.recover,
    )
    .await
    .context("initializing callback dispatcher")?;

    let mut chain_handle = tokio::spawn(chain_task.run(monitor_rx));
    let mut dispatch_handle = tokio::spawn(dispatcher.run(dispatch_rx));

    info!("txmon-node started");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        res = &mut chain_handle => {
            warn!(?res, "chain monitor task exited unexpectedly");
        }
        res = &mut dispatch_handle => {
            warn!(?res, "callback dispatcher task exited unexpectedly");
        }
    }

    let _ = monitor_tx.send(MonitorCommand::Exit).await;
    let _ = dispatch_tx.send(DispatchCommand::Exit).await;

    if !chain_handle.is_finished() {
        let _ = chain_handle.await;
    }
    if !dispatch_handle.is_finished() {
        let _ = dispatch_handle.await;
    }

    info!("txmon-node exited");
    Ok(())
}

/// Reads a hex-encoded secp256k1 secret key from `path` (§4.10, §6
/// `signing.signkey_path`).
fn load_signing_key(path: &std::path::Path) -> anyhow::Result<SecretKey> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading signing key file {}", path.display()))?;
    let bytes = hex::decode(raw.trim()).context("signing key file must contain hex")?;
    SecretKey::from_slice(&bytes).context("invalid secp256k1 secret key")
}
