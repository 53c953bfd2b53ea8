use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::Network;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use txmon_primitives::{DispatchCommand, MonitorCommand};
use txmon_store::Store;

use crate::reader::monitor::TransactionMonitor;
use crate::reader::subscription::SubscriptionManager;
use crate::rpc::{ChainClient, RpcError};

type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A single connection attempt to the node, used to re-establish the
/// Chain Client after it is dropped on a transient error (§4.5 steps
/// 4-5). Unlike [`connect_with_retry`], this makes one attempt per
/// call — the task loop itself supplies the `T_poll` retry cadence.
pub type Reconnector<C> = Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<C>, RpcError>> + Send + Sync>;

/// Drives the Transaction Monitor and Subscription Manager from a
/// single task (§4.5): services the command channel at a 1-second
/// cadence and runs a confirmation poll every `poll_period`, mirroring
/// the two-timescale loop of periodic scan plus responsive commands.
///
/// `monitor` is `None` while disconnected from the node: a transient
/// RPC error drops it rather than killing the task, and the next
/// `poll_period` tick attempts to rebuild it via `reconnect`. Commands
/// that arrive while disconnected are queued in `pending` and replayed
/// once the monitor comes back.
pub struct ChainMonitorTask<C> {
    monitor: Option<TransactionMonitor<C>>,
    subs: SubscriptionManager,
    store: Arc<Mutex<Store>>,
    dispatch_tx: mpsc::Sender<DispatchCommand>,
    poll_period: Duration,
    network: Network,
    confirmations: u32,
    cache_capacity: NonZeroUsize,
    last_block: i64,
    reconnect: Reconnector<C>,
    pending: Vec<MonitorCommand>,
}

impl<C: ChainClient> ChainMonitorTask<C> {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        client: Arc<C>,
        network: Network,
        confirmations: u32,
        start_block: i64,
        cache_capacity: NonZeroUsize,
        poll_period: Duration,
        reload_subscriptions: bool,
        store: Arc<Mutex<Store>>,
        dispatch_tx: mpsc::Sender<DispatchCommand>,
        reconnect: Reconnector<C>,
    ) -> anyhow::Result<Self> {
        let persisted_cursor = store.lock().await.load_chain_cursor()?;
        let effective_start = persisted_cursor.unwrap_or(start_block);

        let mut monitor =
            TransactionMonitor::new(client, network, confirmations, effective_start, cache_capacity)
                .await?;
        let mut subs = SubscriptionManager::new();

        if reload_subscriptions {
            let active = store.lock().await.load_active_subscriptions()?;
            info!(count = active.len(), "restoring active subscriptions");
            subs.restore(active, &mut monitor);
        }

        let last_block = monitor.current_block();

        Ok(Self {
            monitor: Some(monitor),
            subs,
            store,
            dispatch_tx,
            poll_period,
            network,
            confirmations,
            cache_capacity,
            last_block,
            reconnect,
            pending: Vec::new(),
        })
    }

    /// Consumes commands until [`MonitorCommand::Exit`] or until the
    /// channel is dropped, interleaving a confirmation scan every
    /// `poll_period`.
    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<MonitorCommand>) -> anyhow::Result<()> {
        let mut last_poll = tokio::time::Instant::now()
            .checked_sub(self.poll_period)
            .unwrap_or_else(tokio::time::Instant::now);

        loop {
            match tokio::time::timeout(Duration::from_secs(1), cmd_rx.recv()).await {
                Ok(Some(MonitorCommand::NewSubscription(sub))) => {
                    if let Some(monitor) = self.monitor.as_mut() {
                        self.subs.add_subscription(sub, monitor);
                    } else {
                        self.pending.push(MonitorCommand::NewSubscription(sub));
                    }
                }
                Ok(Some(MonitorCommand::CancelSubscription(id))) => {
                    if let Some(monitor) = self.monitor.as_mut() {
                        self.subs.cancel_subscription(id, monitor);
                    } else {
                        self.pending.push(MonitorCommand::CancelSubscription(id));
                    }
                }
                Ok(Some(MonitorCommand::Exit)) => {
                    info!("chain monitor task received exit command");
                    return Ok(());
                }
                Ok(None) => {
                    warn!("chain monitor command channel closed, exiting");
                    return Ok(());
                }
                Err(_elapsed) => {
                    // No command within 1s; fall through to the poll check.
                }
            }

            if last_poll.elapsed() >= self.poll_period {
                if self.monitor.is_none() {
                    self.try_reconnect().await;
                }
                self.poll_once().await?;
                last_poll = tokio::time::Instant::now();
            }
        }
    }

    /// Makes one connection attempt and, on success, rebuilds the
    /// monitor at `last_block`, re-registers every address still live
    /// in the subscription index, and replays commands queued while
    /// disconnected (§4.5 steps 4-5).
    async fn try_reconnect(&mut self) {
        let client = match (self.reconnect)().await {
            Ok(client) => client,
            Err(err) => {
                warn!(%err, "bitcoin node still unreachable");
                return;
            }
        };

        let mut monitor = match TransactionMonitor::new(
            client,
            self.network,
            self.confirmations,
            self.last_block,
            self.cache_capacity,
        )
        .await
        {
            Ok(monitor) => monitor,
            Err(err) => {
                warn!(%err, "failed to reinitialize monitor after reconnect");
                return;
            }
        };

        for addr in self.subs.monitored_addresses() {
            monitor.add_addr(addr.to_owned());
        }
        for cmd in self.pending.drain(..) {
            match cmd {
                MonitorCommand::NewSubscription(sub) => self.subs.add_subscription(sub, &mut monitor),
                MonitorCommand::CancelSubscription(id) => {
                    self.subs.cancel_subscription(id, &mut monitor);
                }
                MonitorCommand::Exit => {}
            }
        }

        info!("reconnected to bitcoin node");
        self.monitor = Some(monitor);
    }

    async fn poll_once(&mut self) -> anyhow::Result<()> {
        let Some(mut monitor) = self.monitor.take() else {
            return Ok(());
        };

        let expired = self.subs.sweep_expired(Utc::now(), &mut monitor);
        if !expired.is_empty() {
            info!(count = expired.len(), "subscriptions expired");
            self.store.lock().await.mark_subscriptions_expired(&expired)?;
        }

        let needs_reconnect = self.drain_confirmed(&mut monitor).await?;
        self.last_block = monitor.current_block();

        if !needs_reconnect {
            self.monitor = Some(monitor);
        }
        Ok(())
    }

    /// Drains every fully-confirmed block available right now,
    /// forwarding generated callbacks to the dispatcher and persisting
    /// the cursor after each block. Returns `true` if a transient RPC
    /// error was hit mid-drain, signaling the caller to drop the
    /// monitor and reconnect on the next tick rather than propagating
    /// the error and killing the task (§7 row 1).
    async fn drain_confirmed(&mut self, monitor: &mut TransactionMonitor<C>) -> anyhow::Result<bool> {
        loop {
            let confirmed = match monitor.get_confirmed().await {
                Ok(confirmed) => confirmed,
                Err(err) => {
                    warn!(%err, "bitcoin node error, dropping connection to reconnect");
                    return Ok(true);
                }
            };
            if confirmed.is_empty() {
                return Ok(false);
            }

            for tx in &confirmed {
                for cb in self.subs.transaction_to_callbacks(tx) {
                    if self.dispatch_tx.send(DispatchCommand::NewCallback(cb)).await.is_err() {
                        warn!("callback dispatcher gone, callback dropped");
                    }
                }
            }

            self.store.lock().await.save_chain_cursor(monitor.current_block())?;
        }
    }
}


/// Reconnects to the node with backoff, retrying on [`RpcError::ConnectionFailed`]
/// and [`RpcError::NodeWarmingUp`] (§4.5's `_connect_bitcoind`). Fails fast on a
/// [`RpcError::Protocol`] error, which indicates a misconfiguration rather than a
/// transient condition.
pub async fn connect_with_retry<F, Fut, C>(mut connect: F, backoff: Duration) -> Result<C, RpcError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<C, RpcError>>,
{
    loop {
        match connect().await {
            Ok(client) => return Ok(client),
            Err(RpcError::ConnectionFailed(msg)) => {
                warn!(%msg, "bitcoin node unreachable, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(RpcError::NodeWarmingUp(msg)) => {
                warn!(%msg, "bitcoin node still warming up, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e @ RpcError::Protocol(_)) => return Err(e),
        }
    }
}
