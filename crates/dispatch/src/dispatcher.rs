use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{SecondsFormat, Utc};
use secp256k1::SecretKey;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use txmon_crypto::{sign_callback, SignableFields};
use txmon_primitives::{CallbackData, DispatchCommand};
use txmon_store::{DeliverableCallback, Store};

use crate::error::DispatchResult;
use crate::pool::{PoolError, WorkerPool};
use crate::state::DispatcherState;

#[derive(Serialize)]
struct SubscriptionRef {
    id: i64,
    address: String,
}

#[derive(Serialize)]
struct CallbackPayload {
    id: String,
    subscription: SubscriptionRef,
    txid: String,
    amount: i64,
    created: String,
    last_retry: String,
    retries: u32,
    acknowledged: bool,
    signature: String,
}

fn build_payload(row: &DeliverableCallback, sk: &SecretKey) -> CallbackPayload {
    let created = row.created.to_rfc3339_opts(SecondsFormat::Secs, true);
    let fields = SignableFields {
        id: &row.id,
        created_iso8601: &created,
        txid_hex: &row.txid,
        address_base58: &row.address,
        amount: row.amount,
    };
    let signature = sign_callback(sk, &fields);

    CallbackPayload {
        id: row.id.clone(),
        subscription: SubscriptionRef {
            id: row.subscription_id,
            address: row.address.clone(),
        },
        txid: row.txid.clone(),
        amount: row.amount,
        created,
        last_retry: row.last_retry.to_rfc3339_opts(SecondsFormat::Secs, true),
        retries: row.retries,
        acknowledged: row.acknowledged,
        signature,
    }
}

/// At-least-once HTTP delivery engine for confirmed-transaction
/// callbacks (§4.7): a driver loop backed by a bounded worker pool,
/// retrying on a fixed period until an explicit [`DispatchCommand::AckCallback`]
/// arrives or the retry budget is exhausted.
pub struct CallbackDispatcher {
    store: Arc<Mutex<Store>>,
    pool: WorkerPool,
    http: reqwest::Client,
    signing_key: SecretKey,
    state: DispatcherState,
    retries_max: u32,
    retry_period: chrono::Duration,
    outcome_tx: mpsc::Sender<String>,
    outcome_rx: mpsc::Receiver<String>,
}

impl CallbackDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        store: Arc<Mutex<Store>>,
        signing_key: SecretKey,
        nthreads: usize,
        queue_size: usize,
        retries_max: u32,
        retry_period_secs: u64,
        recover: bool,
    ) -> DispatchResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(1))
            .build()
            .expect("reqwest client config is static and valid");

        let (outcome_tx, outcome_rx) = mpsc::channel(queue_size.max(1));
        let mut state = DispatcherState::new();

        if recover {
            let recoverable = store.lock().await.load_deliverable_recoverable()?;
            info!(count = recoverable.len(), "recovering pending callbacks");
            for row in recoverable {
                state.push_recovered(row.id, row.retries, row.last_retry);
            }
        }

        Ok(Self {
            store,
            pool: WorkerPool::new(nthreads, queue_size),
            http,
            signing_key,
            state,
            retries_max,
            retry_period: chrono::Duration::seconds(retry_period_secs as i64),
            outcome_tx,
            outcome_rx,
        })
    }

    pub async fn run(mut self, mut cmd_rx: mpsc::Receiver<DispatchCommand>) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(DispatchCommand::NewCallback(data)) => self.new_callback(data).await?,
                        Some(DispatchCommand::AckCallback(id)) => self.ack(&id).await?,
                        Some(DispatchCommand::Exit) | None => {
                            info!("callback dispatcher shutting down");
                            self.pool.close().await;
                            return Ok(());
                        }
                    }
                }
                Some(id) = self.outcome_rx.recv() => {
                    self.handle_completion(&id).await?;
                }
                _ = tokio::time::sleep(StdDuration::from_millis(200)) => {}
            }

            self.send_phase().await?;
        }
    }

    async fn new_callback(&mut self, data: CallbackData) -> anyhow::Result<()> {
        let retries = self.retries_max + 1;
        self.store
            .lock()
            .await
            .insert_callback(&data.id, data.subscription.id, &data.txid, data.amount, retries)?;

        let immediately_eligible = Utc::now() - chrono::Duration::days(1);
        self.state.push_new(data.id, retries, immediately_eligible);
        Ok(())
    }

    async fn ack(&mut self, id: &str) -> anyhow::Result<()> {
        if self.state.ack(id) {
            self.store.lock().await.mark_acknowledged(id)?;
        }
        Ok(())
    }

    /// Drains the retry queue, submitting every due callback to the
    /// worker pool. Stops at the first non-due head, or re-queues the
    /// head and stops if the pool's queue is momentarily full (§4.7
    /// send phase).
    async fn send_phase(&mut self) -> anyhow::Result<()> {
        loop {
            let Some(id) = self.state.pop_ready(self.retry_period, Utc::now()) else {
                break;
            };

            let Some(row) = self.store.lock().await.get_deliverable(&id)? else {
                // Row vanished (should not happen; rows are never
                // deleted), drop it from tracking and move on.
                continue;
            };

            let payload = build_payload(&row, &self.signing_key);
            let http = self.http.clone();
            let url = row.callback_url.clone();
            let outcome_tx = self.outcome_tx.clone();
            let job_id = id.clone();

            let job: crate::pool::Job = Box::pin(async move {
                let _ = http.post(&url).json(&payload).send().await;
                let _ = outcome_tx.send(job_id).await;
            });

            match self.pool.add_job(job) {
                Ok(()) => {}
                Err(PoolError::Full) => {
                    self.state.push_front(id);
                    break;
                }
                Err(PoolError::Closed) => break,
            }
        }
        Ok(())
    }

    async fn handle_completion(&mut self, id: &str) -> anyhow::Result<()> {
        let Some(remaining) = self.state.complete(id, Utc::now()) else {
            // Acknowledged (or never tracked) while the request was
            // in flight: nothing left to do.
            return Ok(());
        };

        if remaining == 0 {
            warn!(%id, "callback retry budget exhausted, giving up");
        }
        self.store.lock().await.update_after_attempt(id, remaining, Utc::now())?;
        Ok(())
    }
}
