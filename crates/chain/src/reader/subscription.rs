use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use txmon_primitives::{CallbackData, SubscriptionData, Transaction};

use crate::reader::monitor::TransactionMonitor;
use crate::rpc::ChainClient;

/// Keeps the address-keyed and id-keyed subscription indexes in sync
/// with each other and with the monitor's set of watched addresses
/// (§4.4). An address stays registered with the monitor for exactly as
/// long as at least one subscription references it.
pub struct SubscriptionManager {
    subs_by_addr: HashMap<String, HashSet<i64>>,
    subs_by_id: HashMap<i64, SubscriptionData>,
    expirations: BinaryHeap<Reverse<(DateTime<Utc>, i64)>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subs_by_addr: HashMap::new(),
            subs_by_id: HashMap::new(),
            expirations: BinaryHeap::new(),
        }
    }

    /// Rebuilds the indexes from a full load of active subscriptions
    /// (startup recovery), registering every distinct address with the
    /// monitor exactly once.
    pub fn restore<C: ChainClient>(
        &mut self,
        subs: Vec<SubscriptionData>,
        monitor: &mut TransactionMonitor<C>,
    ) {
        for sub in subs {
            self.add_subscription(sub, monitor);
        }
    }

    pub fn add_subscription<C: ChainClient>(
        &mut self,
        sub: SubscriptionData,
        monitor: &mut TransactionMonitor<C>,
    ) {
        monitor.add_addr(sub.address.clone());
        self.subs_by_addr
            .entry(sub.address.clone())
            .or_default()
            .insert(sub.id);
        self.expirations.push(Reverse((sub.expiration, sub.id)));
        self.subs_by_id.insert(sub.id, sub);
    }

    /// Returns `true` if `id` was an active subscription. Un-registers
    /// the address from the monitor only once its last subscription is
    /// gone (§9 fixed bug ii).
    pub fn cancel_subscription<C: ChainClient>(
        &mut self,
        id: i64,
        monitor: &mut TransactionMonitor<C>,
    ) -> bool {
        let Some(sub) = self.subs_by_id.remove(&id) else {
            return false;
        };

        if let Some(ids) = self.subs_by_addr.get_mut(&sub.address) {
            ids.remove(&id);
            if ids.is_empty() {
                self.subs_by_addr.remove(&sub.address);
                monitor.del_addr(&sub.address);
            }
        }
        true
    }

    /// Expires every subscription whose expiration is at or before
    /// `now`, returning the ids that were actually live (heap entries
    /// for already-cancelled subscriptions are discarded silently).
    pub fn sweep_expired<C: ChainClient>(
        &mut self,
        now: DateTime<Utc>,
        monitor: &mut TransactionMonitor<C>,
    ) -> Vec<i64> {
        let mut expired = Vec::new();
        while let Some(&Reverse((when, id))) = self.expirations.peek() {
            if when > now {
                break;
            }
            self.expirations.pop();
            if self.cancel_subscription(id, monitor) {
                expired.push(id);
            }
        }
        expired
    }

    /// Builds one callback per subscription on an address the
    /// transaction actually touches. Addresses present in the
    /// transaction but not in `subs_by_addr` are skipped rather than
    /// creating an empty entry (§9 fixed bug i).
    ///
    /// Matching rule (§4.4): an address that receives in this
    /// transaction (appears in `tout`) is reported at its gross
    /// received amount, gated on the net change being non-zero so an
    /// exact self-send produces no callback; an address that only
    /// spends (`tin` only) is reported at its negated gross spent
    /// amount.
    pub fn transaction_to_callbacks(&self, tx: &Transaction) -> Vec<CallbackData> {
        let mut touched: HashSet<&str> = HashSet::new();
        touched.extend(tx.tout.keys().map(String::as_str));
        touched.extend(tx.tin.keys().map(String::as_str));

        let mut out = Vec::new();
        for addr in touched {
            let Some(ids) = self.subs_by_addr.get(addr) else {
                continue;
            };

            let amount = if let Some(&amount_out) = tx.tout.get(addr) {
                let amount_in = *tx.tin.get(addr).unwrap_or(&0);
                let change = amount_out as i64 - amount_in as i64;
                if change == 0 {
                    continue;
                }
                amount_out as i64
            } else {
                let amount_in = *tx.tin.get(addr).unwrap_or(&0);
                -(amount_in as i64)
            };

            for id in ids {
                let sub = self.subs_by_id.get(id).expect("subs_by_addr/subs_by_id desync");
                out.push(CallbackData::new(sub.clone(), tx.hash.clone(), amount));
            }
        }
        out
    }

    /// Every address with at least one live subscription. Used to
    /// re-register addresses with a freshly reconnected monitor, whose
    /// own `monitored` set starts out empty.
    pub fn monitored_addresses(&self) -> impl Iterator<Item = &str> {
        self.subs_by_addr.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.subs_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs_by_id.is_empty()
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    use async_trait::async_trait;
    use bitcoin::{Block, BlockHash, Network, Txid};

    use super::*;
    use crate::rpc::RpcError;

    struct StubClient;

    #[async_trait]
    impl ChainClient for StubClient {
        async fn tip_height(&self) -> Result<u64, RpcError> {
            Ok(0)
        }
        async fn block_hash(&self, _height: u64) -> Result<BlockHash, RpcError> {
            unimplemented!()
        }
        async fn block(&self, _hash: BlockHash) -> Result<Block, RpcError> {
            unimplemented!()
        }
        async fn raw_tx(&self, _txid: Txid) -> Result<bitcoin::Transaction, RpcError> {
            unimplemented!()
        }
    }

    async fn new_monitor() -> TransactionMonitor<StubClient> {
        TransactionMonitor::new(
            Arc::new(StubClient),
            Network::Bitcoin,
            1,
            0,
            NonZeroUsize::new(4).unwrap(),
        )
        .await
        .unwrap()
    }

    fn sub(id: i64, addr: &str, expiration: DateTime<Utc>) -> SubscriptionData {
        SubscriptionData {
            id,
            address: addr.to_owned(),
            callback_url: "https://example.com/cb".to_owned(),
            expiration,
        }
    }

    #[tokio::test]
    async fn address_unregisters_only_after_last_subscription() {
        let mut monitor = new_monitor().await;
        let mut mgr = SubscriptionManager::new();
        let far = Utc::now() + chrono::Duration::days(30);

        mgr.add_subscription(sub(1, "addrA", far), &mut monitor);
        mgr.add_subscription(sub(2, "addrA", far), &mut monitor);
        assert!(monitor.is_monitored("addrA"));

        mgr.cancel_subscription(1, &mut monitor);
        assert!(monitor.is_monitored("addrA"), "still one live subscriber");

        mgr.cancel_subscription(2, &mut monitor);
        assert!(!monitor.is_monitored("addrA"));
    }

    #[tokio::test]
    async fn untouched_address_in_tx_is_skipped_not_created() {
        let mgr = SubscriptionManager::new();
        let mut tout = HashMap::new();
        tout.insert("unsubscribed".to_owned(), 100u64);
        let tx = Transaction::new("deadbeef".into(), tout, HashMap::new());

        assert!(mgr.transaction_to_callbacks(&tx).is_empty());
    }

    #[tokio::test]
    async fn change_output_reports_gross_received_not_net() {
        let mut monitor = new_monitor().await;
        let mut mgr = SubscriptionManager::new();
        let far = Utc::now() + chrono::Duration::days(30);
        mgr.add_subscription(sub(1, "addrA", far), &mut monitor);

        let mut tin = HashMap::new();
        tin.insert("addrA".to_owned(), 50u64);
        let mut tout = HashMap::new();
        tout.insert("addrA".to_owned(), 47u64);
        tout.insert("other".to_owned(), 3u64);
        let tx = Transaction::new("deadbeef".into(), tout, tin);

        let callbacks = mgr.transaction_to_callbacks(&tx);
        assert_eq!(callbacks.len(), 1);
        assert_eq!(callbacks[0].amount, 47);
    }

    #[tokio::test]
    async fn exact_self_send_produces_no_callback() {
        let mut monitor = new_monitor().await;
        let mut mgr = SubscriptionManager::new();
        let far = Utc::now() + chrono::Duration::days(30);
        mgr.add_subscription(sub(1, "addrA", far), &mut monitor);

        let mut tin = HashMap::new();
        tin.insert("addrA".to_owned(), 50u64);
        let mut tout = HashMap::new();
        tout.insert("addrA".to_owned(), 50u64);
        let tx = Transaction::new("deadbeef".into(), tout, tin);

        assert!(mgr.transaction_to_callbacks(&tx).is_empty());
    }

    #[tokio::test]
    async fn pure_spend_reports_negated_gross_spent() {
        let mut monitor = new_monitor().await;
        let mut mgr = SubscriptionManager::new();
        let far = Utc::now() + chrono::Duration::days(30);
        mgr.add_subscription(sub(1, "addrA", far), &mut monitor);

        let mut tin = HashMap::new();
        tin.insert("addrA".to_owned(), 50u64);
        let mut tout = HashMap::new();
        tout.insert("other".to_owned(), 50u64);
        let tx = Transaction::new("deadbeef".into(), tout, tin);

        let callbacks = mgr.transaction_to_callbacks(&tx);
        assert_eq!(callbacks.len(), 1);
        assert_eq!(callbacks[0].amount, -50);
    }

    #[tokio::test]
    async fn expired_subscription_is_swept_and_unregistered() {
        let mut monitor = new_monitor().await;
        let mut mgr = SubscriptionManager::new();
        let past = Utc::now() - chrono::Duration::seconds(1);

        mgr.add_subscription(sub(9, "addrB", past), &mut monitor);
        let expired = mgr.sweep_expired(Utc::now(), &mut monitor);

        assert_eq!(expired, vec![9]);
        assert!(!monitor.is_monitored("addrB"));
        assert!(mgr.is_empty());
    }
}
