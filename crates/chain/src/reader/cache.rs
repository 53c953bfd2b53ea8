use std::num::NonZeroUsize;
use std::sync::Arc;

use bitcoin::{Network, Txid};
use lru::LruCache;

use crate::rpc::{ChainClient, RpcError};

/// One resolved transaction output: the standard address that can
/// spend it and its value. `None` marks a non-standard script
/// (§4.1's `SENTINEL`) — present in the vout-ordered list but
/// unusable for address attribution.
pub type CachedOutput = Option<(String, u64)>;

/// Bounded LRU mapping from txid to its outputs, in vout order (§4.1).
/// Used to resolve an input's previous-output address without
/// re-fetching the whole spending chain.
pub struct TxOutCache<C> {
    client: Arc<C>,
    network: Network,
    cache: LruCache<Txid, Vec<CachedOutput>>,
}

impl<C: ChainClient> TxOutCache<C> {
    pub fn new(client: Arc<C>, network: Network, capacity: NonZeroUsize) -> Self {
        Self {
            client,
            network,
            cache: LruCache::new(capacity),
        }
    }

    fn parse_outputs(&self, tx: &bitcoin::Transaction) -> Vec<CachedOutput> {
        tx.output
            .iter()
            .map(|txout| {
                bitcoin::Address::from_script(&txout.script_pubkey, self.network)
                    .ok()
                    .map(|addr| (addr.to_string(), txout.value.to_sat()))
            })
            .collect()
    }

    /// Resolves output `n` of `txid`, fetching and inserting it if
    /// absent. A present entry is promoted to most-recently-used.
    pub async fn txout(&mut self, txid: Txid, n: usize) -> Result<CachedOutput, RpcError> {
        if let Some(outputs) = self.cache.get(&txid) {
            return Ok(outputs.get(n).cloned().flatten());
        }

        let tx = self.client.raw_tx(txid).await?;
        let outputs = self.parse_outputs(&tx);
        let resolved = outputs.get(n).cloned().flatten();
        self.cache.put(txid, outputs);
        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn purge(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use async_trait::async_trait;
    use bitcoin::{absolute::LockTime, transaction::Version, Amount, BlockHash, ScriptBuf, TxOut};

    use super::*;

    struct StubClient {
        tx: bitcoin::Transaction,
    }

    #[async_trait]
    impl ChainClient for StubClient {
        async fn tip_height(&self) -> Result<u64, RpcError> {
            unimplemented!()
        }
        async fn block_hash(&self, _height: u64) -> Result<BlockHash, RpcError> {
            unimplemented!()
        }
        async fn block(&self, _hash: BlockHash) -> Result<bitcoin::Block, RpcError> {
            unimplemented!()
        }
        async fn raw_tx(&self, _txid: Txid) -> Result<bitcoin::Transaction, RpcError> {
            Ok(self.tx.clone())
        }
    }

    fn p2pkh_script() -> ScriptBuf {
        // Well-known burn address script (P2PKH) used purely as a
        // standard scriptPubKey fixture.
        let addr =
            bitcoin::Address::from_str("1BitcoinEaterAddressDontSendf59kuE").unwrap();
        addr.assume_checked().script_pubkey()
    }

    fn sample_tx() -> bitcoin::Transaction {
        bitcoin::Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![
                TxOut {
                    value: Amount::from_sat(500),
                    script_pubkey: p2pkh_script(),
                },
                TxOut {
                    value: Amount::from_sat(10),
                    script_pubkey: ScriptBuf::new(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn resolves_and_caches() {
        let tx = sample_tx();
        let txid = tx.compute_txid();
        let client = Arc::new(StubClient { tx });
        let mut cache = TxOutCache::new(client, Network::Bitcoin, NonZeroUsize::new(10).unwrap());

        let (addr, value) = cache.txout(txid, 0).await.unwrap().unwrap();
        assert_eq!(value, 500);
        assert!(!addr.is_empty());
        assert_eq!(cache.len(), 1);

        // Non-standard output resolves to None, not an error.
        assert!(cache.txout(txid, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn capacity_is_never_exceeded() {
        let tx = sample_tx();
        let client = Arc::new(StubClient { tx });
        let mut cache = TxOutCache::new(client, Network::Bitcoin, NonZeroUsize::new(1).unwrap());

        let t1 = Txid::from_str(
            "1111111111111111111111111111111111111111111111111111111111111111"
                .get(0..64)
                .unwrap(),
        )
        .unwrap();
        let t2 = Txid::from_str(
            "2222222222222222222222222222222222222222222222222222222222222222"
                .get(0..64)
                .unwrap(),
        )
        .unwrap();

        cache.txout(t1, 0).await.unwrap();
        assert_eq!(cache.len(), 1);
        cache.txout(t2, 0).await.unwrap();
        assert_eq!(cache.len(), 1);
    }
}
