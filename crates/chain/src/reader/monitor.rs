use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use bitcoin::Network;
use txmon_primitives::Transaction;

use crate::reader::cache::TxOutCache;
use crate::rpc::{ChainClient, RpcError};

/// Tracks the addresses of interest and the chain's confirmed
/// frontier, yielding freshly-confirmed transactions one block at a
/// time (§4.3).
pub struct TransactionMonitor<C> {
    client: Arc<C>,
    cache: TxOutCache<C>,
    network: Network,
    confirmations: u32,
    current_block: i64,
    monitored: HashSet<String>,
}

impl<C: ChainClient> TransactionMonitor<C> {
    /// `start_block` follows §4.3's convention: non-negative values are
    /// an absolute height, negative values are an offset from the tip
    /// (`-1` is "start scanning from the current tip"). The resolved
    /// height is clamped to be no lower than genesis.
    pub async fn new(
        client: Arc<C>,
        network: Network,
        confirmations: u32,
        start_block: i64,
        cache_capacity: NonZeroUsize,
    ) -> Result<Self, RpcError> {
        let current_block = if start_block >= 0 {
            start_block
        } else {
            let tip = client.tip_height().await? as i64;
            (tip + start_block + 1).max(0)
        };

        Ok(Self {
            cache: TxOutCache::new(client.clone(), network, cache_capacity),
            client,
            network,
            confirmations,
            current_block,
            monitored: HashSet::new(),
        })
    }

    pub fn current_block(&self) -> i64 {
        self.current_block
    }

    pub fn add_addr(&mut self, addr: String) {
        self.monitored.insert(addr);
    }

    /// No-op if `addr` is not currently monitored (§9: unregistering an
    /// address that was never registered, or was already removed, must
    /// not panic or error).
    pub fn del_addr(&mut self, addr: &str) {
        self.monitored.remove(addr);
    }

    pub fn is_monitored(&self, addr: &str) -> bool {
        self.monitored.contains(addr)
    }

    fn resolve_outputs(&self, tx: &bitcoin::Transaction) -> HashMap<String, u64> {
        let mut tout = HashMap::new();
        for txout in &tx.output {
            if let Ok(addr) = bitcoin::Address::from_script(&txout.script_pubkey, self.network) {
                *tout.entry(addr.to_string()).or_insert(0) += txout.value.to_sat();
            }
        }
        tout
    }

    async fn resolve_inputs(&mut self, tx: &bitcoin::Transaction) -> Result<HashMap<String, u64>, RpcError> {
        let mut tin = HashMap::new();
        if tx.is_coin_base() {
            return Ok(tin);
        }
        for input in &tx.input {
            let prevout = input.previous_output;
            if let Some((addr, value)) = self.cache.txout(prevout.txid, prevout.vout as usize).await? {
                *tin.entry(addr).or_insert(0) += value;
            }
        }
        Ok(tin)
    }

    /// Advances `current_block` by exactly one block if a block at
    /// `current_block + confirmations - 1` already exists on the node
    /// (§4.3 step 2-3), returning the transactions from that newly
    /// confirmed block that touch a monitored address. Returns an empty
    /// vec, leaving `current_block` unchanged, when the chain has not
    /// grown far enough yet.
    pub async fn get_confirmed(&mut self) -> Result<Vec<Transaction>, RpcError> {
        let target = self.current_block + i64::from(self.confirmations) - 1;
        if target < 0 {
            return Ok(vec![]);
        }

        let tip = self.client.tip_height().await? as i64;
        if target > tip {
            return Ok(vec![]);
        }

        let hash = self.client.block_hash(self.current_block as u64).await?;
        let block = self.client.block(hash).await?;

        let mut out = Vec::new();
        for tx in &block.txdata {
            let tout = self.resolve_outputs(tx);
            let tin = self.resolve_inputs(tx).await?;
            let parsed = Transaction::new(tx.compute_txid().to_string(), tout, tin);
            if parsed.touches(&self.monitored) {
                out.push(parsed);
            }
        }

        self.current_block += 1;
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use async_trait::async_trait;
    use bitcoin::{absolute::LockTime, transaction::Version, Amount, Block, BlockHash, ScriptBuf, Txid};
    use bitcoin::hashes::Hash;

    use super::*;

    struct StubClient {
        tip: u64,
        blocks: HashMap<u64, (BlockHash, Block)>,
    }

    #[async_trait]
    impl ChainClient for StubClient {
        async fn tip_height(&self) -> Result<u64, RpcError> {
            Ok(self.tip)
        }
        async fn block_hash(&self, height: u64) -> Result<BlockHash, RpcError> {
            self.blocks
                .get(&height)
                .map(|(h, _)| *h)
                .ok_or_else(|| RpcError::Protocol("no such height".into()))
        }
        async fn block(&self, hash: BlockHash) -> Result<Block, RpcError> {
            self.blocks
                .values()
                .find(|(h, _)| *h == hash)
                .map(|(_, b)| b.clone())
                .ok_or_else(|| RpcError::Protocol("no such block".into()))
        }
        async fn raw_tx(&self, _txid: Txid) -> Result<bitcoin::Transaction, RpcError> {
            Err(RpcError::Protocol("unused in this test".into()))
        }
    }

    fn addr_script() -> ScriptBuf {
        bitcoin::Address::from_str("1BitcoinEaterAddressDontSendf59kuE")
            .unwrap()
            .assume_checked()
            .script_pubkey()
    }

    fn block_with_payment(prev: BlockHash) -> Block {
        let tx = bitcoin::Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![bitcoin::TxOut {
                value: Amount::from_sat(777),
                script_pubkey: addr_script(),
            }],
        };
        Block {
            header: bitcoin::block::Header {
                version: bitcoin::block::Version::from_consensus(1),
                prev_blockhash: prev,
                merkle_root: bitcoin::TxMerkleNode::all_zeros(),
                time: 0,
                bits: bitcoin::CompactTarget::from_consensus(0),
                nonce: 0,
            },
            txdata: vec![tx],
        }
    }

    #[tokio::test]
    async fn waits_for_confirmations_before_advancing() {
        let genesis = BlockHash::all_zeros();
        let h0 = BlockHash::from_byte_array([1u8; 32]);
        let mut blocks = HashMap::new();
        blocks.insert(0u64, (h0, block_with_payment(genesis)));
        let client = Arc::new(StubClient { tip: 0, blocks });

        let mut monitor = TransactionMonitor::new(
            client,
            Network::Bitcoin,
            2,
            0,
            NonZeroUsize::new(16).unwrap(),
        )
        .await
        .unwrap();

        // confirmations = 2 means target = current_block + 1 = 1, but
        // tip is only 0: nothing confirmed yet.
        let txs = monitor.get_confirmed().await.unwrap();
        assert!(txs.is_empty());
        assert_eq!(monitor.current_block(), 0);
    }

    #[tokio::test]
    async fn yields_matching_tx_and_advances_one_block() {
        let genesis = BlockHash::all_zeros();
        let h0 = BlockHash::from_byte_array([1u8; 32]);
        let mut blocks = HashMap::new();
        blocks.insert(0u64, (h0, block_with_payment(genesis)));
        let client = Arc::new(StubClient { tip: 0, blocks });

        let mut monitor = TransactionMonitor::new(
            client,
            Network::Bitcoin,
            1,
            0,
            NonZeroUsize::new(16).unwrap(),
        )
        .await
        .unwrap();

        monitor.add_addr(
            bitcoin::Address::from_str("1BitcoinEaterAddressDontSendf59kuE")
                .unwrap()
                .assume_checked()
                .to_string(),
        );

        let txs = monitor.get_confirmed().await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(monitor.current_block(), 1);
    }
}
