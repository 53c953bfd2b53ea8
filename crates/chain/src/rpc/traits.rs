use async_trait::async_trait;
use bitcoin::{Block, BlockHash, Transaction, Txid};

use super::error::RpcError;

/// Read-only abstraction over the node (§4.2). Chain selection
/// (mainnet / testnet / regtest) is fixed at construction time by the
/// implementor.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    async fn tip_height(&self) -> Result<u64, RpcError>;
    async fn block_hash(&self, height: u64) -> Result<BlockHash, RpcError>;
    async fn block(&self, hash: BlockHash) -> Result<Block, RpcError>;
    async fn raw_tx(&self, txid: Txid) -> Result<Transaction, RpcError>;
}
