use async_trait::async_trait;
use bitcoin::{Block, BlockHash, Transaction, Txid};
use bitcoincore_rpc_async::{Auth, Client};

use super::error::RpcError;
use super::traits::ChainClient;

/// Thin wrapper around [`bitcoincore_rpc_async`]'s [`Client`] (§4.2).
///
/// The only supported [`Auth`] method is [`UserPass`](Auth::UserPass).
#[derive(Debug)]
pub struct BitcoinDClient(Client);

impl BitcoinDClient {
    pub async fn new(url: String, username: String, password: String) -> Result<Self, RpcError> {
        let auth = Auth::UserPass(username, password);
        let client = Client::new(url, auth).await?;
        Ok(BitcoinDClient(client))
    }
}

#[async_trait]
impl ChainClient for BitcoinDClient {
    async fn tip_height(&self) -> Result<u64, RpcError> {
        Ok(self.0.get_block_count().await?)
    }

    async fn block_hash(&self, height: u64) -> Result<BlockHash, RpcError> {
        Ok(self.0.get_block_hash(height).await?)
    }

    async fn block(&self, hash: BlockHash) -> Result<Block, RpcError> {
        Ok(self.0.get_block(hash).await?)
    }

    async fn raw_tx(&self, txid: Txid) -> Result<Transaction, RpcError> {
        Ok(self.0.get_transaction(txid).await?)
    }
}
