//! Bitcoin chain access: a read-only RPC client and the confirmation
//! scanning, caching, and subscription bookkeeping built on top of it.

pub mod reader;
pub mod rpc;

pub use reader::{ChainMonitorTask, Reconnector, SubscriptionManager, TransactionMonitor, TxOutCache};
pub use rpc::{BitcoinDClient, ChainClient, RpcError};
