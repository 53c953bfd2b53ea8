pub mod cache;
pub mod monitor;
pub mod subscription;
pub mod task;

pub use cache::TxOutCache;
pub use monitor::TransactionMonitor;
pub use subscription::SubscriptionManager;
pub use task::{connect_with_retry, ChainMonitorTask, Reconnector};
