pub mod client;
pub mod error;
pub mod traits;

pub use client::BitcoinDClient;
pub use error::RpcError;
pub use traits::ChainClient;
