//! Signed HTTP callback delivery: a bounded worker pool and the
//! at-least-once retry driver built on top of it.

mod dispatcher;
mod error;
mod handle;
mod pool;
mod state;

pub use dispatcher::CallbackDispatcher;
pub use error::{DispatchError, DispatchResult};
pub use handle::DispatchHandle;
pub use pool::{PoolError, WorkerPool};
