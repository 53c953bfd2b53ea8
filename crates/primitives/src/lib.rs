//! Shared value types carried across task and crate boundaries.
//!
//! Everything here is immutable once constructed: these are the values
//! that travel over the command bus between the admission layer, the
//! chain monitor, and the callback dispatcher, so none of them may grow
//! interior mutability.

mod callback;
mod command;
mod id;
mod subscription;
mod transaction;

pub use callback::{CallbackData, CallbackState};
pub use command::{DispatchCommand, MonitorCommand};
pub use id::new_callback_id;
pub use subscription::{SubscriptionData, SubscriptionState};
pub use transaction::Transaction;
