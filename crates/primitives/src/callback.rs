use serde::{Deserialize, Serialize};

use crate::subscription::SubscriptionData;

/// A single (subscription, transaction) notification. `amount`'s sign
/// encodes direction: positive is a net receive, negative a net spend
/// (§4.4's matching rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackData {
    pub id: String,
    pub subscription: SubscriptionData,
    pub txid: String,
    pub amount: i64,
}

impl CallbackData {
    pub fn new(subscription: SubscriptionData, txid: String, amount: i64) -> Self {
        Self {
            id: crate::id::new_callback_id(),
            subscription,
            txid,
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackState {
    Waiting,
    Acknowledged,
    Expired,
}
