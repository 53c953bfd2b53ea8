use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct CallbackRow {
    pub id: String,
    pub subscription_id: i64,
    pub txid: String,
    pub amount: i64,
    pub created: DateTime<Utc>,
    pub last_retry: DateTime<Utc>,
    pub retries: u32,
    pub acknowledged: bool,
}

/// A callback row joined with the subscription fields the Dispatcher
/// needs to actually deliver it: the destination URL and the address
/// that feeds into the signature input (§4.10).
#[derive(Debug, Clone)]
pub struct DeliverableCallback {
    pub id: String,
    pub subscription_id: i64,
    pub address: String,
    pub callback_url: String,
    pub txid: String,
    pub amount: i64,
    pub created: DateTime<Utc>,
    pub last_retry: DateTime<Utc>,
    pub retries: u32,
    pub acknowledged: bool,
}
