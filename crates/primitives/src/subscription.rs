use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A client's registration to be notified of confirmed transactions
/// touching a specific address. Immutable once created except for
/// `state`, which only ever advances away from `Active` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionData {
    pub id: i64,
    pub address: String,
    pub callback_url: String,
    pub expiration: DateTime<Utc>,
}

// Identity is the subscription id: two SubscriptionData values are the
// same subscription iff their ids match, which keeps the Hash/Eq
// contract honest for the `subs_by_addr` address-keyed sets.
impl PartialEq for SubscriptionData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubscriptionData {}

impl std::hash::Hash for SubscriptionData {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Active,
    Canceled,
    Expired,
    Suspended,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionState::Active => "active",
            SubscriptionState::Canceled => "canceled",
            SubscriptionState::Expired => "expired",
            SubscriptionState::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// Default forward horizon for a subscription with no explicit
/// expiration. Must be in the future (§9 fixed bug iii) — a past-dated
/// default silently expires subscriptions on their first poll.
pub fn default_expiration(now: DateTime<Utc>) -> DateTime<Utc> {
    now + chrono::Duration::days(30)
}
