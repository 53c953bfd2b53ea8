//! Relational persistence for subscriptions, callbacks, and the chain
//! cursor (§4.8), backed by a single embedded SQLite database file.

mod error;
mod models;
mod schema;
mod scope;

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use txmon_primitives::{SubscriptionData, SubscriptionState};

pub use error::{StoreError, StoreResult};
pub use models::{CallbackRow, DeliverableCallback};

pub struct Store {
    conn: Connection,
}

fn state_to_str(state: SubscriptionState) -> &'static str {
    match state {
        SubscriptionState::Active => "active",
        SubscriptionState::Canceled => "canceled",
        SubscriptionState::Expired => "expired",
        SubscriptionState::Suspended => "suspended",
    }
}

fn str_to_state(s: &str) -> StoreResult<SubscriptionState> {
    match s {
        "active" => Ok(SubscriptionState::Active),
        "canceled" => Ok(SubscriptionState::Canceled),
        "expired" => Ok(SubscriptionState::Expired),
        "suspended" => Ok(SubscriptionState::Suspended),
        other => Err(StoreError::UnknownSubscriptionState(other.to_owned())),
    }
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(schema::CREATE_TABLES)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::CREATE_TABLES)?;
        Ok(Self { conn })
    }

    /// Inserts a new subscription row, assigning its id. Subscription
    /// creation is normally the admission layer's job (out of scope),
    /// but the store exposes the write path for test harnesses and
    /// local tooling.
    pub fn insert_subscription(
        &mut self,
        address: &str,
        callback_url: &str,
        expiration: DateTime<Utc>,
    ) -> StoreResult<SubscriptionData> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO subscriptions (address, callback_url, created, expiration, state)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                address,
                callback_url,
                now.to_rfc3339(),
                expiration.to_rfc3339(),
                state_to_str(SubscriptionState::Active),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(SubscriptionData {
            id,
            address: address.to_owned(),
            callback_url: callback_url.to_owned(),
            expiration,
        })
    }

    /// Loads every subscription currently in the `active` state,
    /// used by the Subscription Manager on startup (§4.4).
    pub fn load_active_subscriptions(&mut self) -> StoreResult<Vec<SubscriptionData>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, address, callback_url, expiration FROM subscriptions WHERE state = ?1",
        )?;
        let rows = stmt.query_map(params![state_to_str(SubscriptionState::Active)], |row| {
            let expiration: String = row.get(3)?;
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, expiration))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, address, callback_url, expiration) = row?;
            let expiration = DateTime::parse_from_rfc3339(&expiration)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            out.push(SubscriptionData {
                id,
                address,
                callback_url,
                expiration,
            });
        }
        Ok(out)
    }

    /// Transactionally marks every id in `ids` as expired. No-op on an
    /// empty slice (§4.4 `sweep_expired`).
    pub fn mark_subscriptions_expired(&mut self, ids: &[i64]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        scope::with_transaction(&mut self.conn, |tx| {
            for id in ids {
                tx.execute(
                    "UPDATE subscriptions SET state = ?1 WHERE id = ?2",
                    params![state_to_str(SubscriptionState::Expired), id],
                )?;
            }
            Ok(())
        })
    }

    pub fn subscription_state(&mut self, id: i64) -> StoreResult<Option<SubscriptionState>> {
        let state: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM subscriptions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        state.map(|s| str_to_state(&s)).transpose()
    }

    pub fn load_chain_cursor(&mut self) -> StoreResult<Option<i64>> {
        let block: Option<i64> = self
            .conn
            .query_row(
                "SELECT block_number FROM chain_cursor WHERE id = 0",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(block)
    }

    pub fn save_chain_cursor(&mut self, block_number: i64) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO chain_cursor (id, block_number) VALUES (0, ?1)
             ON CONFLICT(id) DO UPDATE SET block_number = excluded.block_number",
            params![block_number],
        )?;
        Ok(())
    }

    /// Persists a freshly-generated callback with `retries_max + 1`
    /// attempts available and `last_retry` set far enough in the past
    /// to be immediately eligible for send (§4.7 `new_callback`).
    pub fn insert_callback(
        &mut self,
        id: &str,
        subscription_id: i64,
        txid: &str,
        amount: i64,
        retries: u32,
    ) -> StoreResult<()> {
        let now = Utc::now();
        let immediately_eligible = now - chrono::Duration::days(1);
        self.conn.execute(
            "INSERT INTO callbacks
                (id, subscription_id, txid, amount, created, last_retry, retries, acknowledged)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                id,
                subscription_id,
                txid,
                amount,
                now.to_rfc3339(),
                immediately_eligible.to_rfc3339(),
                retries,
            ],
        )?;
        Ok(())
    }

    pub fn get_callback(&mut self, id: &str) -> StoreResult<Option<CallbackRow>> {
        self.conn
            .query_row(
                "SELECT id, subscription_id, txid, amount, created, last_retry, retries, acknowledged
                 FROM callbacks WHERE id = ?1",
                params![id],
                Self::row_to_callback,
            )
            .optional()
    }

    /// Rows eligible for retry-queue recovery on startup: unacknowledged
    /// with retry budget remaining, ordered by `last_retry` ascending
    /// (§4.7 Recovery).
    pub fn load_recoverable_callbacks(&mut self) -> StoreResult<Vec<CallbackRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subscription_id, txid, amount, created, last_retry, retries, acknowledged
             FROM callbacks
             WHERE acknowledged = 0 AND retries > 0
             ORDER BY last_retry ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_callback)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Same as [`Self::load_recoverable_callbacks`] but joined with the
    /// owning subscription, since delivery needs the destination URL
    /// and address (§4.7 Recovery, §4.10).
    pub fn load_deliverable_recoverable(&mut self) -> StoreResult<Vec<DeliverableCallback>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.subscription_id, s.address, s.callback_url, c.txid, c.amount,
                    c.created, c.last_retry, c.retries, c.acknowledged
             FROM callbacks c JOIN subscriptions s ON s.id = c.subscription_id
             WHERE c.acknowledged = 0 AND c.retries > 0
             ORDER BY c.last_retry ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_deliverable)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Loads one callback row joined with its subscription for
    /// delivery (§4.7 send phase).
    pub fn get_deliverable(&mut self, id: &str) -> StoreResult<Option<DeliverableCallback>> {
        self.conn
            .query_row(
                "SELECT c.id, c.subscription_id, s.address, s.callback_url, c.txid, c.amount,
                        c.created, c.last_retry, c.retries, c.acknowledged
                 FROM callbacks c JOIN subscriptions s ON s.id = c.subscription_id
                 WHERE c.id = ?1",
                params![id],
                Self::row_to_deliverable,
            )
            .optional()
    }

    /// Updates retry bookkeeping after a completed send attempt, in one
    /// write (§4.7 completion phase).
    pub fn update_after_attempt(
        &mut self,
        id: &str,
        retries: u32,
        last_retry: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE callbacks SET retries = ?1, last_retry = ?2 WHERE id = ?3",
            params![retries, last_retry.to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn mark_acknowledged(&mut self, id: &str) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE callbacks SET acknowledged = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    fn row_to_callback(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallbackRow> {
        let created: String = row.get(4)?;
        let last_retry: String = row.get(5)?;
        Ok(CallbackRow {
            id: row.get(0)?,
            subscription_id: row.get(1)?,
            txid: row.get(2)?,
            amount: row.get(3)?,
            created: DateTime::parse_from_rfc3339(&created)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            last_retry: DateTime::parse_from_rfc3339(&last_retry)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            retries: row.get(6)?,
            acknowledged: row.get::<_, i64>(7)? != 0,
        })
    }

    fn row_to_deliverable(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliverableCallback> {
        let created: String = row.get(6)?;
        let last_retry: String = row.get(7)?;
        Ok(DeliverableCallback {
            id: row.get(0)?,
            subscription_id: row.get(1)?,
            address: row.get(2)?,
            callback_url: row.get(3)?,
            txid: row.get(4)?,
            amount: row.get(5)?,
            created: DateTime::parse_from_rfc3339(&created)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            last_retry: DateTime::parse_from_rfc3339(&last_retry)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            retries: row.get(8)?,
            acknowledged: row.get::<_, i64>(9)? != 0,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn subscription_round_trip() {
        let mut store = Store::open_in_memory().unwrap();
        let sub = store
            .insert_subscription("n2Sj...MTzX7", "https://example.com/cb", Utc::now())
            .unwrap();

        let active = store.load_active_subscriptions().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, sub.id);

        store.mark_subscriptions_expired(&[sub.id]).unwrap();
        assert_eq!(
            store.subscription_state(sub.id).unwrap(),
            Some(SubscriptionState::Expired)
        );
        assert!(store.load_active_subscriptions().unwrap().is_empty());
    }

    #[test]
    fn callback_recovery_ordering() {
        let mut store = Store::open_in_memory().unwrap();
        let sub = store
            .insert_subscription("n2Sj...MTzX7", "https://example.com/cb", Utc::now())
            .unwrap();

        store.insert_callback("cb-a", sub.id, "tx-a", 10, 3).unwrap();
        store.insert_callback("cb-b", sub.id, "tx-b", 20, 3).unwrap();

        let older = Utc::now() - chrono::Duration::minutes(5);
        let newer = Utc::now() - chrono::Duration::minutes(1);
        store.update_after_attempt("cb-a", 2, newer).unwrap();
        store.update_after_attempt("cb-b", 2, older).unwrap();

        let recovered = store.load_recoverable_callbacks().unwrap();
        assert_eq!(recovered.len(), 2);
        assert_eq!(recovered[0].id, "cb-b");
        assert_eq!(recovered[1].id, "cb-a");
    }

    #[test]
    fn ack_stops_recovery() {
        let mut store = Store::open_in_memory().unwrap();
        let sub = store
            .insert_subscription("n2Sj...MTzX7", "https://example.com/cb", Utc::now())
            .unwrap();
        store.insert_callback("cb-a", sub.id, "tx-a", 10, 3).unwrap();
        store.mark_acknowledged("cb-a").unwrap();

        assert!(store.load_recoverable_callbacks().unwrap().is_empty());
        assert!(store.get_callback("cb-a").unwrap().unwrap().acknowledged);
    }
}
