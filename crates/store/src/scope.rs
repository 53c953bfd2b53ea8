use rusqlite::Connection;

use crate::error::StoreError;

/// Wraps a block of work in a transaction: commits on normal exit,
/// rolls back and propagates the error otherwise, and always releases
/// the transaction handle. This is the one path by which the Dispatcher
/// and the Chain Monitor Task write to the store (§4.8).
pub fn with_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&rusqlite::Transaction) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let tx = conn.transaction()?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            // rollback is implicit on drop if commit was never called;
            // we still call it explicitly so failures to roll back
            // surface instead of being swallowed.
            tx.rollback()?;
            Err(err)
        }
    }
}
