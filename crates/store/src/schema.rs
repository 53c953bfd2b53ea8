pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS subscriptions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    address         TEXT NOT NULL,
    callback_url    TEXT NOT NULL,
    created         TEXT NOT NULL,
    expiration      TEXT NOT NULL,
    state           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS callbacks (
    id              TEXT PRIMARY KEY,
    subscription_id INTEGER NOT NULL REFERENCES subscriptions(id),
    txid            TEXT NOT NULL,
    amount          INTEGER NOT NULL,
    created         TEXT NOT NULL,
    last_retry      TEXT NOT NULL,
    retries         INTEGER NOT NULL,
    acknowledged    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chain_cursor (
    id              INTEGER PRIMARY KEY CHECK (id = 0),
    block_number    INTEGER NOT NULL
);
";
