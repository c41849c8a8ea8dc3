//! Database schema definitions
//!
//! Foreign keys cascade the same way the explicit rollback in
//! `indexer::reorg` deletes, so either path leaves the same state.

pub const CREATE_ADDRESSES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS addresses (
    address TEXT PRIMARY KEY NOT NULL
);
"#;

pub const CREATE_BLOCKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    height INTEGER PRIMARY KEY NOT NULL,
    hash TEXT NOT NULL UNIQUE,
    merkle_root TEXT NOT NULL,
    miner TEXT REFERENCES addresses(address) ON DELETE SET NULL,
    time TEXT NOT NULL,
    tx_count INTEGER NOT NULL,
    size INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blocks_miner ON blocks(miner);
"#;

pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hash TEXT NOT NULL UNIQUE,
    block_height INTEGER REFERENCES blocks(height) ON DELETE CASCADE,
    idx INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions(block_height, idx);
"#;

pub const CREATE_OUTPUTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS outputs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
    out_idx INTEGER NOT NULL,
    value INTEGER NOT NULL,
    address TEXT REFERENCES addresses(address) ON DELETE SET NULL,
    spent BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (transaction_id, out_idx)
);

CREATE INDEX IF NOT EXISTS idx_outputs_address ON outputs(address, spent);
"#;

pub const CREATE_INPUTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inputs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
    spends INTEGER UNIQUE REFERENCES outputs(id) ON DELETE CASCADE,
    coinbase BOOLEAN NOT NULL,
    CHECK ((coinbase AND spends IS NULL) OR (NOT coinbase AND spends IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_inputs_transaction ON inputs(transaction_id);
"#;

pub const CREATE_STREAMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS streams (
    name TEXT PRIMARY KEY NOT NULL,
    createtxid TEXT NOT NULL,
    streamref TEXT NOT NULL,
    open BOOLEAN NOT NULL DEFAULT FALSE,
    details TEXT NOT NULL DEFAULT 'null',
    subscribed BOOLEAN NOT NULL DEFAULT FALSE,
    synchronized BOOLEAN NOT NULL DEFAULT FALSE,
    items INTEGER NOT NULL DEFAULT 0,
    confirmed INTEGER NOT NULL DEFAULT 0,
    keys INTEGER NOT NULL DEFAULT 0,
    publishers INTEGER NOT NULL DEFAULT 0,
    monitor BOOLEAN NOT NULL DEFAULT FALSE,
    public BOOLEAN NOT NULL DEFAULT TRUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS stream_creators (
    stream TEXT NOT NULL REFERENCES streams(name) ON DELETE CASCADE,
    address TEXT NOT NULL REFERENCES addresses(address) ON DELETE CASCADE,
    PRIMARY KEY (stream, address)
);
"#;

pub const CREATE_STREAM_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stream_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    output_id INTEGER NOT NULL UNIQUE REFERENCES outputs(id) ON DELETE CASCADE,
    stream TEXT NOT NULL REFERENCES streams(name) ON DELETE CASCADE,
    time TEXT NOT NULL,
    keys TEXT NOT NULL,
    data TEXT NOT NULL,
    available BOOLEAN NOT NULL DEFAULT TRUE,
    valid BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE INDEX IF NOT EXISTS idx_stream_items_stream ON stream_items(stream, id);

CREATE TABLE IF NOT EXISTS stream_item_publishers (
    item_id INTEGER NOT NULL REFERENCES stream_items(id) ON DELETE CASCADE,
    address TEXT NOT NULL REFERENCES addresses(address) ON DELETE CASCADE,
    PRIMARY KEY (item_id, address)
);
"#;

/// Applied in order by `Database::migrate`.
pub const MIGRATIONS: &[&str] = &[
    CREATE_ADDRESSES_TABLE,
    CREATE_BLOCKS_TABLE,
    CREATE_TRANSACTIONS_TABLE,
    CREATE_OUTPUTS_TABLE,
    CREATE_INPUTS_TABLE,
    CREATE_STREAMS_TABLE,
    CREATE_STREAM_ITEMS_TABLE,
];
