//! libSQL schema. Every statement is idempotent so it can run on each start.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    wallet TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

CREATE TABLE IF NOT EXISTS system_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS privileged_operations (
    kind TEXT NOT NULL,
    target TEXT NOT NULL,
    actor TEXT,
    state TEXT NOT NULL,
    tx_hash TEXT,
    detail TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (kind, target)
);

CREATE TABLE IF NOT EXISTS votes (
    contract_address TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_votes_owner ON votes(owner);
"#;
