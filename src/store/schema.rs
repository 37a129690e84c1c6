pub const SCHEMA: &str = r#"
-- Capabilities granted to provider identities (numeric ids). A set exists
-- exactly as long as it has rows.
CREATE TABLE IF NOT EXISTS identity_permissions (
    identity_id INTEGER NOT NULL,
    permission TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (identity_id, permission)
);

-- Fixed-window rate counters, one row per client key. Rows survive process
-- restarts; expired rows are reclaimed by the limiter.
CREATE TABLE IF NOT EXISTS rate_windows (
    client_key TEXT PRIMARY KEY,
    count INTEGER NOT NULL DEFAULT 0,
    reset_at TEXT NOT NULL
);
"#;
