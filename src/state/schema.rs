//! Database schema definitions.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the oportuna database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Owner accounts (mirrors the auth provider's users)
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY,
    username    TEXT,
    full_name   TEXT,
    role        TEXT NOT NULL DEFAULT 'user',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Published agents
CREATE TABLE IF NOT EXISTS agents (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES profiles(id),
    slug            TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    description     TEXT,
    personality     TEXT,
    interests_json  TEXT NOT NULL DEFAULT '[]',
    facts_json      TEXT NOT NULL DEFAULT '[]',
    system_prompt   TEXT,
    fee_amount      REAL,
    fee_token       TEXT NOT NULL DEFAULT 'ETH',
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Visitor conversations (full message array per row)
CREATE TABLE IF NOT EXISTS agent_conversations (
    id              TEXT PRIMARY KEY,
    agent_id        TEXT NOT NULL REFERENCES agents(id),
    visitor_id      TEXT,
    messages_json   TEXT NOT NULL DEFAULT '[]',
    metadata_json   TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Chat page visits
CREATE TABLE IF NOT EXISTS agent_visits (
    id          TEXT PRIMARY KEY,
    agent_id    TEXT NOT NULL REFERENCES agents(id),
    visitor_ip  TEXT,
    user_agent  TEXT,
    referrer    TEXT,
    created_at  TEXT NOT NULL
);

-- Claimed fee payments
CREATE TABLE IF NOT EXISTS transactions (
    id              TEXT PRIMARY KEY,
    agent_id        TEXT NOT NULL REFERENCES agents(id),
    conversation_id TEXT REFERENCES agent_conversations(id),
    from_address    TEXT NOT NULL,
    amount          REAL NOT NULL,
    token           TEXT NOT NULL DEFAULT 'ETH',
    tx_hash         TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'pending',
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_agents_user ON agents(user_id);
CREATE INDEX IF NOT EXISTS idx_conversations_agent ON agent_conversations(agent_id, created_at);
CREATE INDEX IF NOT EXISTS idx_visits_agent ON agent_visits(agent_id);
CREATE INDEX IF NOT EXISTS idx_transactions_agent ON transactions(agent_id, status);
"#;
