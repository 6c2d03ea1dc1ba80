//! Database schema

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    title TEXT,
    participant1_name TEXT NOT NULL,
    participant1_model TEXT NOT NULL,
    participant1_prompt TEXT NOT NULL,
    participant2_name TEXT NOT NULL,
    participant2_model TEXT NOT NULL,
    participant2_prompt TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'idle',
    next_speaker TEXT NOT NULL DEFAULT 'participant-1',
    total_tokens INTEGER NOT NULL DEFAULT 0,
    total_cost REAL NOT NULL DEFAULT 0,
    total_cost_secondary REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    session_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    participant TEXT NOT NULL,
    speaker TEXT NOT NULL,
    text TEXT NOT NULL,
    prompt_tokens INTEGER NOT NULL DEFAULT 0,
    completion_tokens INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,

    PRIMARY KEY (session_id, sequence),
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);
";

/// Columns selected for a session row, in the order `row_to_*` reads them
pub const SESSION_COLUMNS: &str = "s.id, s.title,
    s.participant1_name, s.participant1_model, s.participant1_prompt,
    s.participant2_name, s.participant2_model, s.participant2_prompt,
    s.state, s.next_speaker, s.total_tokens, s.total_cost, s.total_cost_secondary,
    s.created_at, s.updated_at,
    (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count";
