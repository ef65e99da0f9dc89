//! SQLite schema definition
//!
//! Safe to run on every open: every statement is `IF NOT EXISTS`.
//! `chat_messages.context_id` deliberately has no foreign key, deleting a
//! context leaves historical messages pointing at a dangling id.

pub const SCHEMA: &str = r#"
-- ============================================
-- CONTEXTS
-- ============================================

-- Reusable system prompts, selected by name
CREATE TABLE IF NOT EXISTS contexts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(trim(name)) > 0),
    content TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,              -- RFC 3339, microseconds, UTC
    updated_at TEXT NOT NULL
);

-- ============================================
-- CHAT MESSAGES
-- ============================================

-- One row per completed user/assistant exchange, never updated
CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_message TEXT NOT NULL,
    assistant_message TEXT NOT NULL,
    context_id INTEGER,                    -- advisory, not enforced
    thread_id INTEGER,                     -- grouping key for one session
    timestamp TEXT NOT NULL
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_chat_thread_id ON chat_messages(thread_id);
CREATE INDEX IF NOT EXISTS idx_chat_timestamp ON chat_messages(timestamp);
"#;
