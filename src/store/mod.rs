//! Chat history storage with SQLite
//!
//! Two collections live in one file: reusable contexts (named system
//! prompts) and the chat messages produced by completed turns. Every
//! operation is a single statement, so SQLite applies it atomically.
//!
//! Search uses `LIKE`, which is case-insensitive for ASCII letters and
//! case-sensitive for everything else. Wildcards in the query are escaped,
//! so a search is always a plain substring test.

mod schema;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, types::Type, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use schema::SCHEMA;

pub struct ChatStore {
    conn: Mutex<Connection>,
}

impl ChatStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        info!("Opened chat store at {}", path.display());
        Ok(store)
    }

    /// Open a private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::StorageUnavailable(format!("connection lock poisoned: {}", e)))
    }

    // ============================================
    // CONTEXTS
    // ============================================

    /// Insert a new context and return its id
    pub fn add_context(&self, context: &NewContext) -> Result<i64> {
        if context.name.trim().is_empty() {
            return Err(Error::ConstraintViolation(
                "context name must not be empty".to_string(),
            ));
        }

        let created_at = encode_timestamp(&context.created_at);
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO contexts (name, content, created_at, updated_at) VALUES (?, ?, ?, ?)",
            params![context.name, context.content, created_at, created_at],
        )
        .map_err(|e| match Error::from(e) {
            Error::ConstraintViolation(_) => Error::ConstraintViolation(format!(
                "a context named '{}' already exists",
                context.name
            )),
            other => other,
        })?;

        let id = conn.last_insert_rowid();
        debug!("Added context '{}' with id {}", context.name, id);
        Ok(id)
    }

    /// All contexts, ordered by name
    pub fn get_contexts(&self) -> Result<Vec<Context>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, content, created_at, updated_at FROM contexts ORDER BY name ASC",
        )?;
        let rows = stmt.query_map([], context_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn get_context(&self, id: i64) -> Result<Option<Context>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, name, content, created_at, updated_at FROM contexts WHERE id = ?",
            params![id],
            context_from_row,
        );

        match result {
            Ok(context) => Ok(Some(context)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Exact, case-sensitive name lookup
    pub fn find_context_by_name(&self, name: &str) -> Result<Option<Context>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, name, content, created_at, updated_at FROM contexts WHERE name = ?",
            params![name],
            context_from_row,
        );

        match result {
            Ok(context) => Ok(Some(context)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace `content` and `updated_at` of the row with `context.id`.
    ///
    /// Returns `false` when no such row exists. Name and creation time are
    /// never touched.
    pub fn update_context(&self, context: &Context) -> Result<bool> {
        let affected = self.conn()?.execute(
            "UPDATE contexts SET content = ?, updated_at = ? WHERE id = ?",
            params![
                context.content,
                encode_timestamp(&context.updated_at),
                context.id
            ],
        )?;
        Ok(affected > 0)
    }

    /// Remove a context. Messages referencing it are left as they are.
    pub fn delete_context(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()?
            .execute("DELETE FROM contexts WHERE id = ?", params![id])?;
        Ok(affected > 0)
    }

    // ============================================
    // MESSAGES
    // ============================================

    pub fn add_message(&self, message: &NewChatMessage) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO chat_messages
               (user_message, assistant_message, context_id, thread_id, timestamp)
               VALUES (?, ?, ?, ?, ?)"#,
            params![
                message.user_message,
                message.assistant_message,
                message.context_id,
                message.thread_id,
                encode_timestamp(&message.timestamp),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Messages in chronological order. A `None` filter matches every value,
    /// NULL included.
    pub fn get_messages(&self, filter: &MessageFilter, limit: usize) -> Result<Vec<ChatMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, user_message, assistant_message, context_id, thread_id, timestamp
               FROM chat_messages
               WHERE (?1 IS NULL OR thread_id = ?1)
                 AND (?2 IS NULL OR context_id = ?2)
               ORDER BY timestamp ASC, id ASC
               LIMIT ?3"#,
        )?;

        let rows = stmt.query_map(
            params![filter.thread_id, filter.context_id, sql_limit(limit)],
            message_from_row,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Substring search over messages, newest first
    pub fn search_messages(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let condition = match mode {
            SearchMode::All => {
                r"(m.user_message LIKE ?1 ESCAPE '\' OR m.assistant_message LIKE ?1 ESCAPE '\')"
            }
            SearchMode::UserOnly => r"m.user_message LIKE ?1 ESCAPE '\'",
            SearchMode::AssistantOnly => r"m.assistant_message LIKE ?1 ESCAPE '\'",
        };

        let sql = format!(
            r#"SELECT m.id, m.user_message, m.assistant_message, m.context_id, m.thread_id,
                      m.timestamp, c.name AS context_name
               FROM chat_messages m
               LEFT JOIN contexts c ON m.context_id = c.id
               WHERE {}
               ORDER BY m.timestamp DESC, m.id DESC
               LIMIT ?2"#,
            condition
        );

        let pattern = format!("%{}%", escape_like(query));
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, sql_limit(limit)], |row| {
            Ok(SearchHit {
                message: message_from_row(row)?,
                context_name: row.get(6)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn count_messages(&self) -> Result<i64> {
        let count = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM chat_messages", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Thread of the most recently written message, if any message has one
    pub fn latest_thread_id(&self) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            r#"SELECT thread_id FROM chat_messages
               WHERE thread_id IS NOT NULL
               ORDER BY timestamp DESC, id DESC
               LIMIT 1"#,
            [],
            |row| row.get(0),
        );

        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================
// ROW MAPPING
// ============================================

fn context_from_row(row: &Row) -> rusqlite::Result<Context> {
    Ok(Context {
        id: row.get(0)?,
        name: row.get(1)?,
        content: row.get(2)?,
        created_at: decode_timestamp(row, 3)?,
        updated_at: decode_timestamp(row, 4)?,
    })
}

fn message_from_row(row: &Row) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        user_message: row.get(1)?,
        assistant_message: row.get(2)?,
        context_id: row.get(3)?,
        thread_id: row.get(4)?,
        timestamp: decode_timestamp(row, 5)?,
    })
}

/// Fixed-width text so that string order equals chronological order
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Current time at the precision the store persists
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// ============================================
// ROW TYPES
// ============================================

/// A stored context (named system prompt)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub id: i64,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Context {
    /// Replace the content and bump `updated_at`, never earlier than `created_at`
    pub fn touch(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = now().max(self.created_at);
    }
}

/// A context that has not been stored yet
#[derive(Debug, Clone)]
pub struct NewContext {
    pub name: String,
    pub content: String,
    /// Used for both `created_at` and `updated_at`
    pub created_at: DateTime<Utc>,
}

impl NewContext {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            created_at: now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i64,
    pub user_message: String,
    pub assistant_message: String,
    pub context_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub user_message: String,
    pub assistant_message: String,
    pub context_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Optional column filters for [`ChatStore::get_messages`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFilter {
    pub thread_id: Option<i64>,
    pub context_id: Option<i64>,
}

impl MessageFilter {
    pub fn thread(thread_id: i64) -> Self {
        Self {
            thread_id: Some(thread_id),
            context_id: None,
        }
    }

    pub fn context(context_id: i64) -> Self {
        Self {
            thread_id: None,
            context_id: Some(context_id),
        }
    }
}

/// Which side of the exchange a search looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    All,
    UserOnly,
    AssistantOnly,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::All => "all",
            SearchMode::UserOnly => "user",
            SearchMode::AssistantOnly => "assistant",
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(SearchMode::All),
            "user" | "user-only" => Ok(SearchMode::UserOnly),
            "assistant" | "assistant-only" => Ok(SearchMode::AssistantOnly),
            other => Err(format!(
                "unknown search mode '{}' (expected all, user or assistant)",
                other
            )),
        }
    }
}

/// A search result annotated with the owning context's name
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub message: ChatMessage,
    /// `None` when the message has no context or the context was deleted
    pub context_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn message(user: &str, assistant: &str, thread: Option<i64>, at: i64) -> NewChatMessage {
        NewChatMessage {
            user_message: user.to_string(),
            assistant_message: assistant.to_string(),
            context_id: None,
            thread_id: thread,
            timestamp: ts(at),
        }
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/chat.db");

        let store = ChatStore::open(&path).unwrap();
        store.add_context(&NewContext::new("work", "Be terse")).unwrap();
        drop(store);

        let reopened = ChatStore::open(&path).unwrap();
        assert_eq!(reopened.get_contexts().unwrap().len(), 1);
    }

    #[test]
    fn test_contexts_sorted_by_name() {
        let store = ChatStore::open_in_memory().unwrap();
        let mut ids = vec![];
        for name in ["zeta", "alpha", "mid"] {
            ids.push(store.add_context(&NewContext::new(name, "")).unwrap());
        }

        let contexts = store.get_contexts().unwrap();
        let names: Vec<_> = contexts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);

        let mut stored_ids: Vec<_> = contexts.iter().map(|c| c.id).collect();
        stored_ids.sort();
        ids.sort();
        assert_eq!(stored_ids, ids);
    }

    #[test]
    fn test_get_contexts_empty() {
        let store = ChatStore::open_in_memory().unwrap();
        assert!(store.get_contexts().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_context_name_rejected() {
        let store = ChatStore::open_in_memory().unwrap();
        let id = store.add_context(&NewContext::new("work", "Be terse")).unwrap();

        let err = store
            .add_context(&NewContext::new("work", "Be verbose"))
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));

        let existing = store.get_context(id).unwrap().unwrap();
        assert_eq!(existing.content, "Be terse");
        assert_eq!(store.get_contexts().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_context_name_rejected() {
        let store = ChatStore::open_in_memory().unwrap();
        let err = store.add_context(&NewContext::new("  ", "x")).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
        assert!(store.get_contexts().unwrap().is_empty());
    }

    #[test]
    fn test_add_context_persists_timestamps_verbatim() {
        let store = ChatStore::open_in_memory().unwrap();
        let new = NewContext {
            name: "work".to_string(),
            content: "Be terse".to_string(),
            created_at: ts(42),
        };
        let id = store.add_context(&new).unwrap();

        let context = store.get_context(id).unwrap().unwrap();
        assert_eq!(context.created_at, ts(42));
        assert_eq!(context.updated_at, ts(42));
    }

    #[test]
    fn test_update_context_changes_content_only() {
        let store = ChatStore::open_in_memory().unwrap();
        let new = NewContext {
            name: "work".to_string(),
            content: "Be terse".to_string(),
            created_at: ts(0),
        };
        let id = store.add_context(&new).unwrap();

        let mut context = store.get_context(id).unwrap().unwrap();
        context.name = "renamed".to_string();
        context.content = "Be thorough".to_string();
        context.updated_at = ts(60);
        assert!(store.update_context(&context).unwrap());

        let stored = store.get_contexts().unwrap().remove(0);
        assert_eq!(stored.id, id);
        assert_eq!(stored.name, "work");
        assert_eq!(stored.content, "Be thorough");
        assert_eq!(stored.created_at, ts(0));
        assert_eq!(stored.updated_at, ts(60));
    }

    #[test]
    fn test_update_missing_context_is_noop() {
        let store = ChatStore::open_in_memory().unwrap();
        let ghost = Context {
            id: 999,
            name: "ghost".to_string(),
            content: String::new(),
            created_at: ts(0),
            updated_at: ts(0),
        };
        assert!(!store.update_context(&ghost).unwrap());
        assert!(store.get_contexts().unwrap().is_empty());
    }

    #[test]
    fn test_touch_keeps_updated_after_created() {
        let mut context = Context {
            id: 1,
            name: "future".to_string(),
            content: String::new(),
            created_at: now() + Duration::hours(1),
            updated_at: now() + Duration::hours(1),
        };
        context.touch("new content");
        assert_eq!(context.content, "new content");
        assert!(context.updated_at >= context.created_at);
    }

    #[test]
    fn test_delete_context_leaves_messages_dangling() {
        let store = ChatStore::open_in_memory().unwrap();
        let keep = store.add_context(&NewContext::new("keep", "")).unwrap();
        let doomed = store.add_context(&NewContext::new("doomed", "")).unwrap();

        let mut msg = message("hi", "hello", Some(1), 0);
        msg.context_id = Some(doomed);
        let msg_id = store.add_message(&msg).unwrap();

        assert!(store.delete_context(doomed).unwrap());
        assert!(!store.delete_context(doomed).unwrap());

        let remaining = store.get_contexts().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep);

        let messages = store.get_messages(&MessageFilter::context(doomed), 10).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, msg_id);
        assert_eq!(messages[0].context_id, Some(doomed));

        let hits = store.search_messages("hi", SearchMode::UserOnly, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].context_name.is_none());
    }

    #[test]
    fn test_get_messages_by_thread_ascending() {
        let store = ChatStore::open_in_memory().unwrap();
        store.add_message(&message("second", "b", Some(7), 20)).unwrap();
        store.add_message(&message("first", "a", Some(7), 10)).unwrap();
        store.add_message(&message("other", "c", Some(8), 15)).unwrap();

        let thread = store.get_messages(&MessageFilter::thread(7), 100).unwrap();
        let users: Vec<_> = thread.iter().map(|m| m.user_message.as_str()).collect();
        assert_eq!(users, vec!["first", "second"]);

        let other = store.get_messages(&MessageFilter::thread(9), 100).unwrap();
        assert!(other.is_empty());
    }

    #[test]
    fn test_omitted_filters_match_null_columns() {
        let store = ChatStore::open_in_memory().unwrap();
        store.add_message(&message("no thread", "a", None, 0)).unwrap();
        store.add_message(&message("threaded", "b", Some(1), 1)).unwrap();

        let all = store.get_messages(&MessageFilter::default(), 100).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_get_messages_limit() {
        let store = ChatStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.add_message(&message(&format!("q{}", i), "a", Some(1), i)).unwrap();
        }

        let limited = store.get_messages(&MessageFilter::thread(1), 3).unwrap();
        assert_eq!(limited.len(), 3);
        assert_eq!(limited[0].user_message, "q0");
        assert_eq!(store.count_messages().unwrap(), 5);
    }

    #[test]
    fn test_search_modes() {
        let store = ChatStore::open_in_memory().unwrap();
        store.add_message(&message("foo in question", "plain", None, 0)).unwrap();
        store.add_message(&message("plain", "foo in answer", None, 1)).unwrap();
        store.add_message(&message("nothing", "here", None, 2)).unwrap();

        let user = store.search_messages("foo", SearchMode::UserOnly, 50).unwrap();
        assert_eq!(user.len(), 1);
        assert!(user[0].message.user_message.contains("foo"));

        let assistant = store
            .search_messages("foo", SearchMode::AssistantOnly, 50)
            .unwrap();
        assert_eq!(assistant.len(), 1);
        assert!(assistant[0].message.assistant_message.contains("foo"));

        let all = store.search_messages("foo", SearchMode::All, 50).unwrap();
        assert_eq!(all.len(), 2);
        // Newest first
        assert_eq!(all[0].message.assistant_message, "foo in answer");
        assert_eq!(all[1].message.user_message, "foo in question");
    }

    #[test]
    fn test_search_truncates_to_newest() {
        let store = ChatStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .add_message(&message(&format!("foo {}", i), "a", None, i))
                .unwrap();
        }

        let hits = store.search_messages("foo", SearchMode::All, 2).unwrap();
        let texts: Vec<_> = hits.iter().map(|h| h.message.user_message.as_str()).collect();
        assert_eq!(texts, vec!["foo 4", "foo 3"]);
    }

    #[test]
    fn test_search_is_ascii_case_insensitive() {
        let store = ChatStore::open_in_memory().unwrap();
        store.add_message(&message("Rust Ownership", "ok", None, 0)).unwrap();

        let hits = store.search_messages("rust own", SearchMode::All, 50).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let store = ChatStore::open_in_memory().unwrap();
        store.add_message(&message("100% sure", "a", None, 0)).unwrap();
        store.add_message(&message("1000 sure", "b", None, 1)).unwrap();
        store.add_message(&message("snake_case", "c", None, 2)).unwrap();
        store.add_message(&message("snakeXcase", "d", None, 3)).unwrap();

        let percent = store.search_messages("0%", SearchMode::UserOnly, 50).unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].message.user_message, "100% sure");

        let underscore = store.search_messages("e_c", SearchMode::UserOnly, 50).unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].message.user_message, "snake_case");
    }

    #[test]
    fn test_search_annotates_context_name() {
        let store = ChatStore::open_in_memory().unwrap();
        let work = store.add_context(&NewContext::new("work", "Be terse")).unwrap();
        let mut msg = message("status?", "green", None, 0);
        msg.context_id = Some(work);
        store.add_message(&msg).unwrap();

        let hits = store.search_messages("status", SearchMode::All, 50).unwrap();
        assert_eq!(hits[0].context_name.as_deref(), Some("work"));
    }

    #[test]
    fn test_latest_thread_id() {
        let store = ChatStore::open_in_memory().unwrap();
        assert_eq!(store.latest_thread_id().unwrap(), None);

        store.add_message(&message("a", "a", Some(3), 10)).unwrap();
        store.add_message(&message("b", "b", Some(4), 20)).unwrap();
        store.add_message(&message("c", "c", None, 30)).unwrap();
        assert_eq!(store.latest_thread_id().unwrap(), Some(4));
    }

    #[test]
    fn test_search_mode_parsing() {
        assert_eq!("ALL".parse::<SearchMode>().unwrap(), SearchMode::All);
        assert_eq!("user".parse::<SearchMode>().unwrap(), SearchMode::UserOnly);
        assert_eq!(
            "assistant".parse::<SearchMode>().unwrap(),
            SearchMode::AssistantOnly
        );
        assert!("both".parse::<SearchMode>().is_err());
    }
}
