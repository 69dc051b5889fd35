//! SQLite database wrapper with WAL mode and migration support.

use crate::error::StoreError;
use crate::state::schema;
use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;

type Result<T> = std::result::Result<T, StoreError>;

const AGENT_COLUMNS: &str = "id, user_id, slug, name, description, personality, interests_json, \
     facts_json, system_prompt, fee_amount, fee_token, is_active, created_at, updated_at";

const CONVERSATION_COLUMNS: &str =
    "id, agent_id, visitor_id, messages_json, metadata_json, created_at, updated_at";

/// The oportuna record database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Create the schema on first open; refuse files written by a newer build.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn.execute_batch(schema::CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version > schema::SCHEMA_VERSION {
            return Err(StoreError::Backend(format!(
                "database schema v{} is newer than supported v{}",
                version,
                schema::SCHEMA_VERSION
            )));
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    /// Insert or refresh an owner profile.
    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.conn.execute(
            "INSERT INTO profiles (id, username, full_name, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                username = ?2, full_name = ?3, role = ?4, updated_at = ?6",
            params![
                profile.id,
                profile.username,
                profile.full_name,
                profile.role.to_string(),
                ts(&profile.created_at),
                ts(&profile.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn profile(&self, id: &str) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT id, username, full_name, role, created_at, updated_at
                 FROM profiles WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Profile {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        full_name: row.get(2)?,
                        role: parse_col(row, 3)?,
                        created_at: get_ts(row, 4)?,
                        updated_at: get_ts(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    pub fn insert_agent(&self, agent: &Agent) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO agents ({AGENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                agent.id,
                agent.user_id,
                agent.slug,
                agent.name,
                agent.description,
                agent.personality,
                serde_json::to_string(&agent.interests)?,
                serde_json::to_string(&agent.facts)?,
                agent.system_prompt,
                agent.fee_amount,
                agent.fee_token,
                agent.is_active as i32,
                ts(&agent.created_at),
                ts(&agent.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Update an agent, matching on both id and owner.
    ///
    /// Returns `NotFound` when no row belongs to that owner.
    pub fn update_agent(&self, agent: &Agent) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE agents SET
                slug = ?3, name = ?4, description = ?5, personality = ?6,
                interests_json = ?7, facts_json = ?8, system_prompt = ?9,
                fee_amount = ?10, fee_token = ?11, is_active = ?12, updated_at = ?13
             WHERE id = ?1 AND user_id = ?2",
            params![
                agent.id,
                agent.user_id,
                agent.slug,
                agent.name,
                agent.description,
                agent.personality,
                serde_json::to_string(&agent.interests)?,
                serde_json::to_string(&agent.facts)?,
                agent.system_prompt,
                agent.fee_amount,
                agent.fee_token,
                agent.is_active as i32,
                ts(&agent.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("agent {}", agent.id)));
        }
        Ok(())
    }

    pub fn agent_by_slug(&self, slug: &str) -> Result<Option<Agent>> {
        self.agent_where("slug = ?1", slug)
    }

    pub fn agent_by_id(&self, id: &str) -> Result<Option<Agent>> {
        self.agent_where("id = ?1", id)
    }

    fn agent_where(&self, clause: &str, value: &str) -> Result<Option<Agent>> {
        let agent = self
            .conn
            .query_row(
                &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE {clause}"),
                params![value],
                row_to_agent,
            )
            .optional()?;
        Ok(agent)
    }

    /// An owner's agents, newest first.
    pub fn agents_for_owner(&self, user_id: &str) -> Result<Vec<Agent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_agent)?;

        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok(agents)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    pub fn insert_conversation(&self, conv: &Conversation) -> Result<()> {
        let metadata = conv
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            &format!(
                "INSERT INTO agent_conversations ({CONVERSATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            ),
            params![
                conv.id,
                conv.agent_id,
                conv.visitor_id,
                serde_json::to_string(&conv.messages)?,
                metadata,
                ts(&conv.created_at),
                ts(&conv.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Replace the whole message array of a conversation.
    pub fn update_conversation_messages(
        &self,
        id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE agent_conversations SET messages_json = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, serde_json::to_string(messages)?, ts(&updated_at)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }

    /// Most recently created conversation for an agent.
    pub fn latest_conversation(&self, agent_id: &str) -> Result<Option<Conversation>> {
        let conv = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM agent_conversations
                     WHERE agent_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![agent_id],
                row_to_conversation,
            )
            .optional()?;
        Ok(conv)
    }

    /// All conversations for an agent, newest first.
    pub fn conversations_for_agent(&self, agent_id: &str) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM agent_conversations
             WHERE agent_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![agent_id], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            conversations.push(row?);
        }
        Ok(conversations)
    }

    pub fn count_conversations(&self, agent_ids: &[String]) -> Result<u64> {
        self.count_in("agent_conversations", agent_ids)
    }

    // -----------------------------------------------------------------------
    // Visits
    // -----------------------------------------------------------------------

    pub fn record_visit(&self, visit: &AgentVisit) -> Result<()> {
        self.conn.execute(
            "INSERT INTO agent_visits (id, agent_id, visitor_ip, user_agent, referrer, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                visit.id,
                visit.agent_id,
                visit.info.visitor_ip,
                visit.info.user_agent,
                visit.info.referrer,
                ts(&visit.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn count_visits(&self, agent_ids: &[String]) -> Result<u64> {
        self.count_in("agent_visits", agent_ids)
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    pub fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        self.conn.execute(
            "INSERT INTO transactions
                (id, agent_id, conversation_id, from_address, amount, token, tx_hash, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                tx.id,
                tx.agent_id,
                tx.conversation_id,
                tx.from_address,
                tx.amount,
                tx.token,
                tx.tx_hash,
                tx.status.to_string(),
                ts(&tx.created_at),
                ts(&tx.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Amounts of completed transactions for the given agents.
    pub fn completed_amounts(&self, agent_ids: &[String]) -> Result<Vec<f64>> {
        if agent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT amount FROM transactions WHERE status = 'completed' AND agent_id IN ({})",
            placeholders(agent_ids.len())
        ))?;
        let rows = stmt.query_map(params_from_iter(agent_ids.iter()), |row| row.get(0))?;

        let mut amounts = Vec::new();
        for row in rows {
            amounts.push(row?);
        }
        Ok(amounts)
    }

    fn count_in(&self, table: &str, agent_ids: &[String]) -> Result<u64> {
        if agent_ids.is_empty() {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {table} WHERE agent_id IN ({})",
                placeholders(agent_ids.len())
            ),
            params_from_iter(agent_ids.iter()),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_agent(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        slug: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        personality: row.get(5)?,
        interests: json_col(row, 6)?,
        facts: json_col(row, 7)?,
        system_prompt: row.get(8)?,
        fee_amount: row.get(9)?,
        fee_token: row.get(10)?,
        is_active: row.get::<_, i32>(11)? != 0,
        created_at: get_ts(row, 12)?,
        updated_at: get_ts(row, 13)?,
    })
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let metadata: Option<String> = row.get(4)?;
    let metadata = metadata
        .map(|m| serde_json::from_str(&m))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(Conversation {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        visitor_id: row.get(2)?,
        messages: json_col(row, 3)?,
        metadata,
        created_at: get_ts(row, 5)?,
        updated_at: get_ts(row, 6)?,
    })
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}
