// 🗄️ Record Store - list/create/update/delete catalog records
//
// The engine only sees the `RecordStore` trait. `SqliteStore` is the durable
// implementation (WAL + audit trail); `MemoryStore` keeps everything in a
// Vec and can be told to fail, which is how partial batches are tested.

use crate::value::Fields;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// RECORD
// ============================================================================

/// One persisted catalog entry (identity + values)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identity, never changes
    pub id: String,

    /// Canonical field → value, complete for the schema
    pub fields: Fields,
}

/// Store collaborator. No transactions, no filtering: callers list everything.
pub trait RecordStore {
    fn list_all(&self) -> Result<Vec<Record>>;

    /// Persist a new record and return its identifier
    fn create(&mut self, fields: &Fields) -> Result<String>;

    /// Overwrite every field of an existing record
    fn update(&mut self, id: &str, fields: &Fields) -> Result<()>;

    fn delete(&mut self, id: &str) -> Result<()>;

    /// Note a finished import batch (audit only; stores may ignore it)
    fn record_batch(&mut self, _batch_id: &str, _details: serde_json::Value) {}
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            fields TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| -> Result<Event> {
            Ok(Event {
                event_id,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .with_context(|| format!("bad event timestamp: {timestamp}"))?
                    .with_timezone(&Utc),
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data).context("bad event payload")?,
                actor,
            })
        })
        .collect()
}

/// SQLite-backed store; fields are kept as one JSON object per record
pub struct SqliteStore {
    conn: Connection,
    actor: String,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        log::info!("opened catalog database {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn,
            actor: "catalog".to_string(),
        })
    }

    /// Name recorded as the actor of audit events
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        let json: Option<String> = self
            .conn
            .query_row("SELECT fields FROM records WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;

        json.map(|json| -> Result<Record> {
            Ok(Record {
                id: id.to_string(),
                fields: serde_json::from_str(&json)
                    .with_context(|| format!("corrupt fields for record {id}"))?,
            })
        })
        .transpose()
    }

    pub fn events_for_record(&self, id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, "record", id)
    }

    /// Append an audit event; failures are logged, never fatal
    pub fn record_event(&self, event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value) {
        let event = Event::new(event_type, entity_type, entity_id, data, &self.actor);
        if let Err(e) = insert_event(&self.conn, &event) {
            log::warn!("could not write {} event for {}: {}", event_type, entity_id, e);
        }
    }
}

impl RecordStore for SqliteStore {
    fn list_all(&self) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, fields FROM records ORDER BY seq")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, json)| -> Result<Record> {
                let fields = serde_json::from_str(&json)
                    .with_context(|| format!("corrupt fields for record {id}"))?;
                Ok(Record { id, fields })
            })
            .collect()
    }

    fn create(&mut self, fields: &Fields) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let json = serde_json::to_string(fields)?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO records (id, fields, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![id, json, now],
        )?;

        self.record_event("record_created", "record", &id, serde_json::json!(fields));
        Ok(id)
    }

    fn update(&mut self, id: &str, fields: &Fields) -> Result<()> {
        let json = serde_json::to_string(fields)?;
        let now = Utc::now().to_rfc3339();

        let changed = self.conn.execute(
            "UPDATE records SET fields = ?1, updated_at = ?2 WHERE id = ?3",
            params![json, now, id],
        )?;
        if changed == 0 {
            bail!("record not found: {}", id);
        }

        self.record_event("record_updated", "record", id, serde_json::json!(fields));
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        let changed = self.conn.execute("DELETE FROM records WHERE id = ?1", [id])?;
        if changed == 0 {
            bail!("record not found: {}", id);
        }

        self.record_event("record_deleted", "record", id, serde_json::json!({}));
        Ok(())
    }

    fn record_batch(&mut self, batch_id: &str, details: serde_json::Value) {
        self.record_event("batch_imported", "batch", batch_id, details);
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-process store; optionally fails every write after `fail_after` successes
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Vec<Record>,
    next_id: usize,
    writes: usize,
    fail_after: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes number `n + 1` onward fail
    pub fn failing_after(n: usize) -> Self {
        MemoryStore {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Successful writes so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn check_write(&mut self) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.writes >= limit {
                bail!("store unavailable after {} writes", limit);
            }
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize> {
        match self.records.iter().position(|r| r.id == id) {
            Some(pos) => Ok(pos),
            None => bail!("record not found: {}", id),
        }
    }
}

impl RecordStore for MemoryStore {
    fn list_all(&self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }

    fn create(&mut self, fields: &Fields) -> Result<String> {
        self.check_write()?;
        self.next_id += 1;
        let id = format!("mem-{}", self.next_id);
        self.records.push(Record {
            id: id.clone(),
            fields: fields.clone(),
        });
        self.writes += 1;
        Ok(id)
    }

    fn update(&mut self, id: &str, fields: &Fields) -> Result<()> {
        self.check_write()?;
        let pos = self.position(id)?;
        self.records[pos].fields = fields.clone();
        self.writes += 1;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        self.check_write()?;
        let pos = self.position(id)?;
        self.records.remove(pos);
        self.writes += 1;
        Ok(())
    }
}
