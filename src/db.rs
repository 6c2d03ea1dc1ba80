//! Database module for duet
//!
//! Provides persistence for sessions and their transcripts.

mod schema;

use schema::{SCHEMA, SESSION_COLUMNS};

use crate::ledger::Totals;
use crate::llm::Usage;
use crate::session::{
    display_title, Message, ParticipantBrief, ParticipantConfig, ParticipantSlot, SessionRecord,
    SessionSummary,
};
use crate::state_machine::SessionState;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ==================== Session Operations ====================

    /// Insert a session and any messages it already carries. Inserting an
    /// id that already exists leaves the stored row untouched.
    pub fn insert_session(&self, record: &SessionRecord) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let [p1, p2] = &record.participants;
        tx.execute(
            "INSERT INTO sessions (id, title,
                participant1_name, participant1_model, participant1_prompt,
                participant2_name, participant2_model, participant2_prompt,
                state, next_speaker, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO NOTHING",
            params![
                record.id,
                record.title,
                p1.name,
                p1.model,
                p1.system_prompt,
                p2.name,
                p2.model,
                p2.system_prompt,
                record.state.as_str(),
                record.next_speaker.as_str(),
                format_datetime(record.created_at),
                format_datetime(record.updated_at),
            ],
        )?;
        for message in &record.transcript {
            insert_message(&tx, &record.id, message)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Store a message and refresh the cached aggregates in one transaction.
    /// Re-appending the same sequence number overwrites it.
    pub fn append_message(
        &self,
        session_id: &str,
        message: &Message,
        totals: &Totals,
        next_speaker: ParticipantSlot,
    ) -> DbResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE sessions SET total_tokens = ?2, total_cost = ?3, total_cost_secondary = ?4,
                next_speaker = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                session_id,
                to_sql_int(totals.total_tokens),
                totals.cost.usd,
                totals.cost.eur,
                next_speaker.as_str(),
                format_datetime(message.timestamp),
            ],
        )?;
        if updated == 0 {
            return Err(DbError::SessionNotFound(session_id.to_string()));
        }
        insert_message(&tx, session_id, message)?;
        tx.commit()?;
        Ok(())
    }

    pub fn update_lifecycle(
        &self,
        session_id: &str,
        state: SessionState,
        next_speaker: ParticipantSlot,
    ) -> DbResult<()> {
        let updated = self.conn().execute(
            "UPDATE sessions SET state = ?2, next_speaker = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                session_id,
                state.as_str(),
                next_speaker.as_str(),
                format_datetime(Utc::now())
            ],
        )?;
        require_row(updated, session_id)
    }

    pub fn update_prompts(&self, session_id: &str, prompts: &[String; 2]) -> DbResult<()> {
        let updated = self.conn().execute(
            "UPDATE sessions SET participant1_prompt = ?2, participant2_prompt = ?3, updated_at = ?4
             WHERE id = ?1",
            params![session_id, prompts[0], prompts[1], format_datetime(Utc::now())],
        )?;
        require_row(updated, session_id)
    }

    /// Delete a session and its messages. Returns whether a row existed.
    pub fn delete_session(&self, session_id: &str) -> DbResult<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(deleted > 0)
    }

    /// Session with its full transcript, if stored
    pub fn get_session(&self, session_id: &str) -> DbResult<Option<SessionRecord>> {
        let conn = self.conn();
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.id = ?1");
        let Some(mut record) = conn
            .query_row(&sql, params![session_id], row_to_record)
            .optional()?
        else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT sequence, participant, speaker, text, prompt_tokens, completion_tokens, created_at
             FROM messages WHERE session_id = ?1 ORDER BY sequence ASC",
        )?;
        record.transcript = stmt
            .query_map(params![session_id], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(record))
    }

    /// All sessions, newest first
    pub fn list_sessions(&self) -> DbResult<Vec<SessionSummary>> {
        let conn = self.conn();
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions s ORDER BY s.created_at DESC");
        let mut stmt = conn.prepare(&sql)?;
        let summaries = stmt
            .query_map([], row_to_summary)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// Mark every active session paused (startup recovery)
    pub fn pause_all_active(&self) -> DbResult<usize> {
        let updated = self.conn().execute(
            "UPDATE sessions SET state = 'paused' WHERE state = 'active'",
            [],
        )?;
        Ok(updated)
    }
}

fn insert_message(conn: &Connection, session_id: &str, message: &Message) -> DbResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO messages
            (session_id, sequence, participant, speaker, text, prompt_tokens, completion_tokens, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            session_id,
            to_sql_int(message.sequence),
            message.participant.as_str(),
            message.speaker,
            message.text,
            to_sql_int(message.usage.prompt_tokens),
            to_sql_int(message.usage.completion_tokens),
            format_datetime(message.timestamp),
        ],
    )?;
    Ok(())
}

fn require_row(updated: usize, session_id: &str) -> DbResult<()> {
    if updated == 0 {
        Err(DbError::SessionNotFound(session_id.to_string()))
    } else {
        Ok(())
    }
}

fn participants_from_row(row: &Row<'_>) -> rusqlite::Result<[ParticipantConfig; 2]> {
    Ok([
        ParticipantConfig::new(
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ),
        ParticipantConfig::new(
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
        ),
    ])
}

/// Unknown lifecycle values read back as paused, like active ones
fn state_from_row(row: &Row<'_>) -> rusqlite::Result<SessionState> {
    let raw: String = row.get(8)?;
    Ok(SessionState::parse(&raw).unwrap_or(SessionState::Paused))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let next_speaker: String = row.get(9)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        participants: participants_from_row(row)?,
        transcript: Vec::new(),
        state: state_from_row(row)?,
        next_speaker: ParticipantSlot::parse(&next_speaker).unwrap_or(ParticipantSlot::One),
        created_at: datetime_from_row(row, 13)?,
        updated_at: datetime_from_row(row, 14)?,
    })
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<SessionSummary> {
    let title: Option<String> = row.get(1)?;
    let participants = participants_from_row(row)?;
    Ok(SessionSummary {
        id: row.get(0)?,
        title: display_title(title.as_deref(), &participants[0].name, &participants[1].name),
        participants: participants.map(|p| ParticipantBrief {
            name: p.name,
            model: p.model,
        }),
        state: state_from_row(row)?,
        created_at: datetime_from_row(row, 13)?,
        updated_at: datetime_from_row(row, 14)?,
        message_count: from_sql_int(row.get(15)?),
        total_tokens: from_sql_int(row.get(10)?),
        total_cost: row.get(11)?,
        total_cost_secondary: row.get(12)?,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let participant: String = row.get(1)?;
    Ok(Message {
        sequence: from_sql_int(row.get(0)?),
        participant: ParticipantSlot::parse(&participant).unwrap_or(ParticipantSlot::One),
        speaker: row.get(2)?,
        text: row.get(3)?,
        usage: Usage::new(from_sql_int(row.get(4)?), from_sql_int(row.get(5)?)),
        timestamp: datetime_from_row(row, 6)?,
    })
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Corrupt timestamps surface as errors rather than being replaced
fn datetime_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
