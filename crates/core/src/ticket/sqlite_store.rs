//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    Amount, NewTicket, Ticket, TicketError, TicketFilter, TicketPatch, TicketStatus, TicketStore,
};
use crate::db::{self, decode_ts, encode_ts};

const COLUMNS: &str =
    "id, code, owner_id, amount_minor, status, expires_at, redeemed_at, created_at, updated_at";

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        let conn = db::open(path).map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn = db::open_in_memory().map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                owner_id TEXT NOT NULL,
                amount_minor INTEGER NOT NULL CHECK (amount_minor > 0),
                status TEXT NOT NULL DEFAULT 'active',
                expires_at TEXT,
                redeemed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_owner ON tickets(owner_id);
            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_expires_at ON tickets(expires_at);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at);
            "#,
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TicketError> {
        self.conn
            .lock()
            .map_err(|_| TicketError::Database("ticket store lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &TicketFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["deleted_at IS NULL"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref owner_id) = filter.owner_id {
            conditions.push("owner_id = ?");
            params.push(Box::new(owner_id.clone()));
        }

        if let Some(ref search) = filter.search {
            // Codes are stored uppercase.
            conditions.push("instr(code, ?) > 0");
            params.push(Box::new(search.trim().to_ascii_uppercase()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let status_str: String = row.get(4)?;
        let status = status_str
            .parse::<TicketStatus>()
            .map_err(|e| conversion_error(4, e))?;

        let amount =
            Amount::from_minor(row.get(3)?).map_err(|e| conversion_error(3, e.to_string()))?;

        Ok(Ticket {
            id: row.get(0)?,
            code: row.get(1)?,
            owner_id: row.get(2)?,
            amount,
            status,
            expires_at: optional_ts(row, 5)?,
            redeemed_at: optional_ts(row, 6)?,
            created_at: required_ts(row, 7)?,
            updated_at: required_ts(row, 8)?,
        })
    }
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn required_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode_ts(&raw).ok_or_else(|| conversion_error(idx, format!("invalid timestamp {:?}", raw)))
}

fn optional_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => decode_ts(&raw)
            .map(Some)
            .ok_or_else(|| conversion_error(idx, format!("invalid timestamp {:?}", raw))),
        None => Ok(None),
    }
}

fn is_code_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("tickets.code")
    )
}

impl TicketStore for SqliteTicketStore {
    fn insert(&self, ticket: NewTicket) -> Result<Ticket, TicketError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        // Match the stored precision so the returned row equals a re-read.
        let now = Utc::now().trunc_subsecs(6);
        let expires_at = ticket.expires_at.map(|ts| ts.trunc_subsecs(6));

        conn.execute(
            "INSERT INTO tickets (id, code, owner_id, amount_minor, status, expires_at, created_at, updated_at) VALUES (?, ?, ?, ?, 'active', ?, ?, ?)",
            params![
                id,
                ticket.code,
                ticket.owner_id,
                ticket.amount.minor_units(),
                expires_at.as_ref().map(encode_ts),
                encode_ts(&now),
                encode_ts(&now),
            ],
        )
        .map_err(|e| {
            if is_code_conflict(&e) {
                TicketError::DuplicateCode(ticket.code.clone())
            } else {
                TicketError::Database(e.to_string())
            }
        })?;

        Ok(Ticket {
            id,
            code: ticket.code,
            owner_id: ticket.owner_id,
            amount: ticket.amount,
            status: TicketStatus::Active,
            expires_at,
            redeemed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn code_exists(&self, code: &str) -> Result<bool, TicketError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tickets WHERE code = ?)",
            params![code],
            |row| row.get(0),
        )
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM tickets WHERE id = ? AND deleted_at IS NULL",
                COLUMNS
            ),
            params![id],
            Self::row_to_ticket,
        )
        .optional()
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn get_by_code(&self, code: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM tickets WHERE code = ? AND deleted_at IS NULL",
                COLUMNS
            ),
            params![code],
            Self::row_to_ticket,
        )
        .optional()
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_ticket)
            .map_err(|e| TicketError::Database(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM tickets {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;
        let now = encode_ts(&now);

        conn.query_row(
            &format!(
                "UPDATE tickets SET status = 'expired', updated_at = ?1 \
                 WHERE id = ?2 AND status = 'active' AND deleted_at IS NULL \
                 AND expires_at IS NOT NULL AND expires_at <= ?1 \
                 RETURNING {}",
                COLUMNS
            ),
            params![now, id],
            Self::row_to_ticket,
        )
        .optional()
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn mark_redeemed(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;
        let now = encode_ts(&now);

        conn.query_row(
            &format!(
                "UPDATE tickets SET status = 'redeemed', redeemed_at = ?1, updated_at = ?1 \
                 WHERE code = ?2 AND status = 'active' AND deleted_at IS NULL \
                 AND (expires_at IS NULL OR expires_at > ?1) \
                 RETURNING {}",
                COLUMNS
            ),
            params![now, code],
            Self::row_to_ticket,
        )
        .optional()
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn update_fields(
        &self,
        id: &str,
        patch: &TicketPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;

        let mut assignments = vec!["updated_at = ?"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(encode_ts(&now))];

        if let Some(amount) = patch.amount {
            assignments.push("amount_minor = ?");
            params.push(Box::new(amount.minor_units()));
        }
        if let Some(expires_at) = patch.expires_at {
            assignments.push("expires_at = ?");
            params.push(Box::new(expires_at.as_ref().map(encode_ts)));
        }
        params.push(Box::new(id.to_string()));

        let sql = format!(
            "UPDATE tickets SET {} WHERE id = ? AND status = 'active' AND deleted_at IS NULL RETURNING {}",
            assignments.join(", "),
            COLUMNS
        );
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), Self::row_to_ticket)
            .optional()
            .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn soft_delete(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Ticket>, TicketError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "UPDATE tickets SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL RETURNING {}",
                COLUMNS
            ),
            params![encode_ts(&now), id],
            Self::row_to_ticket,
        )
        .optional()
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn due_for_expiry(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, TicketError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT id FROM tickets WHERE status = 'active' AND deleted_at IS NULL \
                 AND expires_at IS NOT NULL AND expires_at <= ? ORDER BY expires_at LIMIT ?",
            )
            .map_err(|e| TicketError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![encode_ts(&now), limit], |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| TicketError::Database(e.to_string()))
    }
}
