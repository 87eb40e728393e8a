use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying audit events
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub ticket_id: Option<String>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_ticket_id(mut self, ticket_id: impl Into<String>) -> Self {
        self.ticket_id = Some(ticket_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for audit event storage
pub trait AuditStore: Send + Sync {
    /// Insert an audit record, returns the assigned ID
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    /// Insert several records at once. Backends that support transactions
    /// should make this all-or-nothing.
    fn insert_batch(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        for record in records {
            self.insert(record)?;
        }
        Ok(())
    }

    /// Query audit records with optional filters, newest first
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Count matching audit records
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}

/// Volatile audit store that keeps records in memory.
///
/// Applies the same filters as the SQLite store. Used by tests and by
/// deployments that only want audit events in the log stream.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    fn matches(filter: &AuditFilter, record: &AuditRecord) -> bool {
        filter
            .ticket_id
            .as_deref()
            .is_none_or(|id| record.ticket_id.as_deref() == Some(id))
            && filter
                .event_type
                .as_deref()
                .is_none_or(|t| record.event_type == t)
            && filter
                .user_id
                .as_deref()
                .is_none_or(|u| record.user_id.as_deref() == Some(u))
            && filter.from.is_none_or(|from| record.timestamp >= from)
            && filter.to.is_none_or(|to| record.timestamp <= to)
    }
}

impl AuditStore for MemoryAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| AuditError::Database("audit store lock poisoned".to_string()))?;
        let id = records.len() as i64 + 1;
        let mut stored = record.clone();
        stored.id = id;
        records.push(stored);
        Ok(id)
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let records = self
            .records
            .lock()
            .map_err(|_| AuditError::Database("audit store lock poisoned".to_string()))?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| Self::matches(filter, r))
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let records = self
            .records
            .lock()
            .map_err(|_| AuditError::Database("audit store lock poisoned".to_string()))?;
        Ok(records.iter().filter(|r| Self::matches(filter, r)).count() as i64)
    }
}
