//! Remark log: the append-only audit trail embedded in each ticket.
//!
//! Remarks are stored in their own table keyed by `(ticket_id, seq)`, where
//! `seq` is the zero-based insertion index. Rows are only ever inserted;
//! a trigger installed by the store rejects updates, and rows disappear only
//! when their ticket is deleted (`ON DELETE CASCADE`).

use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use triage_common::{Remark, Role, TicketId, TicketStatus};

use crate::errors::{Result, WorkflowError};

pub(crate) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS remarks (
        ticket_id TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
        seq INTEGER NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('Employee', 'DepartmentHead', 'Admin')),
        message TEXT NOT NULL CHECK (length(message) > 0),
        status_at_that_time TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (ticket_id, seq)
    );

    CREATE TRIGGER IF NOT EXISTS remarks_append_only
    BEFORE UPDATE ON remarks
    BEGIN
        SELECT RAISE(ABORT, 'remarks are append-only');
    END;
";

/// Build the remark that accompanies a transition into `status`.
pub fn compose(role: Role, message: &str, status: TicketStatus) -> Result<Remark> {
    if message.trim().is_empty() {
        return Err(WorkflowError::validation(
            "A remark explaining the status change is required",
        ));
    }
    Ok(Remark {
        role,
        message: message.to_string(),
        status_at_that_time: status,
        created_at: Utc::now(),
    })
}

/// Insert `remarks` after the `existing` entries already stored for the ticket.
pub(crate) fn append(
    conn: &Connection,
    ticket_id: &TicketId,
    existing: usize,
    remarks: &[Remark],
) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO remarks (ticket_id, seq, role, message, status_at_that_time, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (offset, remark) in remarks.iter().enumerate() {
        stmt.execute(params![
            ticket_id.as_str(),
            (existing + offset) as i64,
            remark.role.as_str(),
            remark.message,
            remark.status_at_that_time.as_str(),
            format_timestamp(&remark.created_at),
        ])?;
    }
    Ok(())
}

/// All remarks of a ticket in insertion order.
pub(crate) fn load(conn: &Connection, ticket_id: &TicketId) -> Result<Vec<Remark>> {
    let mut stmt = conn.prepare_cached(
        "SELECT role, message, status_at_that_time, created_at
         FROM remarks WHERE ticket_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![ticket_id.as_str()], |row| {
        Ok(RemarkRow {
            role: row.get(0)?,
            message: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;
    let mut remarks = Vec::new();
    for row in rows {
        remarks.push(row?.into_remark()?);
    }
    Ok(remarks)
}

struct RemarkRow {
    role: String,
    message: String,
    status: String,
    created_at: String,
}

impl RemarkRow {
    fn into_remark(self) -> Result<Remark> {
        let role = Role::from_str(&self.role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse remark role")?;
        let status = TicketStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse remark status")?;
        Ok(Remark {
            role,
            message: self.message,
            status_at_that_time: status,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| anyhow::anyhow!("Invalid timestamp '{}': {}", value, e).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_rejects_blank_messages() {
        for message in ["", "   ", "\n\t"] {
            let err = compose(Role::Admin, message, TicketStatus::Closed).unwrap_err();
            assert!(matches!(err, WorkflowError::Validation(_)));
        }
    }

    #[test]
    fn test_compose_records_resulting_status() {
        let remark = compose(Role::DepartmentHead, "investigating", TicketStatus::InProgress)
            .unwrap();
        assert_eq!(remark.role, Role::DepartmentHead);
        assert_eq!(remark.message, "investigating");
        assert_eq!(remark.status_at_that_time, TicketStatus::InProgress);
    }

    #[test]
    fn test_compose_keeps_message_verbatim() {
        let message = "  see log:\n  trace ";
        let remark = compose(Role::Admin, message, TicketStatus::Open).unwrap();
        assert_eq!(remark.message, message);
    }

    #[test]
    fn test_parse_timestamp_round_trips_rfc3339() {
        let now = Utc::now();
        assert_eq!(parse_timestamp(&format_timestamp(&now)).unwrap(), now);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
