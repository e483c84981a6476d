use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use triage_common::{Priority, RaiserRole, Ticket, TicketId, TicketStatus};

use super::remark::{self, format_timestamp, parse_timestamp};
use super::visibility::TicketFilter;
use crate::errors::{Result, WorkflowError};

const TICKET_COLUMNS: &str = "id, subject, description, category, priority, status, raised_by, \
     raised_by_role, department, forwarded_to_admin, assigned_to, version, created_at, updated_at";

/// Async-safe handle to the ticket store.
///
/// Wraps `TicketDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads. The mutex also serialises every
/// read-modify-write issued from this process.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<Mutex<TicketDb>>,
}

impl DbHandle {
    pub fn new(db: TicketDb) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run a closure with access to the store on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TicketDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| WorkflowError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("Ticket store task panicked")?
    }
}

/// Fields supplied by the raiser of a new ticket.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub subject: String,
    pub category: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub raised_by: String,
    pub raised_by_role: RaiserRole,
    pub department: String,
}

impl NewTicket {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("subject", &self.subject),
            ("category", &self.category),
            ("description", &self.description),
            ("raised_by", &self.raised_by),
        ] {
            if value.trim().is_empty() {
                return Err(WorkflowError::validation(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

/// Durable keyed storage of tickets and their remark logs.
///
/// Every mutation runs inside a single `BEGIN IMMEDIATE` transaction and is
/// committed only if the row's `version` still matches what was read, so a
/// failed or raced mutation leaves no trace.
pub struct TicketDb {
    conn: Connection,
}

impl TicketDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL CHECK (length(subject) > 0),
                description TEXT NOT NULL CHECK (length(description) > 0),
                category TEXT NOT NULL CHECK (length(category) > 0),
                priority TEXT NOT NULL DEFAULT 'Medium'
                    CHECK (priority IN ('Low', 'Medium', 'High', 'Urgent')),
                status TEXT NOT NULL DEFAULT 'Open'
                    CHECK (status IN ('Open', 'In Progress', 'Resolved', 'Closed', 'Reopened')),
                raised_by TEXT NOT NULL,
                raised_by_role TEXT NOT NULL
                    CHECK (raised_by_role IN ('Employee', 'DepartmentHead')),
                department TEXT NOT NULL,
                forwarded_to_admin INTEGER NOT NULL DEFAULT 0,
                assigned_to TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_raised_by ON tickets(raised_by);
            CREATE INDEX IF NOT EXISTS idx_tickets_department
                ON tickets(department, raised_by_role);

            CREATE TRIGGER IF NOT EXISTS tickets_forward_one_way
            BEFORE UPDATE OF forwarded_to_admin ON tickets
            WHEN OLD.forwarded_to_admin = 1 AND NEW.forwarded_to_admin = 0
            BEGIN
                SELECT RAISE(ABORT, 'forwarded_to_admin cannot be reverted');
            END;

            CREATE TRIGGER IF NOT EXISTS tickets_raiser_role_write_once
            BEFORE UPDATE OF raised_by_role ON tickets
            WHEN OLD.raised_by_role <> NEW.raised_by_role
            BEGIN
                SELECT RAISE(ABORT, 'raised_by_role is write-once');
            END;
            ",
        )?;
        self.conn.execute_batch(remark::SCHEMA)?;
        Ok(())
    }

    // ── Ticket CRUD ───────────────────────────────────────────────────

    pub fn create(&self, new: NewTicket) -> Result<Ticket> {
        new.validate()?;
        let now = Utc::now();
        let ticket = Ticket {
            id: TicketId::generate(),
            subject: new.subject,
            description: new.description,
            category: new.category,
            priority: new.priority.unwrap_or_default(),
            status: TicketStatus::Open,
            raised_by: new.raised_by,
            raised_by_role: new.raised_by_role,
            department: new.department,
            forwarded_to_admin: false,
            assigned_to: None,
            comments: vec![],
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.conn.execute(
            "INSERT INTO tickets (id, subject, description, category, priority, status,
                 raised_by, raised_by_role, department, forwarded_to_admin, assigned_to,
                 version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL, 0, ?10, ?10)",
            params![
                ticket.id.as_str(),
                ticket.subject,
                ticket.description,
                ticket.category,
                ticket.priority.as_str(),
                ticket.status.as_str(),
                ticket.raised_by,
                ticket.raised_by_role.as_str(),
                ticket.department,
                format_timestamp(&now),
            ],
        )?;
        Ok(ticket)
    }

    pub fn find(&self, id: &TicketId) -> Result<Option<Ticket>> {
        load_ticket(&self.conn, id)
    }

    pub fn get(&self, id: &TicketId) -> Result<Ticket> {
        self.find(id)?.ok_or_else(|| WorkflowError::not_found(id))
    }

    /// Tickets matching `filter`, oldest first.
    pub fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(raised_by) = &filter.raised_by {
            values.push(Value::Text(raised_by.clone()));
            clauses.push(format!("raised_by = ?{}", values.len()));
        }
        if let Some(role) = filter.raised_by_role {
            values.push(Value::Text(role.as_str().to_string()));
            clauses.push(format!("raised_by_role = ?{}", values.len()));
        }
        if let Some(department) = &filter.department {
            values.push(Value::Text(department.clone()));
            clauses.push(format!("department = ?{}", values.len()));
        }
        if let Some(forwarded) = filter.forwarded_to_admin {
            values.push(Value::Integer(forwarded as i64));
            clauses.push(format!("forwarded_to_admin = ?{}", values.len()));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM tickets {} ORDER BY created_at, id",
            TICKET_COLUMNS, where_clause
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), TicketRow::from_row)?;
        let mut tickets = Vec::new();
        for row in rows {
            let mut ticket = row?.into_ticket()?;
            ticket.comments = remark::load(&self.conn, &ticket.id)?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    /// Atomically load a ticket, apply `mutate` to it and persist the result.
    ///
    /// `mutate` may change status, priority, forwarding and assignment, and may
    /// append remarks. If it returns an error, nothing is written.
    pub fn update<F>(&self, id: &TicketId, mutate: F) -> Result<Ticket>
    where
        F: FnOnce(&mut Ticket) -> Result<()>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let before = load_ticket(&tx, id)?.ok_or_else(|| WorkflowError::not_found(id))?;
        let mut ticket = before.clone();
        mutate(&mut ticket)?;
        check_mutation(&before, &ticket)?;
        ticket.touch();

        let changed = tx.execute(
            "UPDATE tickets
             SET priority = ?1, status = ?2, forwarded_to_admin = ?3, assigned_to = ?4,
                 updated_at = ?5, version = version + 1
             WHERE id = ?6 AND version = ?7",
            params![
                ticket.priority.as_str(),
                ticket.status.as_str(),
                ticket.forwarded_to_admin,
                ticket.assigned_to,
                format_timestamp(&ticket.updated_at),
                id.as_str(),
                before.version,
            ],
        )?;
        if changed == 0 {
            return Err(WorkflowError::Conflict(format!(
                "Ticket {} was modified concurrently",
                id
            )));
        }
        let existing = before.comments.len();
        remark::append(&tx, id, existing, &ticket.comments[existing..])?;
        tx.commit()?;

        ticket.version = before.version + 1;
        Ok(ticket)
    }

    /// Atomically remove a ticket and its remarks if `check` accepts the
    /// current snapshot. Returns the removed ticket.
    pub fn delete_where<F>(&self, id: &TicketId, check: F) -> Result<Ticket>
    where
        F: FnOnce(&Ticket) -> Result<()>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let ticket = load_ticket(&tx, id)?.ok_or_else(|| WorkflowError::not_found(id))?;
        check(&ticket)?;
        let removed = tx.execute(
            "DELETE FROM tickets WHERE id = ?1 AND version = ?2",
            params![id.as_str(), ticket.version],
        )?;
        if removed == 0 {
            return Err(WorkflowError::Conflict(format!(
                "Ticket {} was modified concurrently",
                id
            )));
        }
        tx.commit()?;
        Ok(ticket)
    }

    pub fn delete(&self, id: &TicketId) -> Result<Ticket> {
        self.delete_where(id, |_| Ok(()))
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tickets", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn load_ticket(conn: &Connection, id: &TicketId) -> Result<Option<Ticket>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS),
            params![id.as_str()],
            TicketRow::from_row,
        )
        .optional()?;
    match row {
        Some(row) => {
            let mut ticket = row.into_ticket()?;
            ticket.comments = remark::load(conn, id)?;
            Ok(Some(ticket))
        }
        None => Ok(None),
    }
}

/// Reject mutations that would break a ticket invariant. Only status,
/// priority, forwarding, assignment and appended remarks may change.
fn check_mutation(before: &Ticket, after: &Ticket) -> Result<()> {
    let frozen_changed = before.id != after.id
        || before.subject != after.subject
        || before.description != after.description
        || before.category != after.category
        || before.raised_by != after.raised_by
        || before.raised_by_role != after.raised_by_role
        || before.department != after.department
        || before.created_at != after.created_at
        || before.version != after.version;
    if frozen_changed {
        return Err(anyhow::anyhow!("Ticket {} immutable fields were modified", before.id).into());
    }
    if before.forwarded_to_admin && !after.forwarded_to_admin {
        return Err(anyhow::anyhow!("Ticket {} forwarding cannot be reverted", before.id).into());
    }
    let existing = before.comments.len();
    if after.comments.len() < existing || after.comments[..existing] != before.comments[..] {
        return Err(anyhow::anyhow!("Ticket {} remark log is append-only", before.id).into());
    }
    Ok(())
}

/// Intermediate row struct for reading tickets from SQLite before converting
/// enum strings and timestamps into typed values.
struct TicketRow {
    id: String,
    subject: String,
    description: String,
    category: String,
    priority: String,
    status: String,
    raised_by: String,
    raised_by_role: String,
    department: String,
    forwarded_to_admin: bool,
    assigned_to: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TicketRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            priority: row.get(4)?,
            status: row.get(5)?,
            raised_by: row.get(6)?,
            raised_by_role: row.get(7)?,
            department: row.get(8)?,
            forwarded_to_admin: row.get(9)?,
            assigned_to: row.get(10)?,
            version: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_ticket(self) -> Result<Ticket> {
        let priority = Priority::from_str(&self.priority)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket priority")?;
        let status = TicketStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket status")?;
        let raised_by_role = RaiserRole::from_str(&self.raised_by_role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse ticket raiser role")?;

        Ok(Ticket {
            id: TicketId::from(self.id),
            subject: self.subject,
            description: self.description,
            category: self.category,
            priority,
            status,
            raised_by: self.raised_by,
            raised_by_role,
            department: self.department,
            forwarded_to_admin: self.forwarded_to_admin,
            assigned_to: self.assigned_to,
            comments: vec![],
            version: self.version,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
