//! Workflow service: the async composition root consumed by the HTTP layer.
//!
//! Each method resolves authorization through the access gate or visibility
//! resolver and runs the store work on the blocking pool via [`DbHandle`].
//! Mutations publish their [`DomainEvent`] after commit but while the store
//! lock is still held, so subscribers receive events in commit order.

use tokio::sync::broadcast;
use triage_common::{Actor, Priority, Ticket, TicketId, TicketStatus, ViewMode};

use super::access::Rule;
use super::events::{DomainEvent, EventBus};
use super::store::{DbHandle, NewTicket, TicketDb};
use super::{deletion, escalation, transition, visibility};
use crate::errors::{Result, WorkflowError};

/// Fields an actor supplies when raising a ticket.
#[derive(Debug, Clone, Default)]
pub struct TicketDraft {
    pub subject: String,
    pub category: String,
    pub description: String,
    pub priority: Option<Priority>,
}

#[derive(Clone)]
pub struct WorkflowService {
    db: DbHandle,
    events: EventBus,
}

impl WorkflowService {
    pub fn new(db: DbHandle, events: EventBus) -> Self {
        Self { db, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Run `op` against the store and, if it succeeds, publish the event
    /// built from its output before the lock is released.
    async fn commit<R, F, E>(&self, op: F, event: E) -> Result<R>
    where
        F: FnOnce(&TicketDb) -> Result<R> + Send + 'static,
        E: FnOnce(&R) -> DomainEvent + Send + 'static,
        R: Send + 'static,
    {
        let events = self.events.clone();
        self.db
            .call(move |db| {
                let out = op(db)?;
                events.publish(event(&out));
                Ok(out)
            })
            .await
    }

    pub async fn create_ticket(&self, actor: &Actor, draft: TicketDraft) -> Result<Ticket> {
        let result = self.try_create_ticket(actor, draft).await;
        match &result {
            Ok(ticket) => {
                tracing::info!(
                    ticket_id = %ticket.id,
                    actor = %actor.identity,
                    role = %actor.role,
                    department = %ticket.department,
                    "Ticket raised"
                );
            }
            Err(e) => log_failure("create_ticket", actor, None, e),
        }
        result
    }

    async fn try_create_ticket(&self, actor: &Actor, draft: TicketDraft) -> Result<Ticket> {
        let raised_by_role = actor.role.as_raiser().ok_or(Rule::CreateRole)?;
        let new = NewTicket {
            subject: draft.subject,
            category: draft.category,
            description: draft.description,
            priority: draft.priority,
            raised_by: actor.identity.clone(),
            raised_by_role,
            department: actor.department.clone(),
        };
        self.commit(
            move |db| db.create(new),
            |ticket: &Ticket| DomainEvent::TicketCreated {
                ticket: ticket.clone(),
            },
        )
        .await
    }

    pub async fn list_tickets(&self, actor: &Actor, view: ViewMode) -> Result<Vec<Ticket>> {
        let filter = match visibility::resolve(actor, view) {
            Ok(filter) => filter,
            Err(rule) => {
                let err = WorkflowError::from(rule);
                log_failure("list_tickets", actor, None, &err);
                return Err(err);
            }
        };
        let tickets = self.db.call(move |db| db.list(&filter)).await;
        match &tickets {
            Ok(tickets) => tracing::debug!(
                actor = %actor.identity,
                view = %view,
                count = tickets.len(),
                "Listed tickets"
            ),
            Err(e) => log_failure("list_tickets", actor, None, e),
        }
        tickets
    }

    /// A single ticket, provided it appears in one of the actor's views.
    pub async fn get_ticket(&self, actor: &Actor, id: &TicketId) -> Result<Ticket> {
        let lookup = id.clone();
        let result = match self.db.call(move |db| db.get(&lookup)).await {
            Ok(ticket) if visibility::is_visible(actor, &ticket) => Ok(ticket),
            Ok(_) => Err(Rule::ViewNotVisible.into()),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            log_failure("get_ticket", actor, Some(id), e);
        }
        result
    }

    pub async fn transition_status(
        &self,
        actor: &Actor,
        id: &TicketId,
        status: TicketStatus,
        remark: &str,
    ) -> Result<Ticket> {
        let (owned_actor, owned_id, message) = (actor.clone(), id.clone(), remark.to_string());
        let result = self
            .commit(
                move |db| transition::transition(db, &owned_id, &owned_actor, status, &message),
                |done: &transition::Transitioned| DomainEvent::TicketTransitioned {
                    ticket: done.ticket.clone(),
                    previous_status: done.from,
                },
            )
            .await;
        match result {
            Ok(done) => {
                tracing::info!(
                    ticket_id = %id,
                    actor = %actor.identity,
                    role = %actor.role,
                    from = %done.from,
                    to = %done.ticket.status,
                    "Ticket status changed"
                );
                Ok(done.ticket)
            }
            Err(e) => {
                log_failure("transition_status", actor, Some(id), &e);
                Err(e)
            }
        }
    }

    pub async fn forward_to_admin(&self, actor: &Actor, id: &TicketId) -> Result<Ticket> {
        let (owned_actor, owned_id) = (actor.clone(), id.clone());
        let result = self
            .commit(
                move |db| escalation::forward_to_admin(db, &owned_id, &owned_actor),
                |ticket: &Ticket| DomainEvent::TicketForwarded {
                    ticket: ticket.clone(),
                },
            )
            .await;
        match &result {
            Ok(ticket) => {
                tracing::info!(
                    ticket_id = %id,
                    actor = %actor.identity,
                    department = %ticket.department,
                    "Ticket forwarded to admin"
                );
            }
            Err(e) => log_failure("forward_to_admin", actor, Some(id), e),
        }
        result
    }

    pub async fn delete_own(&self, actor: &Actor, id: &TicketId) -> Result<Ticket> {
        self.delete_via("delete_own", actor, id, deletion::delete_own).await
    }

    pub async fn delete_escalated(&self, actor: &Actor, id: &TicketId) -> Result<Ticket> {
        self.delete_via("delete_escalated", actor, id, deletion::delete_escalated).await
    }

    /// Delete through `delete_own` or `delete_escalated`, chosen by who
    /// raised the ticket.
    pub async fn delete_ticket(&self, actor: &Actor, id: &TicketId) -> Result<Ticket> {
        self.delete_via("delete_ticket", actor, id, deletion::delete_ticket).await
    }

    async fn delete_via(
        &self,
        operation: &'static str,
        actor: &Actor,
        id: &TicketId,
        delete: fn(&TicketDb, &TicketId, &Actor) -> Result<Ticket>,
    ) -> Result<Ticket> {
        let (owned_actor, owned_id) = (actor.clone(), id.clone());
        let result = self
            .commit(
                move |db| delete(db, &owned_id, &owned_actor),
                |ticket: &Ticket| DomainEvent::TicketDeleted {
                    ticket: ticket.clone(),
                },
            )
            .await;
        match &result {
            Ok(ticket) => {
                tracing::info!(
                    ticket_id = %id,
                    actor = %actor.identity,
                    role = %actor.role,
                    remarks = ticket.comments.len(),
                    "Ticket deleted"
                );
            }
            Err(e) => log_failure(operation, actor, Some(id), e),
        }
        result
    }
}

fn log_failure(operation: &str, actor: &Actor, id: Option<&TicketId>, err: &WorkflowError) {
    let ticket_id = id.map(|id| id.as_str()).unwrap_or("-");
    match err {
        WorkflowError::Forbidden { rule } => tracing::warn!(
            operation,
            ticket_id,
            actor = %actor.identity,
            role = %actor.role,
            rule = %rule,
            "Denied"
        ),
        e if e.is_client_error() => tracing::info!(
            operation,
            ticket_id,
            actor = %actor.identity,
            error = %e,
            "Rejected"
        ),
        e => tracing::error!(operation, ticket_id, error = %e, "Storage failure"),
    }
}
