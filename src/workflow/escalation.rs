//! Escalation router: the one-way "forward to admin" operation.
//!
//! Forwarding flips `forwarded_to_admin` to true and nothing else: no remark
//! is written and the status is left alone. A ticket is forwarded at most
//! once; a repeat attempt by an otherwise authorized head is a conflict.

use triage_common::{Actor, Ticket, TicketId};

use super::access::{self, Decision, Operation, Rule};
use super::store::TicketDb;
use crate::errors::{Result, WorkflowError};

pub fn forward_to_admin(db: &TicketDb, id: &TicketId, actor: &Actor) -> Result<Ticket> {
    db.update(id, |ticket| {
        match access::authorize(actor, ticket, Operation::ForwardToAdmin) {
            Decision::Allow => {}
            Decision::Deny(Rule::ForwardAlreadyForwarded) => {
                return Err(WorkflowError::Conflict(format!(
                    "Ticket {} is already forwarded to admin",
                    ticket.id
                )));
            }
            Decision::Deny(rule) => return Err(rule.into()),
        }
        ticket.forwarded_to_admin = true;
        Ok(())
    })
}
