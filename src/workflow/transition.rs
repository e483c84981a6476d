//! Status transition engine.
//!
//! Any authorized actor may move a ticket between any two statuses,
//! including out of `Closed`. Every transition appends exactly one remark
//! whose `status_at_that_time` is the new status.

use triage_common::{Actor, TicketId, TicketStatus};

use super::access::{self, Operation};
use super::remark;
use super::store::TicketDb;
use crate::errors::Result;

/// Outcome of a committed transition.
#[derive(Debug, Clone)]
pub struct Transitioned {
    pub ticket: triage_common::Ticket,
    pub from: TicketStatus,
}

pub fn transition(
    db: &TicketDb,
    id: &TicketId,
    actor: &Actor,
    new_status: TicketStatus,
    message: &str,
) -> Result<Transitioned> {
    // Validate input before touching the store.
    let remark = remark::compose(actor.role, message, new_status)?;
    let mut from = TicketStatus::Open;
    let ticket = db.update(id, |ticket| {
        access::authorize(actor, ticket, Operation::TransitionStatus).into_result()?;
        from = ticket.status;
        ticket.status = new_status;
        ticket.comments.push(remark);
        Ok(())
    })?;
    Ok(Transitioned { ticket, from })
}
