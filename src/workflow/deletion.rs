//! Hard deletion of tickets and their remark logs.
//!
//! There is no tombstone and no recovery path. Which rule applies depends on
//! who raised the ticket: employees delete their own tickets, admins delete
//! department-head tickets.

use triage_common::{Actor, Ticket, TicketId};

use super::access::{self, Operation};
use super::store::TicketDb;
use crate::errors::Result;

pub fn delete_own(db: &TicketDb, id: &TicketId, actor: &Actor) -> Result<Ticket> {
    delete_with(db, id, actor, |_| Operation::DeleteOwn)
}

pub fn delete_escalated(db: &TicketDb, id: &TicketId, actor: &Actor) -> Result<Ticket> {
    delete_with(db, id, actor, |_| Operation::DeleteEscalated)
}

/// Pick `delete_own` or `delete_escalated` from the ticket's raiser role.
pub fn delete_ticket(db: &TicketDb, id: &TicketId, actor: &Actor) -> Result<Ticket> {
    delete_with(db, id, actor, access::delete_operation_for)
}

fn delete_with(
    db: &TicketDb,
    id: &TicketId,
    actor: &Actor,
    operation: impl FnOnce(&Ticket) -> Operation,
) -> Result<Ticket> {
    db.delete_where(id, |ticket| {
        let operation = operation(ticket);
        access::authorize(actor, ticket, operation).into_result()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WorkflowError;
    use crate::workflow::access::Rule;
    use crate::workflow::store::tests::employee_ticket;
    use crate::workflow::transition::transition;
    use triage_common::{RaiserRole, TicketStatus};

    #[test]
    fn test_raiser_deletes_own_ticket_and_remarks() -> Result<()> {
        let db = TicketDb::new_in_memory()?;
        let ticket = db.create(employee_ticket("alice", "Engineering"))?;
        transition(
            &db,
            &ticket.id,
            &Actor::admin("root"),
            TicketStatus::InProgress,
            "on it",
        )?;

        let removed = delete_own(&db, &ticket.id, &Actor::employee("alice", "Engineering"))?;
        assert_eq!(removed.comments.len(), 1);
        assert!(db.find(&ticket.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_other_employee_cannot_delete() -> Result<()> {
        let db = TicketDb::new_in_memory()?;
        let ticket = db.create(employee_ticket("alice", "Engineering"))?;
        let err = delete_ticket(&db, &ticket.id, &Actor::employee("bob", "Engineering"))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Forbidden { rule: Rule::DeleteOwnOwnership }
        ));
        assert_eq!(db.get(&ticket.id)?, ticket);
        Ok(())
    }

    #[test]
    fn test_admin_deletes_head_ticket() -> Result<()> {
        let db = TicketDb::new_in_memory()?;
        let mut new = employee_ticket("hank", "Engineering");
        new.raised_by_role = RaiserRole::DepartmentHead;
        let ticket = db.create(new)?;

        let err = delete_ticket(&db, &ticket.id, &Actor::department_head("hank", "Engineering"))
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Forbidden { rule: Rule::DeleteEscalatedRole }
        ));

        delete_escalated(&db, &ticket.id, &Actor::admin("root"))?;
        assert!(db.find(&ticket.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_admin_cannot_delete_employee_ticket() -> Result<()> {
        let db = TicketDb::new_in_memory()?;
        let ticket = db.create(employee_ticket("alice", "Engineering"))?;
        let err = delete_ticket(&db, &ticket.id, &Actor::admin("root")).unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden { rule: Rule::DeleteOwnRole }));
        let err = delete_escalated(&db, &ticket.id, &Actor::admin("root")).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Forbidden { rule: Rule::DeleteEscalatedRaiserRole }
        ));
        assert!(db.find(&ticket.id)?.is_some());
        Ok(())
    }

    #[test]
    fn test_delete_missing_ticket_is_not_found() -> Result<()> {
        let db = TicketDb::new_in_memory()?;
        let err = delete_ticket(
            &db,
            &TicketId::from("gone"),
            &Actor::employee("alice", "Engineering"),
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
        Ok(())
    }
}
