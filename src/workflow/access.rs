//! Access gate: which mutating operations an actor may perform on a ticket.
//!
//! Authorization is a pure function of the actor tuple and the ticket
//! snapshot. Each capability predicate returns a [`Decision`]; a denial names
//! the first [`Rule`] the actor violates so callers can surface it.
//!
//! | Operation          | Allowed when                                                     |
//! |--------------------|------------------------------------------------------------------|
//! | `TransitionStatus` | Admin, or DepartmentHead of the ticket's department              |
//! | `ForwardToAdmin`   | DepartmentHead of the ticket's department, Employee-raised, not yet forwarded |
//! | `DeleteOwn`        | Employee who raised this Employee-raised ticket                  |
//! | `DeleteEscalated`  | Admin, on a DepartmentHead-raised ticket                         |
//!
//! Listing is not decided here; see [`super::visibility`].

use std::fmt;

use serde::Serialize;
use triage_common::{Actor, RaiserRole, Role, Ticket};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    TransitionStatus,
    ForwardToAdmin,
    DeleteOwn,
    DeleteEscalated,
}

/// A named authorization rule. The name is stable and exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum Rule {
    CreateRole,
    TransitionRole,
    TransitionDepartment,
    ForwardRole,
    ForwardDepartment,
    ForwardRaiserRole,
    ForwardAlreadyForwarded,
    DeleteOwnRole,
    DeleteOwnRaiserRole,
    DeleteOwnOwnership,
    DeleteEscalatedRole,
    DeleteEscalatedRaiserRole,
    ViewModeNotPermitted,
    ViewNotVisible,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRole => "create_ticket.role",
            Self::TransitionRole => "transition_status.role",
            Self::TransitionDepartment => "transition_status.department",
            Self::ForwardRole => "forward_to_admin.role",
            Self::ForwardDepartment => "forward_to_admin.department",
            Self::ForwardRaiserRole => "forward_to_admin.raised_by_role",
            Self::ForwardAlreadyForwarded => "forward_to_admin.already_forwarded",
            Self::DeleteOwnRole => "delete_own.role",
            Self::DeleteOwnRaiserRole => "delete_own.raised_by_role",
            Self::DeleteOwnOwnership => "delete_own.ownership",
            Self::DeleteEscalatedRole => "delete_escalated.role",
            Self::DeleteEscalatedRaiserRole => "delete_escalated.raised_by_role",
            Self::ViewModeNotPermitted => "view.mode_not_permitted",
            Self::ViewNotVisible => "view.not_visible",
        }
    }
}

impl From<Rule> for &'static str {
    fn from(rule: Rule) -> Self {
        rule.as_str()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Rule),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn into_result(self) -> Result<(), Rule> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(rule) => Err(rule),
        }
    }
}

/// Check conditions in order; the first failing one names the denial.
fn check(conditions: &[(bool, Rule)]) -> Decision {
    conditions
        .iter()
        .find(|(ok, _)| !ok)
        .map_or(Decision::Allow, |(_, rule)| Decision::Deny(*rule))
}

pub fn can_transition(actor: &Actor, ticket: &Ticket) -> Decision {
    match actor.role {
        Role::Admin => Decision::Allow,
        Role::DepartmentHead => check(&[(
            actor.department == ticket.department,
            Rule::TransitionDepartment,
        )]),
        Role::Employee => Decision::Deny(Rule::TransitionRole),
    }
}

pub fn can_forward(actor: &Actor, ticket: &Ticket) -> Decision {
    check(&[
        (actor.role == Role::DepartmentHead, Rule::ForwardRole),
        (actor.department == ticket.department, Rule::ForwardDepartment),
        (ticket.raised_by_role == RaiserRole::Employee, Rule::ForwardRaiserRole),
        (!ticket.forwarded_to_admin, Rule::ForwardAlreadyForwarded),
    ])
}

pub fn can_delete_own(actor: &Actor, ticket: &Ticket) -> Decision {
    check(&[
        (actor.role == Role::Employee, Rule::DeleteOwnRole),
        (ticket.raised_by_role == RaiserRole::Employee, Rule::DeleteOwnRaiserRole),
        (actor.identity == ticket.raised_by, Rule::DeleteOwnOwnership),
    ])
}

pub fn can_delete_escalated(actor: &Actor, ticket: &Ticket) -> Decision {
    check(&[
        (actor.role == Role::Admin, Rule::DeleteEscalatedRole),
        (
            ticket.raised_by_role == RaiserRole::DepartmentHead,
            Rule::DeleteEscalatedRaiserRole,
        ),
    ])
}

pub fn authorize(actor: &Actor, ticket: &Ticket, operation: Operation) -> Decision {
    match operation {
        Operation::TransitionStatus => can_transition(actor, ticket),
        Operation::ForwardToAdmin => can_forward(actor, ticket),
        Operation::DeleteOwn => can_delete_own(actor, ticket),
        Operation::DeleteEscalated => can_delete_escalated(actor, ticket),
    }
}

/// The delete operation that applies to a ticket, chosen by who raised it.
pub fn delete_operation_for(ticket: &Ticket) -> Operation {
    match ticket.raised_by_role {
        RaiserRole::Employee => Operation::DeleteOwn,
        RaiserRole::DepartmentHead => Operation::DeleteEscalated,
    }
}
