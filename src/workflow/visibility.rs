//! Visibility resolver: which tickets an actor may list under a view mode.
//!
//! `resolve` turns an `(actor, view)` pair into a [`TicketFilter`]. The same
//! filter is evaluated in memory (`matches`) and pushed down to SQL by the
//! store, so the two paths cannot disagree about membership.

use triage_common::{Actor, RaiserRole, Role, Ticket, ViewMode};

use super::access::Rule;

/// Conjunction of optional equality constraints over ticket fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub raised_by: Option<String>,
    pub raised_by_role: Option<RaiserRole>,
    pub department: Option<String>,
    pub forwarded_to_admin: Option<bool>,
}

impl TicketFilter {
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.raised_by.as_ref().is_none_or(|v| *v == ticket.raised_by)
            && self.raised_by_role.is_none_or(|v| v == ticket.raised_by_role)
            && self.department.as_ref().is_none_or(|v| *v == ticket.department)
            && self
                .forwarded_to_admin
                .is_none_or(|v| v == ticket.forwarded_to_admin)
    }
}

/// View modes each role may request, in display order.
pub fn permitted_views(role: Role) -> &'static [ViewMode] {
    match role {
        Role::Employee => &[ViewMode::MyTickets],
        Role::DepartmentHead => &[ViewMode::EmployeeQueries, ViewMode::MyQueries],
        Role::Admin => &[ViewMode::EmployeeQueries, ViewMode::DepartmentTickets],
    }
}

pub fn resolve(actor: &Actor, view: ViewMode) -> Result<TicketFilter, Rule> {
    let filter = match (actor.role, view) {
        (Role::Employee, ViewMode::MyTickets) => TicketFilter {
            raised_by: Some(actor.identity.clone()),
            ..Default::default()
        },
        (Role::DepartmentHead, ViewMode::EmployeeQueries) => TicketFilter {
            raised_by_role: Some(RaiserRole::Employee),
            department: Some(actor.department.clone()),
            ..Default::default()
        },
        (Role::DepartmentHead, ViewMode::MyQueries) => TicketFilter {
            raised_by: Some(actor.identity.clone()),
            raised_by_role: Some(RaiserRole::DepartmentHead),
            ..Default::default()
        },
        (Role::Admin, ViewMode::EmployeeQueries) => TicketFilter {
            raised_by_role: Some(RaiserRole::Employee),
            forwarded_to_admin: Some(true),
            ..Default::default()
        },
        (Role::Admin, ViewMode::DepartmentTickets) => TicketFilter {
            raised_by_role: Some(RaiserRole::DepartmentHead),
            ..Default::default()
        },
        _ => return Err(Rule::ViewModeNotPermitted),
    };
    Ok(filter)
}

/// Whether the ticket shows up in at least one view the actor may request.
pub fn is_visible(actor: &Actor, ticket: &Ticket) -> bool {
    permitted_views(actor.role)
        .iter()
        .filter_map(|view| resolve(actor, *view).ok())
        .any(|filter| filter.matches(ticket))
}
