//! Ticket escalation and status workflow engine.
//!
//! ```text
//!                 WorkflowService (async, publishes DomainEvents)
//!                /        |           |             \
//!        visibility   transition  escalation     deletion
//!                \        |           |             /
//!                 +----- access (pure gate) -------+
//!                          |
//!                 TicketDb / DbHandle  <->  remark log
//! ```
//!
//! Everything below the service is synchronous and runs against a borrowed
//! [`store::TicketDb`]; the service moves that work onto the blocking pool.

pub mod access;
pub mod deletion;
pub mod escalation;
pub mod events;
pub mod remark;
pub mod service;
pub mod store;
pub mod transition;
pub mod visibility;

pub use events::{DomainEvent, EventBus};
pub use service::{TicketDraft, WorkflowService};
pub use store::{DbHandle, TicketDb};
