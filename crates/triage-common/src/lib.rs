//! Shared domain types for the triage ticket workflow engine.
//!
//! These types are plain data: they carry serde support and string
//! conversions but perform no I/O and enforce no authorization. The engine
//! in the `triage` crate owns every rule about who may change what.

pub mod role;
pub mod ticket;
pub mod view;

pub use role::{Actor, RaiserRole, Role};
pub use ticket::{Priority, Remark, Ticket, TicketId, TicketStatus};
pub use view::ViewMode;
