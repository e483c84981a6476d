//! Domain events emitted after each committed mutation.
//!
//! The engine only publishes structured events; turning them into
//! notifications or UI refreshes is up to subscribers (see `server::ws`).

use serde::Serialize;
use tokio::sync::broadcast;
use triage_common::{Ticket, TicketStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    TicketCreated {
        ticket: Ticket,
    },
    TicketTransitioned {
        ticket: Ticket,
        previous_status: TicketStatus,
    },
    TicketForwarded {
        ticket: Ticket,
    },
    /// Snapshot taken just before the ticket was removed.
    TicketDeleted {
        ticket: Ticket,
    },
}

impl DomainEvent {
    pub fn ticket(&self) -> &Ticket {
        match self {
            Self::TicketCreated { ticket }
            | Self::TicketTransitioned { ticket, .. }
            | Self::TicketForwarded { ticket }
            | Self::TicketDeleted { ticket } => ticket,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TicketCreated { .. } => "TicketCreated",
            Self::TicketTransitioned { .. } => "TicketTransitioned",
            Self::TicketForwarded { .. } => "TicketForwarded",
            Self::TicketDeleted { .. } => "TicketDeleted",
        }
    }
}

/// In-process fan-out of [`DomainEvent`]s over a tokio broadcast channel.
///
/// Slow subscribers lose the oldest events and observe
/// `RecvError::Lagged`; publishers never block.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to all current subscribers. Having none is not an error.
    pub fn publish(&self, event: DomainEvent) {
        let kind = event.kind();
        let ticket_id = event.ticket().id.clone();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(kind, %ticket_id, receivers, "Published domain event");
            }
            Err(_) => {
                tracing::trace!(kind, %ticket_id, "No subscribers for domain event");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
