use std::time::Duration;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::{ApiError, CurrentActor, SharedState, ViewQuery, requested_view};
use crate::workflow::DomainEvent;
use crate::workflow::visibility::{self, TicketFilter};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Control messages interleaved with domain events on the stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamNotice {
    /// Events were dropped; refetch the list and reconcile by id and
    /// `updatedAt`.
    Resync { missed: u64 },
}

// ── WebSocket handler ────────────────────────────────────────────────

/// `GET /ws?view=<mode>`: stream the domain events whose ticket falls
/// inside the caller's view.
///
/// The caller is authenticated before the upgrade extractor runs.
pub async fn ws_handler(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ViewQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let view = requested_view(&actor, query.view.as_deref())?;
    let filter = visibility::resolve(&actor, view).map_err(ApiError::Forbidden)?;
    let rx = state.service.subscribe();
    tracing::info!(actor = %actor.identity, view = %view, "Event stream opened");
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, rx, filter))
        .into_response())
}

async fn handle_socket(socket: WebSocket, rx: broadcast::Receiver<DomainEvent>, filter: TicketFilter) {
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, rx, filter).await;
    tracing::debug!("Event stream closed");
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines filtered event forwarding, client message receiving, and
/// periodic ping/pong health checking into a single select loop. If no Pong
/// is received within [`PONG_TIMEOUT`] after a Ping is sent, the connection
/// is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<DomainEvent>,
    filter: TicketFilter,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                let outgoing = match result {
                    Ok(event) => render_event(&event, &filter),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Event stream subscriber lagged");
                        render_notice(&StreamNotice::Resync { missed })
                    }
                };
                if let Some(text) = outgoing
                    && sender.send(Message::Text(text.into())).await.is_err()
                {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

/// JSON for `event` if its ticket is inside `filter`.
fn render_event(event: &DomainEvent, filter: &TicketFilter) -> Option<String> {
    if !filter.matches(event.ticket()) {
        return None;
    }
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, kind = event.kind(), "Failed to serialize domain event");
            None
        }
    }
}

fn render_notice(notice: &StreamNotice) -> Option<String> {
    serde_json::to_string(notice).ok()
}

// ── Tests ────────────────────────────────────────────────────────────
