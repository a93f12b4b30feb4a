//! Observer WebSocket connection.
//!
//! Each connection becomes one hub observer. Inbound text frames are
//! `{"event": <command>, "data": ...}`; outbound frames are [`ServerEvent`]s.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tracing::{debug, warn};

use crate::hub::{ClientFrame, ObserverSession, ServerEvent};

use super::AppState;

/// `GET /ws`: upgrade to an observer connection.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_observer(socket, state))
}

async fn run_observer(mut socket: WebSocket, state: AppState) {
    let hub = state.hub;
    let mut session = hub.connect().await;

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match ClientFrame::parse(text.as_str()) {
                        Ok(command) => hub.handle_command(session.id(), command).await,
                        Err(e) => {
                            warn!(
                                observer_id = session.id(),
                                error = %e,
                                "Ignoring observer frame"
                            );
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(observer_id = session.id(), error = %e, "Observer socket error");
                    break;
                }
            },
            event = session.next_event() => {
                let Some(event) = event else { break };
                if send_event(&mut socket, &session, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.disconnect(session).await;
}

async fn send_event(
    socket: &mut WebSocket,
    session: &ObserverSession,
    event: &ServerEvent,
) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(observer_id = session.id(), error = %e, "Failed to serialize event");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|e| {
        debug!(observer_id = session.id(), error = %e, "Observer send failed");
    })
}
