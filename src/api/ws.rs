//! WebSocket push channel.
//!
//! On connect the client gets the current market status. Subscribe frames
//! register the connection's sink per symbol and trigger an immediate quote
//! fetch; afterwards the periodic broadcaster feeds the sink. Disconnecting
//! removes the sink from every symbol.

use crate::api::AppState;
use crate::domain::Symbol;
use crate::realtime::{ClientAction, ClientRequest, PushEnvelope, RealtimeService, SinkId};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Per-connection outbound buffer. A client that falls this far behind
/// starts missing updates.
const PUSH_BUFFER: usize = 32;

/// GET /ws/realtime
pub async fn realtime_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.realtime))
}

async fn handle_socket(socket: WebSocket, service: Arc<RealtimeService>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<PushEnvelope>(PUSH_BUFFER);
    let sink_id = service.register_sink(tx.clone()).await;
    info!(sink = sink_id, "push client connected");

    let _ = tx.try_send(PushEnvelope::Status {
        data: service.market_status(),
    });

    // Forward task: drains the sink into the socket until the client goes
    // away.
    let forward = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&envelope) else {
                continue;
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        let Message::Text(text) = message else {
            continue;
        };

        match serde_json::from_str::<ClientRequest>(&text) {
            Err(_) => {
                let _ = tx.try_send(PushEnvelope::Error {
                    message: "invalid message format".to_string(),
                });
            }
            Ok(request) => handle_request(&service, sink_id, &tx, request).await,
        }
    }

    service.drop_sink(sink_id).await;
    forward.abort();
    info!(sink = sink_id, "push client disconnected");
}

async fn handle_request(
    service: &Arc<RealtimeService>,
    sink_id: SinkId,
    tx: &mpsc::Sender<PushEnvelope>,
    request: ClientRequest,
) {
    let mut symbols = Vec::new();
    for raw in &request.symbols {
        match Symbol::from_str(raw) {
            Ok(symbol) => symbols.push(symbol),
            Err(e) => {
                let _ = tx.try_send(PushEnvelope::Error {
                    message: format!("invalid symbol {}: {}", raw, e),
                });
            }
        }
    }
    if symbols.is_empty() {
        return;
    }
    let codes: Vec<String> = symbols.iter().map(|s| s.code().to_string()).collect();

    match request.action {
        ClientAction::Subscribe => {
            for symbol in &symbols {
                service.subscribe(sink_id, symbol).await;
            }
            let _ = tx.try_send(PushEnvelope::Subscribed {
                data: codes,
                message: "subscribed".to_string(),
            });

            // Serve the current quotes right away; the broadcaster takes
            // over from the next cycle.
            match service.get_batch_quotes(&symbols).await {
                Ok(quotes) => {
                    for quote in quotes {
                        let _ = tx.try_send(PushEnvelope::Quote { data: quote });
                    }
                }
                Err(e) => {
                    debug!(sink = sink_id, error = %e, "initial quote fetch failed");
                    let _ = tx.try_send(PushEnvelope::Error {
                        message: e.to_string(),
                    });
                }
            }
        }
        ClientAction::Unsubscribe => {
            for symbol in &symbols {
                service.unsubscribe(sink_id, symbol).await;
            }
            let _ = tx.try_send(PushEnvelope::Unsubscribed {
                data: codes,
                message: "unsubscribed".to_string(),
            });
        }
    }
}
