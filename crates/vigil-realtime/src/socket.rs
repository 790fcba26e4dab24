//! The `/ws` endpoint.
//!
//! Every frame in either direction is a JSON text frame of the form
//! `{"event": "<name>", "data": <payload>}`. The upgrade request must carry a
//! live session token, either as `?token=` or as a bearer `Authorization`
//! header; the connection then joins that user's channel.

use std::{future::Future, sync::Arc};

use axum::{
  Json, Router,
  extract::{
    Query, State,
    rejection::QueryRejection,
    ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
  },
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
  routing::get,
};
use futures::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_core::{
  event::{EventSink, NotificationPayload, RealtimeEvent},
  report::IncidentReport,
};

use crate::broadcaster::{Broadcaster, ConnectionId};

/// Resolves the token presented on upgrade to the user it was issued to.
pub trait SessionVerifier: Send + Sync + 'static {
  fn verify(&self, token: &str) -> impl Future<Output = Option<Uuid>> + Send;
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
  #[serde(rename = "user:join")]
  Join(Uuid),
  #[serde(rename = "report:submit")]
  ReportSubmit(IncidentReport),
  #[serde(rename = "report:statusUpdate")]
  ReportStatusUpdate(IncidentReport),
  #[serde(rename = "notification:send", rename_all = "camelCase")]
  NotificationSend { recipient_id: Uuid, message: String },
}

struct SocketState<V> {
  hub:      Arc<Broadcaster>,
  verifier: Arc<V>,
}

impl<V> Clone for SocketState<V> {
  fn clone(&self) -> Self {
    Self {
      hub:      Arc::clone(&self.hub),
      verifier: Arc::clone(&self.verifier),
    }
  }
}

#[derive(Debug, Deserialize)]
struct Handshake {
  token: Option<String>,
}

pub fn router<V: SessionVerifier>(hub: Arc<Broadcaster>, verifier: Arc<V>) -> Router {
  Router::new()
    .route("/ws", get(upgrade::<V>))
    .with_state(SocketState { hub, verifier })
}

fn presented_token(query: Option<Handshake>, headers: &HeaderMap) -> Option<String> {
  let from_header = || {
    headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.strip_prefix("Bearer "))
      .map(|t| t.trim().to_owned())
  };
  query
    .and_then(|q| q.token)
    .or_else(from_header)
    .filter(|t| !t.is_empty())
}

fn unauthorized(message: &str) -> Response {
  let body = json!({
    "success": false,
    "error": "Authentication failed",
    "message": message,
  });
  (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

async fn upgrade<V: SessionVerifier>(
  State(state): State<SocketState<V>>,
  query: Result<Query<Handshake>, QueryRejection>,
  headers: HeaderMap,
  ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
  let Some(token) = presented_token(query.ok().map(|Query(q)| q), &headers) else {
    return unauthorized("missing session token");
  };
  let Some(user_id) = state.verifier.verify(&token).await else {
    return unauthorized("invalid or expired token");
  };

  match ws {
    Ok(ws) => ws.on_upgrade(move |socket| session(socket, state.hub, user_id)),
    Err(rejection) => rejection.into_response(),
  }
}

async fn session(socket: WebSocket, hub: Arc<Broadcaster>, user_id: Uuid) {
  let (id, mut rx) = hub.connect();
  hub.join(id, user_id);
  info!(%id, %user_id, total = hub.connection_count(), "websocket client connected");

  let (mut sink, mut stream) = socket.split();

  let mut outbound = tokio::spawn(async move {
    while let Some(event) = rx.recv().await {
      let text = match serde_json::to_string(&event) {
        Ok(text) => text,
        Err(e) => {
          warn!(%id, event = event.name(), "failed to encode event: {e}");
          continue;
        }
      };
      if sink.send(Message::Text(text.into())).await.is_err() {
        break;
      }
    }
  });

  let inbound_hub = Arc::clone(&hub);
  let mut inbound = tokio::spawn(async move {
    while let Some(Ok(frame)) = stream.next().await {
      match frame {
        Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
          Ok(msg) => handle_client_message(&inbound_hub, id, user_id, msg),
          Err(e) => warn!(%id, "ignoring malformed client frame: {e}"),
        },
        Message::Close(_) => break,
        _ => {}
      }
    }
  });

  tokio::select! {
    _ = &mut outbound => inbound.abort(),
    _ = &mut inbound => outbound.abort(),
  }

  hub.disconnect(id);
  info!(%id, total = hub.connection_count(), "websocket client disconnected");
}

/// Apply one client event from a connection authenticated as `user_id`.
/// A connection may only join its own channel.
pub fn handle_client_message(
  hub: &Broadcaster,
  id: ConnectionId,
  user_id: Uuid,
  msg: ClientMessage,
) {
  match msg {
    ClientMessage::Join(requested) if requested == user_id => {
      hub.join(id, user_id);
    }
    ClientMessage::Join(requested) => {
      warn!(%id, %user_id, %requested, "refusing to join another user's channel");
    }
    ClientMessage::ReportSubmit(report) => {
      hub.broadcast(RealtimeEvent::ReportCreated(report.public_view()));
    }
    ClientMessage::ReportStatusUpdate(report) => {
      hub.broadcast(RealtimeEvent::ReportUpdated(report.public_view()));
    }
    ClientMessage::NotificationSend {
      recipient_id,
      message,
    } => {
      let reached = hub.send_to(
        recipient_id,
        RealtimeEvent::NotificationReceived(NotificationPayload::Message { message }),
      );
      debug!(%id, %recipient_id, reached, "relayed client notification");
    }
  }
}
