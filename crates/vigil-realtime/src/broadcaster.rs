//! Connection registry and per-user channels.

use std::{
  collections::HashSet,
  sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_core::event::{EventSink, RealtimeEvent};

/// Queue depth used by [`Broadcaster::default`].
pub const DEFAULT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "conn-{}", self.0)
  }
}

struct Connection {
  tx:   mpsc::Sender<RealtimeEvent>,
  user: Option<Uuid>,
}

/// Fan-out hub shared by every WebSocket session and by the services.
///
/// Delivery never blocks: an event is pushed with `try_send` and dropped for
/// any connection whose queue is full.
pub struct Broadcaster {
  connections: DashMap<ConnectionId, Connection>,
  channels:    DashMap<Uuid, HashSet<ConnectionId>>,
  next_id:     AtomicU64,
  buffer:      usize,
}

impl Default for Broadcaster {
  fn default() -> Self { Self::new(DEFAULT_BUFFER) }
}

impl Broadcaster {
  pub fn new(buffer: usize) -> Self {
    info!(buffer, "broadcaster initialized");
    Self {
      connections: DashMap::new(),
      channels:    DashMap::new(),
      next_id:     AtomicU64::new(1),
      buffer:      buffer.max(1),
    }
  }

  /// Register a new connection. The returned receiver yields every event
  /// addressed to it until [`Self::disconnect`] is called.
  pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<RealtimeEvent>) {
    let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = mpsc::channel(self.buffer);
    self.connections.insert(id, Connection { tx, user: None });
    debug!(%id, total = self.connections.len(), "connection registered");
    (id, rx)
  }

  /// Put `id` into `user_id`'s channel. A connection belongs to at most one
  /// channel; joining again moves it.
  pub fn join(&self, id: ConnectionId, user_id: Uuid) -> bool {
    let previous = match self.connections.get_mut(&id) {
      Some(mut conn) => conn.user.replace(user_id),
      None => return false,
    };
    if let Some(previous) = previous.filter(|p| *p != user_id) {
      self.leave_channel(previous, id);
    }
    self.channels.entry(user_id).or_default().insert(id);
    info!(%id, %user_id, "connection joined user channel");
    true
  }

  /// Drop the connection and remove it from its channel. A channel left
  /// without connections is removed.
  pub fn disconnect(&self, id: ConnectionId) {
    let Some((_, conn)) = self.connections.remove(&id) else {
      return;
    };
    if let Some(user_id) = conn.user {
      self.leave_channel(user_id, id);
    }
    debug!(%id, total = self.connections.len(), "connection removed");
  }

  fn leave_channel(&self, user_id: Uuid, id: ConnectionId) {
    if let Some(mut members) = self.channels.get_mut(&user_id) {
      members.remove(&id);
    }
    self.channels.remove_if(&user_id, |_, members| members.is_empty());
  }

  pub fn connection_count(&self) -> usize { self.connections.len() }

  /// Number of connections currently joined to `user_id`.
  pub fn channel_size(&self, user_id: Uuid) -> usize {
    self.channels.get(&user_id).map_or(0, |m| m.len())
  }

  fn deliver(
    &self,
    id: ConnectionId,
    tx: &mpsc::Sender<RealtimeEvent>,
    event: RealtimeEvent,
  ) -> bool {
    match tx.try_send(event) {
      Ok(()) => true,
      Err(TrySendError::Full(event)) => {
        warn!(%id, event = event.name(), "connection queue full, event dropped");
        false
      }
      Err(TrySendError::Closed(_)) => {
        debug!(%id, "connection closed before delivery");
        false
      }
    }
  }
}

impl EventSink for Broadcaster {
  fn broadcast(&self, event: RealtimeEvent) -> usize {
    let mut reached = 0;
    for entry in self.connections.iter() {
      if self.deliver(*entry.key(), &entry.tx, event.clone()) {
        reached += 1;
      }
    }
    debug!(event = event.name(), reached, "broadcast");
    reached
  }

  fn send_to(&self, user_id: Uuid, event: RealtimeEvent) -> usize {
    let members: Vec<ConnectionId> = match self.channels.get(&user_id) {
      Some(members) => members.iter().copied().collect(),
      None => {
        debug!(%user_id, event = event.name(), "no connections for user");
        return 0;
      }
    };

    let mut reached = 0;
    for id in members {
      let Some(conn) = self.connections.get(&id) else {
        continue;
      };
      if self.deliver(id, &conn.tx, event.clone()) {
        reached += 1;
      }
    }
    debug!(%user_id, event = event.name(), reached, "targeted send");
    reached
  }
}
