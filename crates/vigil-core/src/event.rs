//! Real-time events and the seam services publish them through.
//!
//! Wire form is `{"event": "<name>", "data": <payload>}`, with the event
//! names the mobile client already listens for.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{incident::LiveIncident, notification::Notification, report::IncidentReport};

/// Payload of `notification:received`: either a stored notification or a
/// bare message relayed from another client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationPayload {
  Stored(Notification),
  Message { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
  #[serde(rename = "report:created")]
  ReportCreated(IncidentReport),
  #[serde(rename = "report:updated")]
  ReportUpdated(IncidentReport),
  #[serde(rename = "notification:received")]
  NotificationReceived(NotificationPayload),
  #[serde(rename = "incident:created")]
  IncidentCreated(LiveIncident),
  #[serde(rename = "incident:updated")]
  IncidentUpdated(LiveIncident),
}

impl RealtimeEvent {
  pub fn name(&self) -> &'static str {
    match self {
      Self::ReportCreated(_) => "report:created",
      Self::ReportUpdated(_) => "report:updated",
      Self::NotificationReceived(_) => "notification:received",
      Self::IncidentCreated(_) => "incident:created",
      Self::IncidentUpdated(_) => "incident:updated",
    }
  }
}

/// Fan-out target for real-time events.
///
/// Delivery is best effort and at most once; implementations must not block
/// and never report failure to the publisher.
pub trait EventSink: Send + Sync {
  /// Deliver to every connected session. Returns the number of sessions
  /// reached.
  fn broadcast(&self, event: RealtimeEvent) -> usize;

  /// Deliver to every session joined to `user_id`'s channel.
  fn send_to(&self, user_id: Uuid, event: RealtimeEvent) -> usize;
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
  fn broadcast(&self, _: RealtimeEvent) -> usize { 0 }

  fn send_to(&self, _: Uuid, _: RealtimeEvent) -> usize { 0 }
}

/// Where a recorded event was addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
  Everyone,
  User(Uuid),
}

/// Sink that keeps every published event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
  events: Mutex<Vec<(Audience, RealtimeEvent)>>,
}

impl RecordingSink {
  pub fn events(&self) -> Vec<(Audience, RealtimeEvent)> {
    self
      .events
      .lock()
      .map(|events| events.clone())
      .unwrap_or_default()
  }

  fn push(&self, audience: Audience, event: RealtimeEvent) {
    if let Ok(mut events) = self.events.lock() {
      events.push((audience, event));
    }
  }
}

impl EventSink for RecordingSink {
  fn broadcast(&self, event: RealtimeEvent) -> usize {
    self.push(Audience::Everyone, event);
    1
  }

  fn send_to(&self, user_id: Uuid, event: RealtimeEvent) -> usize {
    self.push(Audience::User(user_id), event);
    1
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn message_payload_wire_shape() {
    let event = RealtimeEvent::NotificationReceived(NotificationPayload::Message {
      message: "check your inbox".into(),
    });
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(
      json,
      serde_json::json!({
        "event": "notification:received",
        "data": { "message": "check your inbox" }
      })
    );
    let back: RealtimeEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
    assert_eq!(back.name(), "notification:received");
  }
}
