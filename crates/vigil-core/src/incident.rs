//! Live incidents: time-sensitive alerts that staff respond to in person.
//!
//! Status is derived from the responder list until the incident is resolved:
//! no responders means `active`, one or more means `responding`. Resolution is
//! final for the responder list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  report::{IncidentType, Location},
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentStatus {
  Active,
  Responding,
  Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Responder {
  pub user_id:      Uuid,
  pub user_name:    String,
  pub role:         String,
  pub responded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
  pub resolved_by:      Uuid,
  pub resolved_by_name: String,
  pub resolved_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveIncident {
  pub incident_id:   Uuid,
  pub reporter_id:   Uuid,
  pub reporter_name: String,
  pub location:      Location,
  pub incident_type: IncidentType,
  pub description:   String,
  pub status:        IncidentStatus,
  /// In response order.
  pub responders:    Vec<Responder>,
  pub resolution:    Option<Resolution>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

/// Input to [`crate::alerts::IncidentService::create_incident`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIncident {
  pub reporter_id:   Uuid,
  pub reporter_name: String,
  pub location:      Location,
  pub incident_type: IncidentType,
  pub description:   String,
}

impl NewIncident {
  pub fn validate(&self) -> Result<()> {
    if self.location.building.trim().is_empty() {
      return Err(Error::Validation("missing required fields: location.building".into()));
    }
    Ok(())
  }
}

impl LiveIncident {
  pub fn open(input: NewIncident, incident_id: Uuid, now: DateTime<Utc>) -> Self {
    Self {
      incident_id,
      reporter_id: input.reporter_id,
      reporter_name: input.reporter_name,
      location: input.location,
      incident_type: input.incident_type,
      description: input.description,
      status: IncidentStatus::Active,
      responders: Vec::new(),
      resolution: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_resolved(&self) -> bool { self.status == IncidentStatus::Resolved }

  pub fn has_responder(&self, user_id: Uuid) -> bool {
    self.responders.iter().any(|r| r.user_id == user_id)
  }

  /// Add `responder`. Fails if that user already responds or the incident is
  /// resolved; the list is untouched on failure.
  pub fn add_responder(&mut self, responder: Responder) -> Result<()> {
    if self.is_resolved() {
      return Err(Error::Conflict(format!(
        "incident {} is already resolved",
        self.incident_id
      )));
    }
    if self.has_responder(responder.user_id) {
      return Err(Error::Conflict(format!(
        "user {} is already responding to incident {}",
        responder.user_id, self.incident_id
      )));
    }
    self.updated_at = responder.responded_at;
    self.responders.push(responder);
    self.status = IncidentStatus::Responding;
    Ok(())
  }

  /// Remove `user_id` from the responders. Returns whether anything was
  /// removed.
  pub fn remove_responder(&mut self, user_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
    if self.is_resolved() {
      return Err(Error::Conflict(format!(
        "incident {} is already resolved",
        self.incident_id
      )));
    }
    let before = self.responders.len();
    self.responders.retain(|r| r.user_id != user_id);
    let removed = self.responders.len() != before;

    self.status = if self.responders.is_empty() {
      IncidentStatus::Active
    } else {
      IncidentStatus::Responding
    };
    if removed {
      self.updated_at = now;
    }
    Ok(removed)
  }

  /// Mark resolved. Resolving again only replaces the resolution metadata.
  pub fn resolve(&mut self, resolved_by: Uuid, resolved_by_name: &str, now: DateTime<Utc>) {
    self.status = IncidentStatus::Resolved;
    self.resolution = Some(Resolution {
      resolved_by,
      resolved_by_name: resolved_by_name.to_owned(),
      resolved_at: now,
    });
    self.updated_at = now;
  }
}
