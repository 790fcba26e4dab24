//! Live incident service: raising alerts, tracking responders, resolution.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{EventSink, RealtimeEvent},
  incident::{IncidentStatus, LiveIncident, NewIncident, Responder},
  store::SchoolStore,
};

pub struct IncidentService<S> {
  store:  Arc<S>,
  events: Arc<dyn EventSink>,
}

impl<S> Clone for IncidentService<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      events: Arc::clone(&self.events),
    }
  }
}

impl<S: SchoolStore> IncidentService<S> {
  pub fn new(store: Arc<S>, events: Arc<dyn EventSink>) -> Self { Self { store, events } }

  pub async fn create_incident(&self, input: NewIncident) -> Result<LiveIncident> {
    input.validate()?;
    let incident = LiveIncident::open(input, Uuid::new_v4(), Utc::now());
    self
      .store
      .insert_incident(&incident)
      .await
      .map_err(Error::store)?;

    warn!(
      incident_id = %incident.incident_id,
      incident_type = %incident.incident_type,
      building = %incident.location.building,
      "live incident raised"
    );
    self
      .events
      .broadcast(RealtimeEvent::IncidentCreated(incident.clone()));
    Ok(incident)
  }

  pub async fn respond(
    &self,
    incident_id: Uuid,
    user_id: Uuid,
    user_name: &str,
    role: &str,
  ) -> Result<LiveIncident> {
    let mut incident = self.get_incident(incident_id).await?;
    incident.add_responder(Responder {
      user_id,
      user_name: user_name.to_owned(),
      role: role.to_owned(),
      responded_at: Utc::now(),
    })?;
    self.save_and_publish(&incident).await?;

    info!(%incident_id, %user_id, responders = incident.responders.len(), "responder added");
    Ok(incident)
  }

  pub async fn remove_responder(&self, incident_id: Uuid, user_id: Uuid) -> Result<LiveIncident> {
    let mut incident = self.get_incident(incident_id).await?;
    if incident.remove_responder(user_id, Utc::now())? {
      self.save_and_publish(&incident).await?;
      info!(%incident_id, %user_id, status = %incident.status, "responder removed");
    }
    Ok(incident)
  }

  pub async fn resolve(
    &self,
    incident_id: Uuid,
    resolved_by: Uuid,
    resolved_by_name: &str,
  ) -> Result<LiveIncident> {
    let mut incident = self.get_incident(incident_id).await?;
    let again = incident.is_resolved();
    incident.resolve(resolved_by, resolved_by_name, Utc::now());
    self.save_and_publish(&incident).await?;

    info!(%incident_id, %resolved_by, again, "incident resolved");
    Ok(incident)
  }

  pub async fn get_incident(&self, incident_id: Uuid) -> Result<LiveIncident> {
    self
      .store
      .get_incident(incident_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::incident_not_found(incident_id))
  }

  pub async fn list_incidents(&self, status: Option<IncidentStatus>) -> Result<Vec<LiveIncident>> {
    self.store.list_incidents(status).await.map_err(Error::store)
  }

  async fn save_and_publish(&self, incident: &LiveIncident) -> Result<()> {
    self
      .store
      .save_incident(incident)
      .await
      .map_err(Error::store)?;
    self
      .events
      .broadcast(RealtimeEvent::IncidentUpdated(incident.clone()));
    Ok(())
  }
}
