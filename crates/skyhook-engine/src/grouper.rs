//! Event grouping by trigger id.
//!
//! The grouper owns all [`Event`] and [`EventGroup`] state. Ingesting an
//! event either seeds a new group or merges into the existing one for the
//! same trigger id, keeping two invariants:
//!
//! - exactly one group exists per distinct trigger id, and
//! - the group's position only ever becomes more precise, regardless of
//!   arrival order.
//!
//! A classification conflict (e.g. a neutrino notice arriving under a GRB
//! trigger id) is a recoverable data inconsistency: the event is flagged
//! ignored and stored for audit, and the group is left untouched.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use skyhook_core::EventId;

use crate::error::{Error, Result};
use crate::event::{Event, EventGroup};

/// A reference to an event group, returned by ingestion and consumed by the
/// decision engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventGroupRef {
    /// The group trigger id.
    pub trig_id: String,
    /// The event that produced this reference.
    pub event_id: EventId,
    /// True when ingestion created the group (first event for the id).
    pub is_new_group: bool,
}

/// Internal grouper state protected by a single lock.
#[derive(Debug, Default)]
struct GrouperState {
    groups: HashMap<String, EventGroup>,
    events: HashMap<EventId, Event>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("grouper lock poisoned")
}

/// Groups incoming events by trigger id and owns event/group storage.
#[derive(Debug, Default)]
pub struct EventGrouper {
    state: RwLock<GrouperState>,
}

impl EventGrouper {
    /// Creates an empty grouper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests a normalized event, seeding or merging its group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyTriggerId`] if the event has no trigger id, or
    /// a storage error if the lock is poisoned. A classification conflict is
    /// not an error: the event is flagged ignored and the returned reference
    /// points at the unmodified group.
    #[tracing::instrument(skip(self, event), fields(trig_id = %event.trig_id, event_id = %event.id))]
    pub fn ingest(&self, mut event: Event) -> Result<EventGroupRef> {
        if event.trig_id.is_empty() {
            return Err(Error::EmptyTriggerId);
        }

        let mut state = self.state.write().map_err(poison_err)?;
        let trig_id = event.trig_id.clone();
        let event_id = event.id;

        let is_new_group = match state.groups.get_mut(&trig_id) {
            None => {
                info!(trig_id = %trig_id, "seeding new event group");
                let group = EventGroup::seeded_from(&event);
                state.groups.insert(trig_id.clone(), group);
                true
            }
            Some(group) => {
                if group.classification == event.classification {
                    group.merge(&event);
                } else {
                    warn!(
                        trig_id = %trig_id,
                        group = %group.classification,
                        event = %event.classification,
                        "classification conflict; ignoring event"
                    );
                    event.ignored = true;
                }
                false
            }
        };

        state.events.insert(event_id, event);
        drop(state);

        Ok(EventGroupRef {
            trig_id,
            event_id,
            is_new_group,
        })
    }

    /// Returns a snapshot of the group for a trigger id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn group(&self, trig_id: &str) -> Result<Option<EventGroup>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.groups.get(trig_id).cloned())
    }

    /// Flags or unflags an entire group as ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupNotFound`] if no group exists for the id.
    pub fn set_group_ignored(&self, trig_id: &str, ignored: bool) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let group = state
            .groups
            .get_mut(trig_id)
            .ok_or_else(|| Error::GroupNotFound {
                trig_id: trig_id.to_string(),
            })?;
        group.ignored = ignored;
        Ok(())
    }

    /// Returns a stored event by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn event(&self, id: EventId) -> Result<Option<Event>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.events.get(&id).cloned())
    }

    /// Returns all events for a trigger id, most recently received first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn events_for(&self, trig_id: &str) -> Result<Vec<Event>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut events: Vec<Event> = state
            .events
            .values()
            .filter(|e| e.trig_id == trig_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.received_at.cmp(&a.received_at).then(b.id.cmp(&a.id)));
        Ok(events)
    }

    /// Returns the most recently received event for a trigger id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn latest_event(&self, trig_id: &str) -> Result<Option<Event>> {
        Ok(self.events_for(trig_id)?.into_iter().next())
    }

    /// Returns the number of groups currently held.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn group_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.groups.len())
    }
}
