//! Session lifecycle manager: the status machine over the session collection.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use corral_shared::fsm::Fsm;
use corral_shared::schemas::session::{
    SessionAction, SessionRecord, SessionStatus, TransitionRecord, session_fsm,
};
use corral_shared::utils::time::epoch_ms;

use crate::events::{EventBus, SessionEvent};
use crate::store::Collection;

pub struct SessionStore {
    col: Collection<SessionRecord>,
    fsm: Fsm<SessionStatus, SessionAction>,
    events: Option<EventBus>,
    next_id: u64,
}

impl SessionStore {
    /// Open the collection and seed the id counter from the directory scan:
    /// `max(parse-int(filename)) + 1`, or 1 for an empty directory.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let col: Collection<SessionRecord> = Collection::new(dir);
        let next_id = col
            .list()
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .map_or(1, |max| max + 1);
        Self {
            col,
            fsm: session_fsm(),
            events: None,
            next_id,
        }
    }

    /// Open with an event bus; every applied transition is published after
    /// it hits disk.
    pub fn with_events(dir: impl Into<PathBuf>, events: EventBus) -> Self {
        let mut store = Self::open(dir);
        store.events = Some(events);
        store
    }

    /// Monotonic within the process; persists across restarts via the scan.
    pub fn generate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Reset the counter after a `clean` purged every record.
    pub fn reset_counter(&mut self) {
        self.next_id = 1;
    }

    pub fn get(&mut self, id: u64) -> Option<SessionRecord> {
        self.col.get(&id.to_string())
    }

    pub fn set(&mut self, record: SessionRecord) {
        self.col.set(&record.id().to_string(), record);
    }

    pub fn delete(&mut self, id: u64) {
        self.col.delete(&id.to_string());
    }

    pub fn save(&mut self) -> Result<()> {
        self.col.save()
    }

    /// Stage and flush in one step.
    pub fn persist(&mut self, record: SessionRecord) -> Result<()> {
        self.set(record);
        self.save()
    }

    pub fn list_ids(&self) -> Vec<u64> {
        self.col
            .list()
            .iter()
            .filter_map(|id| id.parse::<u64>().ok())
            .collect()
    }

    /// All records; soft-deleted sessions are excluded unless asked for.
    pub fn list_records(&mut self, include_deleted: bool) -> Vec<SessionRecord> {
        self.list_ids()
            .into_iter()
            .filter_map(|id| self.get(id))
            .filter(|r| include_deleted || !r.is_deleted())
            .collect()
    }

    /// Apply a lifecycle action: reload the record to absorb concurrent
    /// writes, run the table, stamp `last_transition`, and flush immediately
    /// so the peer sees the change on its next mtime check.
    pub fn transition(&mut self, id: u64, action: SessionAction) -> Result<TransitionRecord> {
        let mut record = self
            .get(id)
            .ok_or_else(|| anyhow!("no such session: {id}"))?;

        let from = record.spec.status;
        let to = self.fsm.transition(from, action).map_err(|e| {
            warn!(session_id = id, %e, "rejected session transition");
            anyhow!("invalid transition for session {id}: {e}")
        })?;

        let transition = TransitionRecord {
            action,
            from,
            to,
            timestamp: epoch_ms(),
        };
        record.spec.status = to;
        record.spec.last_transition = Some(transition.clone());
        self.persist(record)?;

        info!(session_id = id, ?action, ?from, ?to, "session transition");
        if let Some(ref events) = self.events {
            events.publish(SessionEvent {
                session_id: id,
                transition: transition.clone(),
            });
        }
        Ok(transition)
    }

    /// Sessions that should have a live child, for the recovery scan.
    pub fn recoverable(&mut self) -> Vec<SessionRecord> {
        self.list_records(false)
            .into_iter()
            .filter(|r| r.spec.status.expects_child())
            .collect()
    }
}
