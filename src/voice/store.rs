//! In-memory call record store
//!
//! Maps a Twilio call SID to its [`CallRecord`] and the [`Rendezvous`] the
//! dialing request waits on. Both are inserted together under one lock, so
//! a rendezvous never exists without its record. Records live for the
//! lifetime of the process.

use super::call::CallRecord;
use super::rendezvous::Rendezvous;
use super::{Result, VoiceError};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug)]
struct CallSlot {
    record: CallRecord,
    rendezvous: Rendezvous,
}

/// Call store shared between the orchestrator and the webhook handlers
#[derive(Debug, Default)]
pub struct CallStore {
    calls: RwLock<HashMap<String, CallSlot>>,
}

impl CallStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record and return the rendezvous tied to it.
    ///
    /// Fails if the call SID is already tracked.
    pub fn create(&self, record: CallRecord) -> Result<Rendezvous> {
        let mut calls = self.calls.write();
        if calls.contains_key(&record.call_id) {
            return Err(VoiceError::DuplicateCall(record.call_id));
        }

        let rendezvous = Rendezvous::new();
        calls.insert(
            record.call_id.clone(),
            CallSlot {
                record,
                rendezvous: rendezvous.clone(),
            },
        );
        Ok(rendezvous)
    }

    /// Snapshot of a record
    pub fn get(&self, call_id: &str) -> Option<CallRecord> {
        self.calls.read().get(call_id).map(|slot| slot.record.clone())
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.calls.read().contains_key(call_id)
    }

    /// Apply `f` to the record under the store lock. Returns `None` when the
    /// call SID is unknown.
    pub fn update_if_exists<R>(
        &self,
        call_id: &str,
        f: impl FnOnce(&mut CallRecord) -> R,
    ) -> Option<R> {
        let mut calls = self.calls.write();
        calls.get_mut(call_id).map(|slot| f(&mut slot.record))
    }

    /// Fire the rendezvous for a call. Unknown SIDs and repeated signals are
    /// no-ops; returns `true` only when this call fired it.
    pub fn signal(&self, call_id: &str) -> bool {
        self.calls
            .read()
            .get(call_id)
            .map(|slot| slot.rendezvous.signal())
            .unwrap_or(false)
    }

    /// Number of tracked calls
    pub fn len(&self) -> usize {
        self.calls.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.read().is_empty()
    }

    /// Number of calls that have not reached a terminal state
    pub fn active_count(&self) -> usize {
        self.calls
            .read()
            .values()
            .filter(|slot| !slot.record.is_terminal())
            .count()
    }
}
