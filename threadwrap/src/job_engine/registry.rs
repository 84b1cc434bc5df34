// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DispatchError, Result};
use crate::job_engine::caller::CallerContext;
use crate::job_engine::job::JobId;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JobState {
    Queued,
    /// Still in the inbox, but will be skipped by the worker.
    Cancelled,
    Running,
    /// Outcome deposited in the owner's outbox, not yet fetched.
    Done,
}

#[derive(Debug)]
pub struct RegistryEntry {
    pub owner: Arc<CallerContext>,
    pub state: JobState,
}

/// Job id -> owner and lifecycle state. Guarded by a single mutex in the
/// dispatcher; every queued, running or unfetched job has exactly one entry.
#[derive(Debug)]
pub struct JobRegistry {
    next_id: u32,
    entries: HashMap<JobId, RegistryEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, owner: Arc<CallerContext>) -> Result<JobId> {
        let id = JobId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(DispatchError::IdsExhausted)?;
        self.entries.insert(
            id,
            RegistryEntry {
                owner,
                state: JobState::Queued,
            },
        );
        Ok(id)
    }

    /// Drops an entry whose job never made it into the inbox.
    pub fn unregister(&mut self, id: JobId) {
        self.entries.remove(&id);
    }

    pub fn get(&self, id: JobId) -> Option<&RegistryEntry> {
        self.entries.get(&id)
    }

    /// True if `id` is known and was submitted from `owner`.
    pub fn is_owned_by(&self, id: JobId, owner: &CallerContext) -> bool {
        self.entries
            .get(&id)
            .map(|e| e.owner.thread() == owner.thread())
            .unwrap_or(false)
    }

    pub fn cancel(&mut self, id: JobId, requester: &CallerContext) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry)
                if entry.state == JobState::Queued
                    && entry.owner.thread() == requester.thread() =>
            {
                entry.state = JobState::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Called by the worker when it pops a job from the inbox. A queued job
    /// becomes `Running`, unless the dispatcher is `closing`: then it stays
    /// queued and is discarded. Returns the resulting state and the owner to
    /// route the outcome to.
    pub fn start(&mut self, id: JobId, closing: bool) -> (JobState, Arc<CallerContext>) {
        let entry = self
            .entries
            .get_mut(&id)
            .unwrap_or_else(|| unreachable!("job {id} popped from inbox without registry entry"));
        if entry.state == JobState::Queued && !closing {
            entry.state = JobState::Running;
        }
        (entry.state, entry.owner.clone())
    }

    pub fn finish(&mut self, id: JobId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = JobState::Done;
        }
    }

    pub fn remove(&mut self, id: JobId) -> Option<RegistryEntry> {
        self.entries.remove(&id)
    }

    pub fn queued_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == JobState::Queued)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Arc<CallerContext> {
        Arc::new(CallerContext::new(std::thread::current().id()))
    }

    #[test]
    fn ids_are_monotonic_and_start_at_one() {
        let mut registry = JobRegistry::new();
        let owner = context();
        let a = registry.register(owner.clone()).unwrap();
        let b = registry.register(owner.clone()).unwrap();
        assert_eq!(a.as_u32(), 1);
        assert!(b > a);
        registry.remove(a);
        let c = registry.register(owner).unwrap();
        assert!(c > b);
    }

    #[test]
    fn cancel_only_applies_to_queued_jobs() {
        let mut registry = JobRegistry::new();
        let owner = context();
        let queued = registry.register(owner.clone()).unwrap();
        let running = registry.register(owner.clone()).unwrap();
        registry.start(running, false);

        assert!(registry.cancel(queued, &owner));
        assert!(!registry.cancel(queued, &owner));
        assert!(!registry.cancel(running, &owner));
        assert_eq!(registry.start(queued, false).0, JobState::Cancelled);
        assert_eq!(registry.queued_count(), 0);
    }

    #[test]
    fn closing_keeps_popped_job_out_of_running() {
        let mut registry = JobRegistry::new();
        let owner = context();
        let id = registry.register(owner).unwrap();

        let (state, _) = registry.start(id, true);
        assert_eq!(state, JobState::Queued);
        assert_eq!(registry.get(id).map(|e| e.state), Some(JobState::Queued));
        registry.finish(id);
        assert_eq!(registry.get(id).map(|e| e.state), Some(JobState::Done));
    }

    #[test]
    fn foreign_thread_cannot_cancel() {
        let mut registry = JobRegistry::new();
        let owner = context();
        let id = registry.register(owner.clone()).unwrap();
        let other = std::thread::spawn(|| Arc::new(CallerContext::new(std::thread::current().id())))
            .join()
            .unwrap();
        assert!(!registry.cancel(id, &other));
        assert!(!registry.is_owned_by(id, &other));
        assert!(registry.is_owned_by(id, &owner));
    }

    #[test]
    fn exhausted_ids_are_reported() {
        let mut registry = JobRegistry::new();
        registry.next_id = u32::MAX;
        let owner = context();
        assert!(matches!(
            registry.register(owner),
            Err(DispatchError::IdsExhausted)
        ));
    }
}
