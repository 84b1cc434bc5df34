// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::job_engine::caller::CallerContext;
use crate::signals::source::{Emission, EventSource, HandlerId, ObjectId, SignalArgs};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a subscriber's callback gets to see.
#[derive(Debug, Clone)]
pub struct SignalEvent {
    pub subscription: SubscriptionId,
    pub source: ObjectId,
    pub signal: String,
    pub args: SignalArgs,
}

pub type SignalCallback = dyn Fn(&SignalEvent) + Send + Sync;

/// A relayed emission waiting in a caller's outbox.
pub struct SignalNotice {
    event: SignalEvent,
    callback: Arc<SignalCallback>,
}

impl SignalNotice {
    pub(crate) fn new(
        subscription: SubscriptionId,
        emission: &Emission,
        callback: Arc<SignalCallback>,
    ) -> Self {
        Self {
            event: SignalEvent {
                subscription,
                source: emission.source,
                signal: emission.signal.clone(),
                args: emission.args.clone(),
            },
            callback,
        }
    }

    pub fn event(&self) -> &SignalEvent {
        &self.event
    }

    /// Invokes the callback on the current thread.
    pub fn dispatch(self) {
        (self.callback)(&self.event);
    }
}

impl fmt::Debug for SignalNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalNotice")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

pub(crate) struct Subscription {
    pub source: EventSource,
    pub handler: HandlerId,
    pub signal: String,
    pub owner: Arc<CallerContext>,
    pub private_to_thread: bool,
    pub private_to_job: bool,
    pub callback: Arc<SignalCallback>,
}

/// Subscriptions known to one dispatcher.
pub(crate) struct SignalRelay {
    next_id: u64,
    subscriptions: HashMap<SubscriptionId, Subscription>,
}

impl SignalRelay {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            subscriptions: HashMap::new(),
        }
    }

    pub fn allocate_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, id: SubscriptionId, subscription: Subscription) {
        self.subscriptions.insert(id, subscription);
    }

    pub fn remove(&mut self, id: SubscriptionId) -> Option<Subscription> {
        self.subscriptions.remove(&id)
    }

    pub fn set_owner(&mut self, id: SubscriptionId, owner: Arc<CallerContext>) -> bool {
        match self.subscriptions.get_mut(&id) {
            Some(sub) => {
                sub.owner = owner;
                true
            }
            None => false,
        }
    }

    /// The thread that gets an emission for `id`, if the subscription relays
    /// it. `executing` is the submitter of the job running on the worker, or
    /// `None` for an emission raised outside any job.
    pub fn route(
        &self,
        id: SubscriptionId,
        executing: Option<&Arc<CallerContext>>,
    ) -> Option<(Arc<CallerContext>, Arc<SignalCallback>)> {
        let sub = self.subscriptions.get(&id)?;
        let relayed = match executing {
            Some(submitter) => !sub.private_to_job || submitter.thread() == sub.owner.thread(),
            None => !sub.private_to_thread && !sub.private_to_job,
        };
        relayed.then(|| (sub.owner.clone(), sub.callback.clone()))
    }

    pub fn drain(&mut self) -> Vec<Subscription> {
        self.subscriptions.drain().map(|(_, sub)| sub).collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn foreign_context() -> Arc<CallerContext> {
        thread::spawn(|| Arc::new(CallerContext::new(thread::current().id())))
            .join()
            .unwrap()
    }

    fn subscribe(
        relay: &mut SignalRelay,
        owner: &Arc<CallerContext>,
        private_to_thread: bool,
        private_to_job: bool,
    ) -> SubscriptionId {
        let source = EventSource::new();
        let handler = source.connect("changed", |_| {});
        let id = relay.allocate_id();
        relay.insert(
            id,
            Subscription {
                source,
                handler,
                signal: "changed".into(),
                owner: owner.clone(),
                private_to_thread,
                private_to_job,
                callback: Arc::new(|_: &SignalEvent| {}),
            },
        );
        id
    }

    fn recipient(
        relay: &SignalRelay,
        id: SubscriptionId,
        executing: Option<&Arc<CallerContext>>,
    ) -> Option<thread::ThreadId> {
        relay.route(id, executing).map(|(owner, _)| owner.thread())
    }

    #[test]
    fn shared_subscription_only_reaches_owner() {
        let mut relay = SignalRelay::new();
        let owner = Arc::new(CallerContext::new(thread::current().id()));
        let other = foreign_context();
        let id = subscribe(&mut relay, &owner, false, false);

        assert_eq!(recipient(&relay, id, Some(&other)), Some(owner.thread()));
        assert_eq!(recipient(&relay, id, Some(&owner)), Some(owner.thread()));
        assert_eq!(recipient(&relay, id, None), Some(owner.thread()));
    }

    #[test]
    fn private_to_thread_needs_a_running_job() {
        let mut relay = SignalRelay::new();
        let owner = Arc::new(CallerContext::new(thread::current().id()));
        let other = foreign_context();
        let id = subscribe(&mut relay, &owner, true, false);

        assert_eq!(recipient(&relay, id, Some(&other)), Some(owner.thread()));
        assert_eq!(recipient(&relay, id, None), None);
    }

    #[test]
    fn private_to_job_ignores_foreign_jobs() {
        let mut relay = SignalRelay::new();
        let owner = Arc::new(CallerContext::new(thread::current().id()));
        let other = foreign_context();
        for private_to_thread in [false, true] {
            let id = subscribe(&mut relay, &owner, private_to_thread, true);
            assert!(relay.route(id, Some(&other)).is_none());
            assert!(relay.route(id, None).is_none());
            assert_eq!(recipient(&relay, id, Some(&owner)), Some(owner.thread()));
        }
    }

    #[test]
    fn stolen_subscription_changes_owner() {
        let mut relay = SignalRelay::new();
        let owner = Arc::new(CallerContext::new(thread::current().id()));
        let other = foreign_context();
        let id = subscribe(&mut relay, &owner, true, false);

        assert!(relay.set_owner(id, other.clone()));
        assert_eq!(recipient(&relay, id, Some(&owner)), Some(other.thread()));

        assert!(relay.remove(id).is_some());
        assert!(!relay.set_owner(id, owner));
        assert_eq!(relay.len(), 0);
    }
}
