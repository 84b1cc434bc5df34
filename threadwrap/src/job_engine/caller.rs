// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::VecDeque;
use std::thread::ThreadId;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::Result;
use crate::job_engine::job::{JobId, JobKind, Value};
use crate::signals::relay::SignalNotice;

/// A job that went through the worker, carrying its outcome.
#[derive(Debug)]
pub struct FinishedJob {
    pub id: JobId,
    pub kind: JobKind,
    pub outcome: Result<Value>,
}

/// Everything waiting to be collected by one caller thread.
#[derive(Debug, Default)]
pub struct Outbox {
    pub finished: VecDeque<FinishedJob>,
    pub signals: VecDeque<SignalNotice>,
}

impl Outbox {
    pub fn take_finished(&mut self, id: JobId) -> Option<FinishedJob> {
        let pos = self.finished.iter().position(|job| job.id == id)?;
        self.finished.remove(pos)
    }
}

/// Per-thread state: created lazily the first time a thread uses the
/// dispatcher and kept until the dispatcher goes away.
#[derive(Debug)]
pub struct CallerContext {
    thread: ThreadId,
    outbox: Mutex<Outbox>,
    delivered: Condvar,
}

impl CallerContext {
    pub fn new(thread: ThreadId) -> Self {
        Self {
            thread,
            outbox: Mutex::new(Outbox::default()),
            delivered: Condvar::new(),
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn lock(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock()
    }

    /// Suspends until the worker deposits something into this outbox.
    pub fn wait(&self, guard: &mut MutexGuard<'_, Outbox>) {
        self.delivered.wait(guard);
    }

    pub fn deliver_job(&self, job: FinishedJob) {
        self.outbox.lock().finished.push_back(job);
        self.delivered.notify_all();
    }

    pub fn deliver_signal(&self, notice: SignalNotice) {
        self.outbox.lock().signals.push_back(notice);
        self.delivered.notify_all();
    }

    /// Removes all pending signal notices, leaving finished jobs in place.
    pub fn drain_signals(&self) -> Vec<SignalNotice> {
        self.outbox.lock().signals.drain(..).collect()
    }
}
