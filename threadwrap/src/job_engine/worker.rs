// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use anyhow::anyhow;
use async_channel::Receiver;
use log::{debug, info};

use crate::error::{DispatchError, Result};
use crate::job_engine::caller::FinishedJob;
use crate::job_engine::dispatcher::{QueuedJob, RunningJob, Shared};
use crate::job_engine::job::{Job, JobId, Value};
use crate::job_engine::registry::JobState;
use crate::notification::NotificationKind;

/// The worker thread: pops jobs in inbox order, one at a time, and routes
/// every outcome to the outbox of the thread that submitted the job.
///
/// Exits once the inbox is closed and drained. Jobs still queued at that
/// point are not executed; their owners get `ShuttingDown`.
pub(crate) fn worker_loop(shared: Arc<Shared>, rx: Receiver<QueuedJob>) {
    let _ = shared.worker_thread.set(thread::current().id());
    info!("Worker loop started");

    while let Ok(QueuedJob { id, job }) = rx.recv_blocking() {
        let kind = job.kind();
        // `close` flips the flag under the registry lock
        let (state, owner) = {
            let mut registry = shared.registry.lock();
            registry.start(id, shared.is_closing())
        };

        let outcome = match state {
            JobState::Running => {
                *shared.running.lock() = Some(RunningJob {
                    id,
                    owner: owner.clone(),
                });
                let outcome = execute(id, job, shared.config.catch_panics);
                *shared.running.lock() = None;
                outcome
            }
            JobState::Cancelled => {
                debug!("Skipping cancelled job {id}: {}", job.desc());
                drop(job);
                Err(DispatchError::Cancelled(id))
            }
            _ => {
                debug!("Discarding job {id} at shutdown: {}", job.desc());
                drop(job);
                Err(DispatchError::ShuttingDown)
            }
        };

        shared.registry.lock().finish(id);
        owner.deliver_job(FinishedJob { id, kind, outcome });
        shared.notify(NotificationKind::Job, u64::from(id.as_u32()));
    }

    info!("Worker loop ended, inbox closed");
}

fn execute(id: JobId, job: Box<dyn Job>, catch_panics: bool) -> Result<Value> {
    debug!("Executing job {id}: {}", job.desc());
    let result = if catch_panics {
        match panic::catch_unwind(AssertUnwindSafe(move || job.execute())) {
            Ok(result) => result,
            Err(payload) => Err(anyhow!("job {id} panicked: {}", panic_message(&payload))),
        }
    } else {
        job.execute()
    };
    result.map_err(|e| {
        debug!("Job {id} failed: {e:#}");
        DispatchError::Execution(e)
    })
}

fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
