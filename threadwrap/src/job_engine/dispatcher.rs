// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use async_channel::Sender;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::DispatcherConfig;
use crate::error::{DispatchError, Result};
use crate::job_engine::caller::CallerContext;
use crate::job_engine::closure_job::ClosureJob;
use crate::job_engine::job::{Job, JobId, Value, WaitMode};
use crate::job_engine::registry::JobRegistry;
use crate::job_engine::worker::worker_loop;
use crate::notification::{Notification, NotificationChannel, NotificationKind, NotificationReceiver};
use crate::signals::relay::{SignalEvent, SignalNotice, SignalRelay, Subscription, SubscriptionId};
use crate::signals::source::{Emission, EventSource};

pub(crate) struct QueuedJob {
    pub id: JobId,
    pub job: Box<dyn Job>,
}

pub(crate) struct RunningJob {
    pub id: JobId,
    pub owner: Arc<CallerContext>,
}

/// State shared between the callers and the worker thread. Every structure
/// has its own lock; none of them is held while a job or a callback runs.
pub(crate) struct Shared {
    pub config: DispatcherConfig,
    pub inbox: Sender<QueuedJob>,
    pub registry: Mutex<JobRegistry>,
    pub contexts: Mutex<HashMap<ThreadId, Arc<CallerContext>>>,
    pub relay: Mutex<SignalRelay>,
    pub running: Mutex<Option<RunningJob>>,
    pub notifier: Mutex<Option<NotificationChannel>>,
    pub closing: AtomicBool,
    pub worker_thread: OnceLock<ThreadId>,
}

impl Shared {
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// The calling thread's context, created on first use.
    pub fn context(&self) -> Arc<CallerContext> {
        let id = thread::current().id();
        self.contexts
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(CallerContext::new(id)))
            .clone()
    }

    pub fn notify(&self, kind: NotificationKind, id: u64) {
        if let Some(channel) = self.notifier.lock().as_ref() {
            channel.post(Notification { kind, id });
        }
    }

    fn on_worker_thread(&self) -> bool {
        self.worker_thread.get() == Some(&thread::current().id())
    }

    /// Native handler body for every relayed subscription. The notice always
    /// goes to the subscription owner; the subscription's flags decide which
    /// emissions are relayed at all.
    pub fn relay_emission(&self, id: SubscriptionId, emission: &Emission) {
        let executing = if self.on_worker_thread() {
            self.running
                .lock()
                .as_ref()
                .map(|running| (running.id, running.owner.clone()))
        } else {
            None
        };
        let routed = self
            .relay
            .lock()
            .route(id, executing.as_ref().map(|(_, submitter)| submitter));
        let Some((owner, callback)) = routed else {
            debug!(
                "Not relaying '{}' from {} (subscription {id})",
                emission.signal, emission.source
            );
            return;
        };
        match &executing {
            Some((job, _)) => debug!(
                "Relaying '{}' from {} (subscription {id}, job {job}) to {:?}",
                emission.signal,
                emission.source,
                owner.thread()
            ),
            None => debug!(
                "Relaying '{}' from {} (subscription {id}, outside any job) to {:?}",
                emission.signal,
                emission.source,
                owner.thread()
            ),
        }
        owner.deliver_signal(SignalNotice::new(id, emission, callback));
        self.notify(NotificationKind::Signal, id.as_u64());
    }
}

/// Runs submitted calls serially on one private worker thread.
///
/// A `Dispatcher` is `Send + Sync`; share it by reference (scoped threads) or
/// through an `Arc`. Each calling thread only ever sees the results of the
/// jobs it submitted itself.
///
/// A job that never returns stalls the worker and with it every other job of
/// this dispatcher. There is no execution timeout.
pub struct Dispatcher {
    shared: Arc<Shared>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("thread_name", &self.shared.config.thread_name)
            .field("closing", &self.shared.is_closing())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Result<Self> {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Result<Self> {
        let (tx, rx) = async_channel::unbounded();
        let notifier = if config.notification_channel {
            Some(NotificationChannel::open()?)
        } else {
            None
        };
        let thread_name = config.thread_name.clone();

        let shared = Arc::new(Shared {
            config,
            inbox: tx,
            registry: Mutex::new(JobRegistry::new()),
            contexts: Mutex::new(HashMap::new()),
            relay: Mutex::new(SignalRelay::new()),
            running: Mutex::new(None),
            notifier: Mutex::new(notifier),
            closing: AtomicBool::new(false),
            worker_thread: OnceLock::new(),
        });

        // run jobs in a dedicated thread
        let shared_in_thread = shared.clone();
        let thread_handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || worker_loop(shared_in_thread, rx))
            .map_err(DispatchError::Spawn)?;
        let _ = shared.worker_thread.set(thread_handle.thread().id());

        Ok(Self {
            shared,
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }

    /// Queues `func(arg)` for the worker. Never blocks.
    pub fn submit<A, T, F>(&self, arg: A, func: F) -> Result<JobId>
    where
        A: Send + 'static,
        T: Send + 'static,
        F: FnOnce(A) -> anyhow::Result<T> + Send + 'static,
    {
        self.submit_job(ClosureJob::new(std::any::type_name::<F>(), arg, func))
    }

    /// Like `submit`, for functions without a return value. Fetching the job
    /// yields a void `Value`.
    pub fn submit_void<A, F>(&self, arg: A, func: F) -> Result<JobId>
    where
        A: Send + 'static,
        F: FnOnce(A) -> anyhow::Result<()> + Send + 'static,
    {
        self.submit_job(ClosureJob::new_void(std::any::type_name::<F>(), arg, func))
    }

    pub fn submit_job<J: Job>(&self, job: J) -> Result<JobId> {
        let owner = self.shared.context();
        let mut registry = self.shared.registry.lock();
        if self.shared.is_closing() {
            return Err(DispatchError::ShuttingDown);
        }
        let id = registry.register(owner)?;
        debug!("Queueing job {id}: {}", job.desc());
        // ids are handed out under the registry lock, so inbox order is id order
        if let Err(rejected) = self.shared.inbox.try_send(QueuedJob {
            id,
            job: Box::new(job),
        }) {
            registry.unregister(id);
            drop(registry);
            drop(rejected);
            return Err(DispatchError::ShuttingDown);
        }
        Ok(id)
    }

    /// Best effort: succeeds only while the job is still queued and only for
    /// the thread that submitted it. A running job is never interrupted.
    pub fn cancel(&self, id: JobId) -> bool {
        let ctx = self.shared.context();
        let cancelled = self.shared.registry.lock().cancel(id, &ctx);
        if cancelled {
            debug!("Cancelled job {id}");
        }
        cancelled
    }

    /// Collects the outcome of job `id`, submitted earlier by this thread.
    ///
    /// Pending signal notices of the calling thread are dispatched on the
    /// way, also while waiting. After a successful fetch the id is forgotten
    /// and a second fetch reports `UnknownJobId`.
    pub fn fetch_result(&self, id: JobId, mode: WaitMode) -> Result<Value> {
        let ctx = self.shared.context();
        let finished = loop {
            dispatch_signals(&ctx);
            let mut outbox = ctx.lock();
            if let Some(job) = outbox.take_finished(id) {
                break job;
            }
            if !self.shared.registry.lock().is_owned_by(id, &ctx) {
                return Err(DispatchError::UnknownJobId(id));
            }
            if mode == WaitMode::Poll {
                return Err(DispatchError::NotReady(id));
            }
            ctx.wait(&mut outbox);
        };
        self.shared.registry.lock().remove(id);
        // notices raised by this job were queued before its outcome
        dispatch_signals(&ctx);
        finished.outcome
    }

    /// `fetch_result` followed by a downcast to `T`.
    pub fn fetch_as<T: 'static>(&self, id: JobId, mode: WaitMode) -> Result<T> {
        self.fetch_result(id, mode)?
            .downcast::<T>()
            .map_err(|_| DispatchError::TypeMismatch(id))
    }

    /// Dispatches the calling thread's pending signal notices. Finished jobs
    /// are left alone. With `WaitMode::Block` waits until at least one notice
    /// arrives. Returns the number of callbacks invoked.
    pub fn iterate(&self, mode: WaitMode) -> usize {
        let ctx = self.shared.context();
        let notices: Vec<SignalNotice> = {
            let mut outbox = ctx.lock();
            if mode == WaitMode::Block {
                while outbox.signals.is_empty() {
                    ctx.wait(&mut outbox);
                }
            }
            outbox.signals.drain(..).collect()
        };
        let count = notices.len();
        for notice in notices {
            notice.dispatch();
        }
        count
    }

    /// Jobs queued but not started yet, over all threads.
    pub fn pending_count(&self) -> usize {
        self.shared.registry.lock().queued_count()
    }

    /// Relays `signal` emissions of `source` to `callback`. The callback only
    /// ever runs on the connecting thread (or the thread that stole the
    /// subscription), during its `iterate` or `fetch_result`.
    ///
    /// * `private_to_thread`: only emissions raised on the worker thread while
    ///   a job executes are relayed. Otherwise emissions from any thread are.
    /// * `private_to_job`: only emissions raised while one of the connecting
    ///   thread's own jobs executes are relayed.
    pub fn connect<F>(
        &self,
        source: &EventSource,
        signal: &str,
        private_to_thread: bool,
        private_to_job: bool,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(&SignalEvent) + Send + Sync + 'static,
    {
        let owner = self.shared.context();
        let mut relay = self.shared.relay.lock();
        let id = relay.allocate_id();
        let weak = Arc::downgrade(&self.shared);
        let handler = source.connect(signal, move |emission| {
            if let Some(shared) = weak.upgrade() {
                shared.relay_emission(id, emission);
            }
        });
        relay.insert(
            id,
            Subscription {
                source: source.clone(),
                handler,
                signal: signal.to_string(),
                owner,
                private_to_thread,
                private_to_job,
                callback: Arc::new(callback),
            },
        );
        debug!("Connected subscription {id} to '{signal}' of {}", source.id());
        id
    }

    /// No emission after this returns reaches the callback. Notices already
    /// sitting in an outbox are still delivered.
    pub fn disconnect(&self, id: SubscriptionId) -> Result<()> {
        let sub = self
            .shared
            .relay
            .lock()
            .remove(id)
            .ok_or(DispatchError::UnknownSubscription(id))?;
        sub.source.disconnect(sub.handler);
        debug!("Disconnected subscription {id} from '{}'", sub.signal);
        Ok(())
    }

    /// Moves delivery of subscription `id` to the calling thread. The native
    /// connection on the source stays as it is.
    pub fn steal_signal(&self, id: SubscriptionId) -> Result<()> {
        let ctx = self.shared.context();
        if self.shared.relay.lock().set_owner(id, ctx) {
            debug!("Subscription {id} now delivered to {:?}", thread::current().id());
            Ok(())
        } else {
            Err(DispatchError::UnknownSubscription(id))
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.relay.lock().len()
    }

    /// The pollable handle, opened on first call. Every call returns the same
    /// receiver until `release_notification_handle`.
    pub fn notification_handle(&self) -> Result<Arc<NotificationReceiver>> {
        let mut notifier = self.shared.notifier.lock();
        if let Some(channel) = notifier.as_ref() {
            return Ok(channel.receiver());
        }
        let channel = NotificationChannel::open()?;
        let receiver = channel.receiver();
        *notifier = Some(channel);
        Ok(receiver)
    }

    /// Stops notification writes and closes the pipe's write end. Results and
    /// signals keep flowing through `fetch_result` and `iterate`.
    pub fn release_notification_handle(&self) {
        if self.shared.notifier.lock().take().is_some() {
            debug!("Notification channel released");
        }
    }

    pub fn is_closing(&self) -> bool {
        self.shared.is_closing()
    }

    /// Begins shutdown: no more submissions; the running job finishes, queued
    /// ones are answered with `ShuttingDown`. Does not wait.
    pub fn close(&self) {
        {
            let _registry = self.shared.registry.lock();
            if self.shared.closing.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        self.shared.inbox.close();
        debug!("Dispatcher closed, pending jobs will be discarded");
    }

    /// Closes the dispatcher and joins the worker thread.
    pub fn wait_until_finished(&self) {
        self.close();
        if self.shared.on_worker_thread() {
            warn!("wait_until_finished called from a job, not joining the worker");
            return;
        }
        let handle = self.thread_handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
            info!("Dispatcher '{}' finished", self.shared.config.thread_name);
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.wait_until_finished();
        for sub in self.shared.relay.lock().drain() {
            sub.source.disconnect(sub.handler);
        }
    }
}

fn dispatch_signals(ctx: &CallerContext) {
    for notice in ctx.drain_signals() {
        notice.dispatch();
    }
}
