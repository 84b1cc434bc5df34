// SPDX-License-Identifier: MIT
// threadwrap: run non thread safe code on a private worker thread
//
// - Callers submit calls from any thread and fetch their own results.
// - Signals emitted on the worker are relayed back to caller threads.
// - A pipe can announce deliveries to an external poll loop.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod config;
pub mod error;
pub mod job_engine;
pub mod notification;
pub mod signals;

pub use crate::config::DispatcherConfig;
pub use crate::error::{DispatchError, Result};
pub use crate::job_engine::closure_job::ClosureJob;
pub use crate::job_engine::dispatcher::Dispatcher;
pub use crate::job_engine::job::{Job, JobId, JobKind, Value, WaitMode};
pub use crate::notification::{Notification, NotificationKind, NotificationReceiver};
pub use crate::signals::relay::{SignalEvent, SubscriptionId};
pub use crate::signals::source::{EventSource, ObjectId, SignalArgs, SignalValue};
