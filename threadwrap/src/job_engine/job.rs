// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::fmt;

/// Identifier handed out by `submit`. Starts at 1 and is never reused while
/// the dispatcher lives.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct JobId(pub(crate) u32);

impl JobId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a queued or delivered job stands for.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum JobKind {
    /// A call whose return value is handed back on fetch.
    Call,
    /// A call that only reports success or failure.
    VoidCall,
    /// A relayed signal notice. Never executed by the worker.
    Signal,
}

/// Whether an operation may suspend the calling thread.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum WaitMode {
    /// Return immediately, reporting `NotReady` if there is nothing yet.
    #[default]
    Poll,
    /// Suspend the calling thread on its own condition variable until the
    /// worker deposits something. Blocks forever if nothing ever arrives.
    Block,
}

/// Owned, type-erased result of a job. Void calls produce an empty value.
pub struct Value(Option<Box<dyn Any + Send>>);

impl Value {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    pub fn void() -> Self {
        Self(None)
    }

    pub fn is_void(&self) -> bool {
        self.0.is_none()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.0.as_ref().map(|v| v.is::<T>()).unwrap_or(false)
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_ref().and_then(|v| v.downcast_ref::<T>())
    }

    /// Takes the value out if it has type `T`, otherwise gives it back.
    pub fn downcast<T: 'static>(self) -> Result<T, Value> {
        match self.0 {
            Some(boxed) => boxed
                .downcast::<T>()
                .map(|v| *v)
                .map_err(|other| Value(Some(other))),
            None => Err(Value(None)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Value(..)"),
            None => f.write_str("Value(void)"),
        }
    }
}

pub trait Job: Send + 'static {
    /// Free-form description, used for logging or debugging
    fn desc(&self) -> &str;

    fn kind(&self) -> JobKind {
        JobKind::Call
    }

    /// Runs on the worker thread. Whatever the job owns (its argument) is
    /// dropped there as well, including when the job is never executed.
    fn execute(self: Box<Self>) -> anyhow::Result<Value>;
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("kind", &self.kind())
            .field("desc", &self.desc())
            .finish()
    }
}
