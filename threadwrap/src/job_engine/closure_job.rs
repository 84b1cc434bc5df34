// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::job_engine::job::{Job, JobKind, Value};

/// A function together with the argument it is going to be called with.
///
/// The argument is owned by the job from submission on. Its `Drop` acts as
/// the argument destructor and runs on the worker thread, whether the job
/// gets executed, cancelled or discarded at shutdown.
pub struct ClosureJob<A, F> {
    desc: String,
    kind: JobKind,
    arg: A,
    func: F,
}

impl<A, T, F> ClosureJob<A, F>
where
    A: Send + 'static,
    T: Send + 'static,
    F: FnOnce(A) -> anyhow::Result<T> + Send + 'static,
{
    pub fn new(desc: impl Into<String>, arg: A, func: F) -> Self {
        Self {
            desc: desc.into(),
            kind: JobKind::Call,
            arg,
            func,
        }
    }
}

impl<A, F> ClosureJob<A, F>
where
    A: Send + 'static,
    F: FnOnce(A) -> anyhow::Result<()> + Send + 'static,
{
    pub fn new_void(desc: impl Into<String>, arg: A, func: F) -> Self {
        Self {
            desc: desc.into(),
            kind: JobKind::VoidCall,
            arg,
            func,
        }
    }
}

impl<A, T, F> Job for ClosureJob<A, F>
where
    A: Send + 'static,
    T: Send + 'static,
    F: FnOnce(A) -> anyhow::Result<T> + Send + 'static,
{
    fn desc(&self) -> &str {
        &self.desc
    }

    fn kind(&self) -> JobKind {
        self.kind
    }

    fn execute(self: Box<Self>) -> anyhow::Result<Value> {
        let ClosureJob {
            kind, arg, func, ..
        } = *self;
        let result = func(arg)?;
        match kind {
            JobKind::VoidCall => Ok(Value::void()),
            _ => Ok(Value::new(result)),
        }
    }
}
