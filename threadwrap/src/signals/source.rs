// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide identity of an event source.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct HandlerId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Bool(v)
    }
}

impl From<i64> for SignalValue {
    fn from(v: i64) -> Self {
        SignalValue::Int(v)
    }
}

impl From<u64> for SignalValue {
    fn from(v: u64) -> Self {
        SignalValue::UInt(v)
    }
}

impl From<f64> for SignalValue {
    fn from(v: f64) -> Self {
        SignalValue::Float(v)
    }
}

impl From<&str> for SignalValue {
    fn from(v: &str) -> Self {
        SignalValue::Text(v.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(v: String) -> Self {
        SignalValue::Text(v)
    }
}

impl From<Vec<u8>> for SignalValue {
    fn from(v: Vec<u8>) -> Self {
        SignalValue::Bytes(v)
    }
}

pub type SignalArgs = SmallVec<[SignalValue; 4]>;

/// One emission as seen by native handlers.
#[derive(Debug, Clone)]
pub struct Emission {
    pub source: ObjectId,
    pub signal: String,
    pub args: SignalArgs,
}

type NativeHandler = Arc<dyn Fn(&Emission) + Send + Sync>;

struct HandlerEntry {
    id: HandlerId,
    signal: String,
    handler: NativeHandler,
}

struct SourceInner {
    id: ObjectId,
    handlers: Mutex<Vec<HandlerEntry>>,
}

/// Emitting side of an object that lives on the worker thread.
///
/// The object itself is only ever touched from jobs; callers keep a clone of
/// its `EventSource` to subscribe through the dispatcher. Handlers are called
/// synchronously, on the emitting thread, in connection order.
#[derive(Clone)]
pub struct EventSource {
    inner: Arc<SourceInner>,
}

impl EventSource {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SourceInner {
                id: ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn connect<F>(&self, signal: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Emission) + Send + Sync + 'static,
    {
        let id = HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed));
        self.inner.handlers.lock().push(HandlerEntry {
            id,
            signal: signal.into(),
            handler: Arc::new(handler),
        });
        id
    }

    pub fn disconnect(&self, id: HandlerId) -> bool {
        let mut handlers = self.inner.handlers.lock();
        let before = handlers.len();
        handlers.retain(|h| h.id != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }

    pub fn emit<I>(&self, signal: &str, args: I)
    where
        I: IntoIterator,
        I::Item: Into<SignalValue>,
    {
        // snapshot, handlers may connect or disconnect while running
        let matching: Vec<NativeHandler> = self
            .inner
            .handlers
            .lock()
            .iter()
            .filter(|h| h.signal == signal)
            .map(|h| h.handler.clone())
            .collect();
        if matching.is_empty() {
            return;
        }
        let emission = Emission {
            source: self.inner.id,
            signal: signal.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        };
        for handler in matching {
            handler(&emission);
        }
    }
}

impl Default for EventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("id", &self.inner.id)
            .field("handlers", &self.handler_count())
            .finish()
    }
}
