// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Events raised by objects while the worker thread manipulates them.
//!
//! Objects that live on the worker own an [`source::EventSource`]. Callers
//! subscribe through the dispatcher, which installs a native handler on the
//! source. When the source emits, the handler packages the emission as a
//! [`relay::SignalNotice`] and drops it into the outbox of the subscribing
//! thread. The callback then runs on that thread, during `iterate` or
//! `fetch_result`.

pub mod relay;
pub mod source;
