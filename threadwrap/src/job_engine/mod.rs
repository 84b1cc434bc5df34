// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Thread-Isolation Dispatcher
//!
//! ## Overview
//! Code that is not thread safe is confined to one private worker thread.
//! Any number of caller threads hand it work and collect the outcome later.
//!
//! - All callers push jobs into one shared inbox (unbounded, FIFO).
//! - The worker executes them one after the other, never two at once.
//! - Each caller thread gets its own outbox, created lazily on first use.
//!   Outcomes are routed back to the outbox of the submitting thread only.
//! - Signals emitted on the worker are relayed into outboxes as well.
//! - Optionally every delivery is announced on a pipe for poll loops.
//!
//! ## Job lifecycle
//! `Queued` -> `Running` -> `Done` -> fetched (entry removed), or
//! `Queued` -> `Cancelled` -> `Done` -> fetched. Cancelling is only possible
//! while queued.
//!
//!
//!    +----------+   +----------+
//!    | caller A |   | caller B |
//!    +----+-----+   +----+-----+
//!         | (1) submit   |
//!         v              v
//!    +-------------------------+
//!    |      shared inbox       |
//!    +------------+------------+
//!                 | (2) pop
//!          +------v------+
//!          |   worker    |---- signals ----+
//!          +------+------+                 |
//!                 | (3) route              |
//!        +--------+--------+               |
//!        v                 v               v
//!   +----------+     +----------+    (same outboxes)
//!   | outbox A |     | outbox B |
//!   +----+-----+     +----+-----+
//!        | (4) fetch      |
//!        v                v
//!     caller A         caller B

pub mod caller;
pub mod closure_job;
pub mod dispatcher;
pub mod job;
pub mod registry;
mod worker;
