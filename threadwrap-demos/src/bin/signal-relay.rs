// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

// Two caller threads share one object that only the worker thread touches.
// The observer subscribes to its signals, the writer modifies it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use clap::{Parser, ValueEnum};
use log::info;
use threadwrap::{Dispatcher, EventSource, SignalValue, WaitMode};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
#[clap(rename_all = "kebab-case")]
enum Wait {
    /// Poll for results
    Poll,
    #[default]
    /// Block until results are there
    Block,
}

impl From<Wait> for WaitMode {
    fn from(w: Wait) -> Self {
        match w {
            Wait::Poll => WaitMode::Poll,
            Wait::Block => WaitMode::Block,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Rows the writer inserts
    #[arg(long, default_value_t = 5)]
    rows: usize,

    /// Relay only emissions raised by jobs on the worker thread
    #[arg(long)]
    private_to_thread: bool,

    /// How the writer collects its results
    #[arg(long, value_enum, default_value_t)]
    wait: Wait,
}

struct Table {
    rows: Vec<String>,
    events: EventSource,
}

impl Table {
    fn insert(&mut self, row: String) {
        self.rows.push(row.clone());
        self.events.emit(
            "row-inserted",
            [SignalValue::UInt(self.rows.len() as u64), SignalValue::Text(row)],
        );
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let dispatcher = Dispatcher::new()?;
    let events = EventSource::new();
    let table = Arc::new(Mutex::new(Table {
        rows: Vec::new(),
        events: events.clone(),
    }));
    let received = Arc::new(AtomicUsize::new(0));

    let r = received.clone();
    let subscription = dispatcher.connect(
        &events,
        "row-inserted",
        args.private_to_thread,
        false,
        move |event| {
            r.fetch_add(1, Ordering::SeqCst);
            info!(
                "{:?} sees row-inserted {:?}",
                thread::current().name().unwrap_or("unnamed"),
                event.args
            );
        },
    );

    let mode = WaitMode::from(args.wait);
    thread::scope(|s| -> anyhow::Result<()> {
        let writer = thread::Builder::new()
            .name("writer".into())
            .spawn_scoped(s, || -> anyhow::Result<()> {
                for i in 0..args.rows {
                    let table = table.clone();
                    let id = dispatcher.submit_void(format!("row {i}"), move |row| {
                        table
                            .lock()
                            .map_err(|_| anyhow::anyhow!("table poisoned"))?
                            .insert(row);
                        Ok(())
                    })?;
                    loop {
                        match dispatcher.fetch_result(id, mode) {
                            Ok(_) => break,
                            Err(e) if e.is_not_ready() => thread::yield_now(),
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                Ok(())
            })?;
        writer
            .join()
            .map_err(|_| anyhow::anyhow!("writer thread panicked"))??;
        Ok(())
    })?;

    // the observer is the main thread
    while dispatcher.iterate(WaitMode::Poll) > 0 {}
    dispatcher.disconnect(subscription)?;
    info!(
        "{} callbacks for {} rows (private_to_thread: {})",
        received.load(Ordering::SeqCst),
        args.rows,
        args.private_to_thread
    );
    Ok(())
}
