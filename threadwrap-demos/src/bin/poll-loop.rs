// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

// Drives a dispatcher from a plain poll(2) loop: results and signals are only
// collected when the notification pipe becomes readable.

use std::collections::HashSet;
use std::os::fd::AsFd;
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

use clap::Parser;
use log::{debug, info};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use threadwrap::{
    Dispatcher, DispatcherConfig, EventSource, JobId, SignalValue, WaitMode,
};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Number of jobs to submit
    #[arg(long, default_value_t = 10)]
    jobs: u64,

    /// Simulated work per job in milliseconds
    #[arg(long, default_value_t = 20)]
    work_ms: u64,

    /// Name of the worker thread
    #[arg(long, default_value = "poll-loop-worker")]
    thread_name: String,
}

/// Lives on the worker thread only. Callers see it through its events.
struct Accumulator {
    total: u64,
    events: EventSource,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let dispatcher = Dispatcher::with_config(
        DispatcherConfig::default()
            .with_thread_name(args.thread_name.clone())
            .with_notification_channel(true),
    )?;
    let receiver = dispatcher.notification_handle()?;

    let events = EventSource::new();
    dispatcher.connect(&events, "total-changed", true, false, |event| {
        if let Some(SignalValue::UInt(total)) = event.args.first() {
            info!("Running total is now {total}");
        }
    });

    // only ever locked by jobs, i.e. on the worker thread
    let accumulator = Arc::new(Mutex::new(Accumulator {
        total: 0,
        events: events.clone(),
    }));

    let mut outstanding: HashSet<JobId> = HashSet::new();
    for x in 1..=args.jobs {
        let accumulator = accumulator.clone();
        let work = Duration::from_millis(args.work_ms);
        let id = dispatcher.submit(x, move |x| {
            sleep(work);
            let mut acc = accumulator
                .lock()
                .map_err(|_| anyhow::anyhow!("accumulator poisoned"))?;
            acc.total += x * x;
            acc.events.emit("total-changed", [acc.total]);
            Ok(x * x)
        })?;
        outstanding.insert(id);
    }
    info!("Submitted {} jobs", outstanding.len());

    while !outstanding.is_empty() {
        let mut fds = [PollFd::new(receiver.as_fd(), PollFlags::POLLIN)];
        if poll(&mut fds, PollTimeout::from(1000u16))? > 0 {
            // records are only a wake-up hint, a full pipe drops them
            let records = receiver.read_notifications()?;
            debug!("Woken by {} notification(s)", records.len());
        }
        dispatcher.iterate(WaitMode::Poll);

        let mut collected = Vec::new();
        for &id in &outstanding {
            match dispatcher.fetch_as::<u64>(id, WaitMode::Poll) {
                Ok(square) => {
                    info!("Job {id} returned {square}");
                    collected.push(id);
                }
                Err(e) if e.is_not_ready() => {}
                Err(e) => return Err(e.into()),
            }
        }
        for id in collected {
            outstanding.remove(&id);
        }
        debug!("{} jobs outstanding", outstanding.len());
    }

    dispatcher.release_notification_handle();
    dispatcher.wait_until_finished();
    info!("All jobs collected");
    Ok(())
}
