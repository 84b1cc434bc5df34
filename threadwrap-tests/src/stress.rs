// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::thread;
use std::time::Instant;

use log::debug;
use threadwrap::{Dispatcher, JobId, WaitMode};

use crate::stress_log::{LoggedJob, StressLog};

/// Input submitted by `thread` for its `index`-th job. Distinct over all
/// threads so that leaked results would show up as duplicates.
pub fn input_for(thread: usize, index: usize, jobs_per_thread: usize) -> u64 {
    (thread * jobs_per_thread + index) as u64
}

/// Every thread submits `jobs_per_thread` squares, then fetches them in
/// submission order.
pub fn run_stress(
    dispatcher: &Dispatcher,
    threads: usize,
    jobs_per_thread: usize,
    mode: WaitMode,
) -> anyhow::Result<StressLog> {
    let per_thread: Vec<anyhow::Result<Vec<LoggedJob>>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                s.spawn(move || -> anyhow::Result<Vec<LoggedJob>> {
                    let submitted = (0..jobs_per_thread)
                        .map(|i| {
                            let x = input_for(t, i, jobs_per_thread);
                            dispatcher.submit(x, |x: u64| Ok(x.wrapping_mul(x))).map(|id| (x, id))
                        })
                        .collect::<Result<Vec<(u64, JobId)>, _>>()?;
                    debug!("Thread {t} submitted {} jobs", submitted.len());

                    let mut logged = Vec::with_capacity(submitted.len());
                    for (x, id) in submitted {
                        let start = Instant::now();
                        let output = loop {
                            match dispatcher.fetch_as::<u64>(id, mode) {
                                Ok(v) => break v,
                                Err(e) if e.is_not_ready() => thread::yield_now(),
                                Err(e) => return Err(e.into()),
                            }
                        };
                        logged.push(LoggedJob {
                            thread: t,
                            job_id: id.as_u32(),
                            input: x,
                            output,
                            fetch_nsec: start.elapsed().as_nanos() as u64,
                        });
                    }
                    Ok(logged)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("stress thread panicked")))
            })
            .collect()
    });

    let mut log = StressLog {
        threads,
        jobs_per_thread,
        jobs: Vec::new(),
    };
    for jobs in per_thread {
        log.jobs.extend(jobs?);
    }
    Ok(log)
}
