// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggedJob {
    pub thread: usize,

    pub job_id: u32,

    pub input: u64,

    pub output: u64,

    pub fetch_nsec: u64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct StressLog {
    pub threads: usize,

    pub jobs_per_thread: usize,

    pub jobs: Vec<LoggedJob>,
}

impl StressLog {
    /// Every submitted `x` came back exactly once, as `x * x`, to the thread
    /// that submitted it.
    pub fn is_consistent(&self) -> bool {
        let mut inputs: Vec<u64> = self.jobs.iter().map(|j| j.input).collect();
        inputs.sort_unstable();
        inputs.dedup();
        inputs.len() == self.threads * self.jobs_per_thread
            && self.jobs.len() == inputs.len()
            && self.jobs.iter().all(|j| j.output == j.input.wrapping_mul(j.input))
            && self
                .jobs
                .iter()
                .all(|j| j.input as usize / self.jobs_per_thread.max(1) == j.thread)
    }
}
