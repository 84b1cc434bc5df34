// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use clap::Parser;
use log::info;
use threadwrap::{Dispatcher, WaitMode};
use threadwrap_tests::stress::run_stress;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Number of caller threads
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Jobs submitted by each thread
    #[arg(long, default_value_t = 1000)]
    jobs: usize,

    /// Poll instead of blocking when fetching
    #[arg(long)]
    poll: bool,

    /// Print the full log as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let dispatcher = Dispatcher::new()?;
    let mode = if args.poll {
        WaitMode::Poll
    } else {
        WaitMode::Block
    };
    let log = run_stress(&dispatcher, args.threads, args.jobs, mode)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        let slowest = log.jobs.iter().map(|j| j.fetch_nsec).max().unwrap_or(0);
        info!(
            "{} jobs from {} threads, slowest fetch {} us",
            log.jobs.len(),
            log.threads,
            slowest / 1000
        );
    }

    if !log.is_consistent() {
        anyhow::bail!("results were lost, duplicated or delivered to the wrong thread");
    }
    Ok(())
}
