// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use thiserror::Error;

use crate::job_engine::job::JobId;
use crate::signals::relay::SubscriptionId;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The id was never issued, was already collected, or belongs to another
    /// thread.
    #[error("unknown job id {0}")]
    UnknownJobId(JobId),

    #[error("dispatcher is shutting down")]
    ShuttingDown,

    /// The submitted function failed. The payload is its own error, untouched.
    #[error("job execution failed: {0}")]
    Execution(#[source] anyhow::Error),

    /// Not a failure: the job has not completed yet, try again later.
    #[error("job {0} is not ready yet")]
    NotReady(JobId),

    #[error("job {0} was cancelled before it started")]
    Cancelled(JobId),

    #[error("job {0} produced a value of a different type")]
    TypeMismatch(JobId),

    #[error("unknown signal subscription {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("job ids exhausted")]
    IdsExhausted,

    #[error("notification channel: {0}")]
    Notification(#[from] nix::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl DispatchError {
    pub fn is_not_ready(&self) -> bool {
        matches!(self, DispatchError::NotReady(_))
    }
}

pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
