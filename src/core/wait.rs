use std::time::Duration;

use tracing::{debug, error, warn};

use crate::core::models::PollOutcome;
use crate::core::transfer_service::TransferService;
use crate::error::{AppError, TransferError};

/// Budget for waiting on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// How long a single attempt may block before it counts as not done.
    pub timeout: Duration,
    /// How often the task status is checked within an attempt.
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(10),
            max_attempts: 1,
        }
    }
}

/// Terminal outcome of an exhausted wait, from what the attempts observed.
pub fn exhausted_outcome(task_id: &str, attempts: u32, saw_transient_error: bool) -> AppError {
    let task_id = task_id.to_string();
    if saw_transient_error {
        AppError::WaitError { task_id, attempts }
    } else {
        AppError::WaitTimeout { task_id, attempts }
    }
}

/// Wait until the task reaches a terminal state, within the attempt budget.
///
/// Errors from individual attempts do not stop the loop; they only turn an
/// eventual timeout into [`AppError::WaitError`]. A missing credential is not
/// something another attempt can fix and is returned immediately.
///
/// Success says nothing about whether the task itself succeeded.
pub async fn wait_for_task(
    transfer: &dyn TransferService,
    task_id: &str,
    policy: WaitPolicy,
) -> Result<(), AppError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut saw_transient_error = false;

    for attempt in 1..=max_attempts {
        debug!(task_id = %task_id, attempt, max_attempts, "Waiting for task");

        match transfer
            .poll_task(task_id, policy.timeout, policy.interval)
            .await
        {
            Ok(PollOutcome::Done) => {
                debug!(task_id = %task_id, attempt, "Task reached a terminal state");
                return Ok(());
            }
            Ok(PollOutcome::NotDone) => {
                debug!(task_id = %task_id, attempt, "Task not done within the attempt timeout");
            }
            Err(TransferError::Unauthorized(msg)) => return Err(AppError::Authorization(msg)),
            Err(err) => {
                warn!(task_id = %task_id, attempt, error = %err, "Could not wait for task");
                saw_transient_error = true;
            }
        }
    }

    let err = exhausted_outcome(task_id, max_attempts, saw_transient_error);
    error!(task_id = %task_id, kind = err.kind(), "{err}");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_without_errors_is_a_timeout() {
        let err = exhausted_outcome("t", 2, false);
        assert!(matches!(err, AppError::WaitTimeout { attempts: 2, .. }));
    }

    #[test]
    fn exhaustion_with_errors_is_a_wait_error() {
        let err = exhausted_outcome("t", 2, true);
        assert!(matches!(err, AppError::WaitError { attempts: 2, .. }));
    }

    #[test]
    fn default_policy_matches_cli_defaults() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.timeout, Duration::from_secs(60));
        assert_eq!(policy.interval, Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 1);
    }
}
