//! Command outcomes and their process exit codes.
//!
//! Every failure a command can end with is one `AppError` variant. `main`
//! prints the message to stderr and exits with [`AppError::exit_code`].

use thiserror::Error;

pub const EXIT_CODE_OTHER: i32 = 1;
pub const EXIT_CODE_AUTHORIZATION: i32 = 10;
pub const EXIT_CODE_ACTIVATION: i32 = 11;
pub const EXIT_CODE_INVALID_TRANSFER_SPECIFICATION: i32 = 12;
pub const EXIT_CODE_WAIT_TIMEOUT: i32 = 13;
pub const EXIT_CODE_WAIT_ERROR: i32 = 14;
pub const EXIT_CODE_CANCEL_TASK: i32 = 15;
pub const EXIT_CODE_CANCELLED: i32 = 130;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Authorization(String),

    #[error("Was not able to activate endpoints: {}", .endpoints.join(" "))]
    Activation { endpoints: Vec<String> },

    #[error(
        "Invalid transfer specification '{spec}' (if transferring directories, both paths must end with /)"
    )]
    InvalidTransferSpecification { spec: String },

    #[error("Timed out waiting for task {task_id} after {attempts} attempts")]
    WaitTimeout { task_id: String, attempts: u32 },

    #[error(
        "Gave up waiting for task {task_id} after {attempts} attempts; at least one attempt could not reach the transfer service"
    )]
    WaitError { task_id: String, attempts: u32 },

    #[error("Task {task_id} was not successfully cancelled: {reason}")]
    CancelTask { task_id: String, reason: String },

    #[error("Aborted by operator")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Authorization(_) => EXIT_CODE_AUTHORIZATION,
            AppError::Activation { .. } => EXIT_CODE_ACTIVATION,
            AppError::InvalidTransferSpecification { .. } => {
                EXIT_CODE_INVALID_TRANSFER_SPECIFICATION
            }
            AppError::WaitTimeout { .. } => EXIT_CODE_WAIT_TIMEOUT,
            AppError::WaitError { .. } => EXIT_CODE_WAIT_ERROR,
            AppError::CancelTask { .. } => EXIT_CODE_CANCEL_TASK,
            AppError::Cancelled => EXIT_CODE_CANCELLED,
            AppError::Other(_) => EXIT_CODE_OTHER,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Authorization(_) => "AUTHORIZATION_ERROR",
            AppError::Activation { .. } => "ACTIVATION_ERROR",
            AppError::InvalidTransferSpecification { .. } => "INVALID_TRANSFER_SPECIFICATION",
            AppError::WaitTimeout { .. } => "WAIT_TIMEOUT",
            AppError::WaitError { .. } => "WAIT_ERROR",
            AppError::CancelTask { .. } => "CANCEL_TASK_ERROR",
            AppError::Cancelled => "CANCELLED",
            AppError::Other(_) => "ERROR",
        }
    }
}

/// Failures reported by a transfer service implementation.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The service could not be reached or the response could not be read.
    #[error("transfer service unreachable: {0}")]
    Transport(String),

    /// The service answered with an error document.
    #[error("transfer API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("no usable credential: {0}")]
    Unauthorized(String),
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        TransferError::Transport(err.to_string())
    }
}

impl From<TransferError> for AppError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Unauthorized(msg) => AppError::Authorization(msg),
            other => AppError::Other(other.into()),
        }
    }
}
