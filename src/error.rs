use thiserror::Error;

use crate::conn::ExecuteError;
use crate::scenario::LifecycleState;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the harness itself.
///
/// Statement-level errors that match a known transient signature never show up
/// here — they are retried or abandoned inside the action (see
/// [`crate::action::execute_statement`]). Everything in this enum is fatal to
/// whichever thread hit it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open connection: {0}")]
    Connect(String),

    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error("script runner failed: {0}")]
    Script(String),

    #[error("scenario has a scripted phase or action but no script runner was configured")]
    NoScriptRunner,

    #[error("cannot {op} a scenario in the {state:?} state")]
    Lifecycle {
        op: &'static str,
        state: LifecycleState,
    },

    #[error("{outstanding} jobs still outstanding after worker pool drain")]
    UndrainedQueue { outstanding: usize },
}
