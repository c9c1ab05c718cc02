//! Actions: single timed units of work against the target, and the statement
//! retry policy they all share.
//!
//! An action is a closed set of variants that differ only in how they obtain
//! their connection. All of them do the same two things: identify themselves
//! (the display string is the measurement bucket key) and execute once,
//! recording a `(duration, timestamp)` sample into the shared [`State`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::conn::{Connection, ConnectionPool, Connector};
use crate::error::Result;
use crate::metric::{now_epoch, Measurement, State};

/// Error text marking a transient deadlock. Retried indefinitely.
pub const DEADLOCK_SIGNATURE: &str = "deadlock detected";

/// Error text marking a real-time-recency timeout. The invocation is silently
/// abandoned: no retry, no measurement, no propagation.
pub const RECENCY_TIMEOUT_SIGNATURE: &str =
    "timed out before ingesting the source's visible frontier when real-time-recency query issued";

const SET_SERIALIZABLE: &str = "SET TRANSACTION_ISOLATION TO 'SERIALIZABLE'";
const SET_STRICT_SERIALIZABLE: &str = "SET TRANSACTION_ISOLATION TO 'STRICT SERIALIZABLE'";

/// How a statement execution ended, once the retry policy is done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOutcome {
    Completed,
    /// Hit the recency-timeout signature and was dropped without a result.
    Abandoned,
}

/// Execute one statement under the harness retry policy:
///
/// - deadlock signature: log and retry the same statement, no backoff, no cap;
/// - recency-timeout signature: abandon the invocation, report [`StatementOutcome::Abandoned`];
/// - anything else: propagate, fatal to the calling thread.
pub fn execute_statement(
    conn: &mut dyn Connection,
    statement: &str,
) -> Result<StatementOutcome> {
    loop {
        match conn.execute(statement) {
            Ok(()) => return Ok(StatementOutcome::Completed),
            Err(err) if err.message.contains(DEADLOCK_SIGNATURE) => {
                tracing::warn!(statement, "deadlock detected, retrying");
            }
            Err(err) if err.message.contains(RECENCY_TIMEOUT_SIGNATURE) => {
                tracing::debug!(statement, "real-time-recency timeout, ignoring");
                return Ok(StatementOutcome::Abandoned);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// External collaborator that runs opaque script blocks (setup DDL, data
/// loading, scripted checks). The harness never parses script contents.
pub trait ScriptRunner: Send + Sync {
    fn run(&self, script: &str) -> Result<()>;
}

/// A named, timed unit of work. Variants differ by connection ownership.
pub enum Action {
    /// Delegates the whole invocation to the external script runner. The
    /// name is the measurement bucket key, so distinct scripted actions
    /// should carry distinct names.
    Scripted {
        name: String,
        script: String,
        runner: Arc<dyn ScriptRunner>,
    },
    /// Opens a fresh connection per call and closes it afterwards.
    Standalone {
        statement: String,
        connector: Arc<dyn Connector>,
        strict_serializable: bool,
    },
    /// Owns one dedicated connection for its lifetime. Meant to be driven
    /// from a single thread; the mutex only exists so the action can be
    /// shared with the worker pool.
    Persistent {
        statement: String,
        conn: Mutex<Box<dyn Connection>>,
    },
    /// Borrows a connection from the shared pool per call and returns it on
    /// every exit path.
    Pooled { statement: String },
}

impl Action {
    pub fn scripted(
        name: impl Into<String>,
        script: impl Into<String>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        Action::Scripted {
            name: name.into(),
            script: script.into(),
            runner,
        }
    }

    pub fn standalone(
        statement: impl Into<String>,
        connector: Arc<dyn Connector>,
        strict_serializable: bool,
    ) -> Self {
        Action::Standalone {
            statement: statement.into(),
            connector,
            strict_serializable,
        }
    }

    /// Connect once and pin the session to this action. The isolation level
    /// is set here, a single time, rather than before every call.
    pub fn persistent(
        statement: impl Into<String>,
        connector: &dyn Connector,
        strict_serializable: bool,
    ) -> Result<Self> {
        let mut conn = connector.connect()?;
        let isolation = if strict_serializable {
            SET_STRICT_SERIALIZABLE
        } else {
            SET_SERIALIZABLE
        };
        execute_statement(conn.as_mut(), isolation)?;
        Ok(Action::Persistent {
            statement: statement.into(),
            conn: Mutex::new(conn),
        })
    }

    pub fn pooled(statement: impl Into<String>) -> Self {
        Action::Pooled {
            statement: statement.into(),
        }
    }

    /// Execute once and record `now - start_time` under this action's name.
    /// An abandoned invocation records nothing.
    pub fn run(&self, start_time: f64, pool: &ConnectionPool, state: &State) -> Result<()> {
        let outcome = self.invoke(pool)?;
        if outcome == StatementOutcome::Abandoned {
            return Ok(());
        }
        let duration = Duration::from_secs_f64((now_epoch() - start_time).max(0.0));
        state.store.record(
            &self.to_string(),
            Measurement {
                duration,
                timestamp: start_time,
            },
        );
        Ok(())
    }

    fn invoke(&self, pool: &ConnectionPool) -> Result<StatementOutcome> {
        match self {
            Action::Scripted { script, runner, .. } => {
                runner.run(script)?;
                Ok(StatementOutcome::Completed)
            }
            Action::Standalone {
                statement,
                connector,
                strict_serializable,
            } => {
                let mut conn = connector.connect()?;
                // Strict serializable is the target's default; only weaker
                // isolation needs an explicit session statement.
                if !strict_serializable {
                    execute_statement(conn.as_mut(), SET_SERIALIZABLE)?;
                }
                let outcome = execute_statement(conn.as_mut(), statement)?;
                conn.close();
                Ok(outcome)
            }
            Action::Persistent { statement, conn } => {
                execute_statement(conn.lock().as_mut(), statement)
            }
            Action::Pooled { statement } => {
                let mut guard = pool.get();
                execute_statement(guard.conn(), statement)
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Scripted { name, .. } => f.write_str(name),
            Action::Standalone { statement, .. } => write!(f, "{statement} (standalone)"),
            Action::Persistent { statement, .. } => write!(f, "{statement} (reuse connection)"),
            Action::Pooled { statement } => write!(f, "{statement} (pooled)"),
        }
    }
}
