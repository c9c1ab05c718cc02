//! Scheduling disciplines and run phases.
//!
//! A phase action binds an [`Action`] to a discipline: open-loop decouples
//! arrival generation from execution by enqueueing onto the worker pool,
//! closed-loop serializes generation and execution on one thread. A phase is
//! either a synchronous one-shot script or a load phase that runs its phase
//! actions truly concurrently, one thread each.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::action::{Action, ScriptRunner};
use crate::conn::ConnectionPool;
use crate::error::{Error, Result};
use crate::executor::distribution::Distribution;
use crate::executor::WorkerPool;
use crate::metric::{now_epoch, State};

/// An action bound to a scheduling discipline for the length of a load phase.
pub enum PhaseAction {
    /// Arrival generation decoupled from execution: every timestamp the
    /// distribution yields becomes a job on the shared queue, fire-and-forget.
    OpenLoop {
        action: Arc<Action>,
        dist: Distribution,
        report_regressions: bool,
    },
    /// One thread executing the action back-to-back; concurrency is exactly 1
    /// and throughput self-limits to the action's observed latency.
    ClosedLoop {
        action: Arc<Action>,
        report_regressions: bool,
    },
}

impl PhaseAction {
    pub fn open_loop(action: Action, dist: Distribution) -> Self {
        PhaseAction::OpenLoop {
            action: Arc::new(action),
            dist,
            report_regressions: true,
        }
    }

    pub fn closed_loop(action: Action) -> Self {
        PhaseAction::ClosedLoop {
            action: Arc::new(action),
            report_regressions: true,
        }
    }

    /// Opt this action out of regression reporting. The flag is passed
    /// through to the report untouched; the harness itself never reads it.
    pub fn without_regression_reporting(mut self) -> Self {
        match &mut self {
            PhaseAction::OpenLoop {
                report_regressions, ..
            }
            | PhaseAction::ClosedLoop {
                report_regressions, ..
            } => *report_regressions = false,
        }
        self
    }

    pub fn action(&self) -> &Arc<Action> {
        match self {
            PhaseAction::OpenLoop { action, .. } | PhaseAction::ClosedLoop { action, .. } => action,
        }
    }

    pub fn report_regressions(&self) -> bool {
        match self {
            PhaseAction::OpenLoop {
                report_regressions, ..
            }
            | PhaseAction::ClosedLoop {
                report_regressions, ..
            } => *report_regressions,
        }
    }

    /// Drive this action for `duration`. Runs on its own thread inside a load
    /// phase.
    pub fn run(
        &self,
        duration: Duration,
        jobs: &WorkerPool,
        conns: &Arc<ConnectionPool>,
        state: &Arc<State>,
    ) -> Result<()> {
        match self {
            PhaseAction::OpenLoop { action, dist, .. } => {
                let name = action.to_string();
                for start_time in dist.generate(duration, &name, &state.overrides) {
                    let action = Arc::clone(action);
                    let conns = Arc::clone(conns);
                    let state = Arc::clone(state);
                    jobs.submit(move || {
                        // A fatal action error terminates the worker thread,
                        // permanently shrinking pool capacity; the run is not
                        // aborted.
                        if let Err(err) = action.run(start_time, &conns, &state) {
                            panic!("action '{action}' failed: {err}");
                        }
                    });
                }
                Ok(())
            }
            PhaseAction::ClosedLoop { action, .. } => {
                let end_time = now_epoch() + duration.as_secs_f64();
                while now_epoch() < end_time {
                    action.run(now_epoch(), conns, state)?;
                }
                Ok(())
            }
        }
    }
}

/// One stage of a scenario.
pub enum Phase {
    /// Synchronous one-shot handed to the external script runner.
    Script { script: String },
    /// Concurrent load generation: one thread per phase action.
    Load {
        duration: Duration,
        actions: Vec<PhaseAction>,
    },
}

impl Phase {
    pub fn script(script: impl Into<String>) -> Self {
        Phase::Script {
            script: script.into(),
        }
    }

    pub fn load(duration: Duration, actions: Vec<PhaseAction>) -> Self {
        Phase::Load { duration, actions }
    }

    /// Run this phase to completion. For a load phase, every phase-action
    /// thread is started before any is joined, and all are joined before
    /// returning — the phase boundary is a generation boundary only, since
    /// open-loop jobs may still be queued or executing in the worker pool
    /// afterwards.
    pub(crate) fn run(
        &self,
        script_runner: Option<&Arc<dyn ScriptRunner>>,
        jobs: &WorkerPool,
        conns: &Arc<ConnectionPool>,
        state: &Arc<State>,
    ) -> Result<()> {
        match self {
            Phase::Script { script } => {
                let runner = script_runner.ok_or(Error::NoScriptRunner)?;
                runner.run(script)
            }
            Phase::Load { duration, actions } => {
                let duration = state.overrides.load_phase_duration.unwrap_or(*duration);
                tracing::info!(secs = duration.as_secs_f64(), "load phase");
                thread::scope(|scope| {
                    let handles: Vec<_> = actions
                        .iter()
                        .map(|phase_action| {
                            scope.spawn(move || phase_action.run(duration, jobs, conns, state))
                        })
                        .collect();
                    for handle in handles {
                        match handle.join() {
                            Ok(Ok(())) => {}
                            // A failed or panicked phase action only loses its
                            // own generator; the remaining phases continue
                            // against whatever capacity is left.
                            Ok(Err(err)) => tracing::error!(%err, "phase action failed"),
                            Err(_) => tracing::error!("phase action thread panicked"),
                        }
                    }
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    use crate::conn::testing::MockConnector;

    use super::*;

    #[test]
    fn open_loop_enqueues_exactly_rate_times_duration_jobs() {
        // 200ms action latency against a single worker: generation outpaces
        // execution, so a backlog must build up and drain only on shutdown.
        crate::conn::testing::init_test_logging();
        let connector = MockConnector::with_latency(Duration::from_millis(200));
        let jobs = WorkerPool::spawn(1);
        let conns = Arc::new(ConnectionPool::open(&connector, 0).unwrap());
        let state = State::new();
        let action = Action::standalone("SELECT 1", Arc::new(connector.clone()), true);
        let phase_action = PhaseAction::open_loop(action, Distribution::fixed_rate(10.0));

        phase_action
            .run(Duration::from_secs(1), &jobs, &conns, &state)
            .unwrap();

        assert!(jobs.pending() > 0, "expected a backlog after generation");
        jobs.shutdown().unwrap();
        assert_eq!(connector.executed.load(Ordering::SeqCst), 10);
        assert_eq!(state.store.len("SELECT 1 (standalone)"), 10);
    }

    #[test]
    fn closed_loop_runs_one_at_a_time_until_duration_elapses() {
        let connector = MockConnector::with_latency(Duration::from_millis(20));
        let jobs = WorkerPool::spawn(1);
        let conns = Arc::new(ConnectionPool::open(&connector, 0).unwrap());
        let state = State::new();
        let action = Action::standalone("SELECT 1", Arc::new(connector.clone()), true);
        let phase_action = PhaseAction::closed_loop(action);

        phase_action
            .run(Duration::from_millis(100), &jobs, &conns, &state)
            .unwrap();

        let executed = connector.executed.load(Ordering::SeqCst);
        // Self-paced by latency: roughly duration / latency invocations.
        assert!((2..=8).contains(&executed), "executed {executed} times");
        assert_eq!(state.store.len("SELECT 1 (standalone)"), executed);
        jobs.shutdown().unwrap();
    }

    #[test]
    fn load_phase_duration_is_overridable_at_run_start() {
        let connector = MockConnector::default();
        let jobs = WorkerPool::spawn(1);
        let conns = Arc::new(ConnectionPool::open(&connector, 0).unwrap());
        let mut overrides = crate::metric::Overrides::default();
        overrides.load_phase_duration = Some(Duration::from_millis(50));
        let state = State::with_overrides(overrides);

        let action = Action::standalone("SELECT 1", Arc::new(connector), true);
        let phase = Phase::load(
            // Static duration that would block the test for an hour if the
            // override were ignored.
            Duration::from_secs(3600),
            vec![PhaseAction::open_loop(action, Distribution::fixed_rate(100.0))],
        );

        let started = Instant::now();
        phase.run(None, &jobs, &conns, &state).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        jobs.shutdown().unwrap();
        assert_eq!(state.store.len("SELECT 1 (standalone)"), 5);
    }

    #[test]
    fn scripted_phase_requires_a_runner() {
        let jobs = WorkerPool::spawn(1);
        let conns = Arc::new(ConnectionPool::open(&MockConnector::default(), 0).unwrap());
        let state = State::new();
        let phase = Phase::script("> SELECT 1");

        let err = phase.run(None, &jobs, &conns, &state).unwrap_err();
        assert!(matches!(err, Error::NoScriptRunner));
        jobs.shutdown().unwrap();
    }
}
