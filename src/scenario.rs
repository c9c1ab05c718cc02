//! The top-level session: a scenario owns the worker pool and connection
//! pool, sequences its phases strictly in order, and manages setup and
//! teardown.
//!
//! Lifecycle: `created → setup() → ready → run() → running/completed →
//! teardown() → stopped`. Teardown is a graceful drain — the shutdown
//! sentinels queue FIFO behind any open-loop backlog, so it blocks until
//! every job submitted before the signal has finished.

use std::collections::HashMap;
use std::sync::Arc;

use typed_builder::TypedBuilder;

use crate::action::ScriptRunner;
use crate::conn::{ConnectionPool, Connector};
use crate::error::{Error, Result};
use crate::executor::phase::Phase;
use crate::executor::WorkerPool;
use crate::metric::State;
use crate::report::{ActionReport, RunReport};

/// Report format version carried in every [`RunReport`].
pub const VERSION: &str = "1.0.0";

/// Where a scenario is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Created,
    Ready,
    Running,
    Completed,
    Stopped,
}

/// Per-action tables of numeric limits, consumed only by the external
/// reporting/regression collaborator. The harness passes them through
/// untouched.
pub type GuaranteeTable = HashMap<String, HashMap<String, f64>>;

fn default_thread_pool_size() -> usize {
    num_cpus::get() * 4
}

/// A full load-testing session against one target.
///
/// Pool sizes are fixed for the scenario's lifetime. Phases execute strictly
/// sequentially: phase k+1 starts only after phase k's threads have fully
/// joined.
#[derive(TypedBuilder)]
pub struct Scenario {
    #[builder(setter(into))]
    name: String,
    phases: Vec<Phase>,
    connector: Arc<dyn Connector>,
    #[builder(default, setter(strip_option))]
    script_runner: Option<Arc<dyn ScriptRunner>>,
    #[builder(default = default_thread_pool_size())]
    thread_pool_size: usize,
    #[builder(default = 0)]
    conn_pool_size: usize,
    #[builder(default)]
    guarantees: GuaranteeTable,
    #[builder(default)]
    regression_thresholds: GuaranteeTable,

    #[builder(default, setter(skip))]
    lifecycle: LifecycleState,
    #[builder(default, setter(skip))]
    jobs: Option<WorkerPool>,
    #[builder(default, setter(skip))]
    conns: Option<Arc<ConnectionPool>>,
    #[builder(default, setter(skip))]
    workers_joined: Option<usize>,
}

impl Scenario {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Spawn the worker pool and open the pooled connections.
    pub fn setup(&mut self) -> Result<()> {
        self.expect(LifecycleState::Created, "set up")?;
        tracing::info!(
            scenario = %self.name,
            workers = self.thread_pool_size,
            conns = self.conn_pool_size,
            "setting up"
        );
        self.jobs = Some(WorkerPool::spawn(self.thread_pool_size));
        self.conns = Some(Arc::new(ConnectionPool::open(
            self.connector.as_ref(),
            self.conn_pool_size,
        )?));
        self.lifecycle = LifecycleState::Ready;
        Ok(())
    }

    /// Execute every phase, strictly in order.
    pub fn run(&mut self, state: &Arc<State>) -> Result<()> {
        self.expect(LifecycleState::Ready, "run")?;
        self.lifecycle = LifecycleState::Running;
        let jobs = self.jobs.as_ref().expect("worker pool missing after setup");
        let conns = self.conns.as_ref().expect("connection pool missing after setup");
        for phase in &self.phases {
            phase.run(self.script_runner.as_ref(), jobs, conns, state)?;
        }
        self.lifecycle = LifecycleState::Completed;
        Ok(())
    }

    /// Close every pooled connection, then drain and join the worker pool.
    ///
    /// The drain is cooperative: one sentinel per worker, FIFO behind the
    /// backlog. Returns only once the queue reports zero outstanding jobs.
    pub fn teardown(&mut self) -> Result<()> {
        match self.lifecycle {
            LifecycleState::Ready | LifecycleState::Running | LifecycleState::Completed => {}
            state => {
                return Err(Error::Lifecycle {
                    op: "tear down",
                    state,
                })
            }
        }
        if let Some(conns) = self.conns.take() {
            let closed = conns.close_all();
            tracing::info!(closed, "closed pooled connections");
        }
        if let Some(jobs) = self.jobs.take() {
            let joined = jobs.shutdown()?;
            tracing::info!(joined, "worker pool drained");
            self.workers_joined = Some(joined);
        }
        self.lifecycle = LifecycleState::Stopped;
        Ok(())
    }

    /// How many worker threads teardown joined, once it has run.
    pub fn workers_joined(&self) -> Option<usize> {
        self.workers_joined
    }

    /// Assemble the run's sole output artifact: per-action ordered samples
    /// plus the pass-through guarantee tables. No percentiles, no thresholds
    /// — derived statistics belong to the external reporter.
    pub fn report(&self, state: &State) -> RunReport {
        let mut actions: Vec<ActionReport> = Vec::new();
        for phase in &self.phases {
            if let Phase::Load {
                actions: phase_actions,
                ..
            } = phase
            {
                for phase_action in phase_actions {
                    let name = phase_action.action().to_string();
                    if actions.iter().any(|a| a.name == name) {
                        continue;
                    }
                    actions.push(ActionReport {
                        name: name.clone(),
                        report_regressions: phase_action.report_regressions(),
                        samples: state.store.samples(&name),
                    });
                }
            }
        }
        RunReport {
            scenario: self.name.clone(),
            version: VERSION.to_string(),
            guarantees: self.guarantees.clone(),
            regression_thresholds: self.regression_thresholds.clone(),
            actions,
        }
    }

    fn expect(&self, wanted: LifecycleState, op: &'static str) -> Result<()> {
        if self.lifecycle != wanted {
            return Err(Error::Lifecycle {
                op,
                state: self.lifecycle,
            });
        }
        Ok(())
    }
}
