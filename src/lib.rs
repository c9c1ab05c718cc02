//! Parabench — a concurrent load-testing harness for database-like targets.
//!
//! Parabench drives configurable workloads against a running target, measures
//! per-action latency, and hands the raw results to an external reporting
//! collaborator. The crate deliberately keeps the SQL/DSL text, the target
//! driver, and report post-processing outside: you plug those in through
//! small traits, and the harness owns the part with real engineering risk —
//! the scheduling and concurrency engine.
//!
//! # Architecture
//!
//! The building blocks, leaves first:
//!
//! - [`Action`]: a single timed unit of work; variants differ by how they
//!   obtain their connection (fresh per call, dedicated, or pooled).
//! - [`Distribution`]: pacing algorithm producing a real-time-paced sequence
//!   of scheduled timestamps for open-loop arrivals.
//! - [`WorkerPool`]: fixed-size executors consuming job closures from a
//!   shared FIFO queue; unbounded and unthrottled by design.
//! - [`ConnectionPool`]: fixed set of pre-opened sessions to the target.
//! - [`PhaseAction`]: binds an action to a scheduling discipline — open-loop
//!   (decoupled arrival generation) or closed-loop (self-paced, one thread).
//! - [`Phase`]: a stage of a run, either a synchronous script or concurrent
//!   load generation.
//! - [`State`]: run-scoped shared measurement store plus runtime overrides.
//! - [`Scenario`]: the top-level session owning pools and phase order.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use parabench::{
//!     Action, Connection, Connector, Distribution, ExecuteError, Phase, PhaseAction,
//!     Reporter, Scenario, State, StdoutReporter,
//! };
//!
//! struct MyConnection;
//!
//! impl Connection for MyConnection {
//!     fn execute(&mut self, _statement: &str) -> Result<(), ExecuteError> {
//!         // Talk to the target here; pass its error text through verbatim.
//!         Ok(())
//!     }
//!     fn close(&mut self) {}
//! }
//!
//! struct MyConnector;
//!
//! impl Connector for MyConnector {
//!     fn connect(&self) -> parabench::Result<Box<dyn Connection>> {
//!         Ok(Box::new(MyConnection))
//!     }
//! }
//!
//! fn main() -> parabench::Result<()> {
//!     let connector: Arc<dyn Connector> = Arc::new(MyConnector);
//!     let mut scenario = Scenario::builder()
//!         .name("kafka-sink-reads")
//!         .phases(vec![Phase::load(
//!             Duration::from_secs(60),
//!             vec![
//!                 PhaseAction::open_loop(
//!                     Action::pooled("SELECT * FROM mv"),
//!                     Distribution::fixed_rate(100.0),
//!                 ),
//!                 PhaseAction::closed_loop(Action::standalone(
//!                     "SELECT count(*) FROM t",
//!                     Arc::clone(&connector),
//!                     true,
//!                 )),
//!             ],
//!         )])
//!         .connector(Arc::clone(&connector))
//!         .thread_pool_size(64)
//!         .conn_pool_size(8)
//!         .build();
//!
//!     let state = State::new();
//!     scenario.setup()?;
//!     scenario.run(&state)?;
//!     scenario.teardown()?;
//!     StdoutReporter.report(&scenario.report(&state))
//! }
//! ```
//!
//! # Failure model
//!
//! Statement errors matching the deadlock signature are retried forever;
//! errors matching the real-time-recency timeout signature abandon that one
//! invocation silently. Anything else is fatal to the thread that hit it —
//! a worker dies and the pool runs at reduced capacity, but the run is never
//! aborted and the remaining phases continue. See [`action::execute_statement`].

/// Actions and the statement retry policy
pub mod action;
/// Connections, the connector seam, and the shared connection pool
pub mod conn;
/// Error taxonomy
pub mod error;
/// Worker pool, pacing distributions, and phase scheduling
pub mod executor;
/// Measurements, the shared store, and runtime overrides
pub mod metric;
/// The run report and the reporter seam
pub mod report;
/// Top-level session lifecycle
pub mod scenario;

pub use action::{Action, ScriptRunner, StatementOutcome};
pub use conn::{Connection, ConnectionPool, Connector, ExecuteError};
pub use error::{Error, Result};
pub use executor::distribution::Distribution;
pub use executor::phase::{Phase, PhaseAction};
pub use executor::WorkerPool;
pub use metric::{Measurement, Overrides, State};
pub use report::{ActionReport, Reporter, RunReport, StdoutReporter};
pub use scenario::{LifecycleState, Scenario};
