//! Measurements, the shared measurement store, and run-scoped overrides.
//!
//! Every worker thread of a run appends into one shared [`State`]. The store
//! is a two-level map: a short-lived lock fetches (or creates) the per-action
//! bucket, and the append happens under that bucket's own lock, so actions
//! with different names never serialize on a single global lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One recorded sample: how long an action invocation took, and the absolute
/// time it was scheduled to start (seconds since the Unix epoch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub duration: Duration,
    pub timestamp: f64,
}

/// Wall-clock seconds since the Unix epoch, as the rest of the harness
/// measures time. Schedules and measurements both live on this axis.
pub(crate) fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set before the Unix epoch")
        .as_secs_f64()
}

type Bucket = Arc<Mutex<Vec<Measurement>>>;

/// Concurrency-safe map from action name to an append-only, completion-ordered
/// sequence of measurements.
#[derive(Default)]
pub struct MeasurementStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl MeasurementStore {
    fn bucket(&self, name: &str) -> Bucket {
        let mut buckets = self.buckets.lock();
        match buckets.get(name) {
            Some(bucket) => Arc::clone(bucket),
            None => {
                let bucket = Bucket::default();
                buckets.insert(name.to_string(), Arc::clone(&bucket));
                bucket
            }
        }
    }

    /// Append one measurement under `name`. Insertion order is completion
    /// order, not submission order.
    pub fn record(&self, name: &str, measurement: Measurement) {
        self.bucket(name).lock().push(measurement);
    }

    /// Snapshot of the samples recorded under `name` so far.
    pub fn samples(&self, name: &str) -> Vec<Measurement> {
        self.bucket(name).lock().clone()
    }

    pub fn len(&self, name: &str) -> usize {
        self.bucket(name).lock().len()
    }

    /// Names of every action that has recorded at least one sample, sorted for
    /// deterministic reporting.
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buckets.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Runtime configuration overrides, written once by the orchestrator before or
/// at run start and read at generation/phase start only. An absent field means
/// "use the static value from the scenario definition".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Replaces the static duration of every load phase.
    pub load_phase_duration: Option<Duration>,
    /// Replaces the configured rate of a fixed-rate distribution, keyed by
    /// action name.
    pub rates: HashMap<String, f64>,
}

impl Overrides {
    pub fn rate_for(&self, action_name: &str) -> Option<f64> {
        self.rates.get(action_name).copied()
    }
}

/// Shared run-scoped state: the measurement store plus the overrides.
#[derive(Default)]
pub struct State {
    pub store: MeasurementStore,
    pub overrides: Overrides,
}

impl State {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_overrides(overrides: Overrides) -> Arc<Self> {
        Arc::new(Self {
            store: MeasurementStore::default(),
            overrides,
        })
    }
}
