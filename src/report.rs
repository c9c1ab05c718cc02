//! The run report and the reporter seam.
//!
//! The sole output artifact of a run is the per-action mapping from name to
//! ordered `(timestamp, duration)` samples, plus the pass-through guarantee
//! tables. Deriving percentiles, checking thresholds, and flagging
//! regressions all belong to the external collaborator behind [`Reporter`].

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metric::Measurement;
use crate::scenario::GuaranteeTable;

/// Samples and reporting flags for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub name: String,
    /// Whether the external regression checker should consider this action.
    pub report_regressions: bool,
    /// Completion-ordered samples.
    pub samples: Vec<Measurement>,
}

/// Everything a run hands to its reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub version: String,
    pub guarantees: GuaranteeTable,
    pub regression_thresholds: GuaranteeTable,
    pub actions: Vec<ActionReport>,
}

/// Consumes a [`RunReport`] and sends it somewhere: stdout, a file, a CI
/// results service.
pub trait Reporter {
    fn report(&self, report: &RunReport) -> Result<()>;
}

/// Minimal built-in reporter: one summary line per action.
pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    fn report(&self, report: &RunReport) -> Result<()> {
        println!("scenario {} (v{})", report.scenario, report.version);
        for action in &report.actions {
            let total: f64 = action
                .samples
                .iter()
                .map(|m| m.duration.as_secs_f64())
                .sum();
            println!(
                "  {}: {} samples, {:.3}s total latency",
                action.name,
                action.samples.len(),
                total
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn report_round_trips_through_serde() {
        let report = RunReport {
            scenario: "s".to_string(),
            version: "1.0.0".to_string(),
            guarantees: GuaranteeTable::new(),
            regression_thresholds: GuaranteeTable::new(),
            actions: vec![ActionReport {
                name: "SELECT 1 (pooled)".to_string(),
                report_regressions: true,
                samples: vec![Measurement {
                    duration: Duration::from_millis(12),
                    timestamp: 1_700_000_000.5,
                }],
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.actions[0].samples[0], report.actions[0].samples[0]);
        assert_eq!(back.actions[0].name, report.actions[0].name);
    }

    #[test]
    fn stdout_reporter_accepts_an_empty_report() {
        let report = RunReport {
            scenario: "empty".to_string(),
            version: "1.0.0".to_string(),
            guarantees: GuaranteeTable::new(),
            regression_thresholds: GuaranteeTable::new(),
            actions: vec![],
        };
        StdoutReporter.report(&report).unwrap();
    }
}
