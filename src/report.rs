//! Violations report output.
//!
//! The report is stable JSON: violations are sorted before serialization
//! so two scans over the same snapshot produce byte-identical output.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::rules::Violation;
use crate::errors::PlumbError;

#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub scanned_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_timestamp: Option<DateTime<Utc>>,
    pub violation_count: usize,
    pub violations: Vec<Violation>,
}

impl ScanReport {
    pub fn new(snapshot_timestamp: Option<DateTime<Utc>>, mut violations: Vec<Violation>) -> Self {
        violations.sort_by(|a, b| {
            (
                &a.resource_type,
                &a.resource_id,
                &a.rule_name,
                a.rule_index,
                &a.violation_type,
            )
                .cmp(&(
                    &b.resource_type,
                    &b.resource_id,
                    &b.rule_name,
                    b.rule_index,
                    &b.violation_type,
                ))
        });
        Self {
            scanned_at: Utc::now(),
            snapshot_timestamp,
            violation_count: violations.len(),
            violations,
        }
    }

    /// Per-violation-type counts, logged as the scan summary.
    pub fn summarize(&self) {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for violation in &self.violations {
            *counts.entry(violation.violation_type.as_str()).or_default() += 1;
        }
        for (violation_type, count) in counts {
            tracing::info!(violation_type, count, "Violations found");
        }
    }

    /// Write the report to `output`, or stdout when no path is configured.
    pub fn write(&self, output: Option<&Path>) -> Result<(), PlumbError> {
        let rendered = serde_json::to_string_pretty(self)?;
        match output {
            Some(path) => {
                std::fs::write(path, rendered)?;
                tracing::info!(path = %path.display(), "Wrote violations report");
            }
            None => println!("{rendered}"),
        }
        Ok(())
    }
}
