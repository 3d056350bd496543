//! Per-run export statistics.

use std::fmt::Write as _;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Counts for one run. Only ever grows; every recorded item moves
/// `attempted` and exactly one of `successful` / `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    attempted: usize,
    successful: usize,
    failed: usize,
    failed_items: Vec<String>,
    /// Exported items whose upload confirmation was assumed, not seen.
    unconfirmed_items: Vec<String>,
}

impl ExportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, title: &str, confirmed: bool) {
        self.attempted += 1;
        self.successful += 1;
        if !confirmed {
            self.unconfirmed_items.push(title.to_string());
        }
    }

    pub fn record_failure(&mut self, title: &str) {
        self.attempted += 1;
        self.failed += 1;
        self.failed_items.push(title.to_string());
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn successful(&self) -> usize {
        self.successful
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Titles of failed items, in the order they were processed.
    pub fn failed_items(&self) -> &[String] {
        &self.failed_items
    }

    pub fn unconfirmed_items(&self) -> &[String] {
        &self.unconfirmed_items
    }

    /// Percentage of attempted items that succeeded; 0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.successful as f64 * 100.0 / self.attempted as f64
        }
    }

    /// True when the counters agree with each other.
    pub fn is_consistent(&self) -> bool {
        self.attempted == self.successful + self.failed && self.failed_items.len() == self.failed
    }

    /// Multi-line human-readable summary.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Export summary");
        let _ = writeln!(out, "  Attempted:    {}", self.attempted);
        let _ = writeln!(out, "  Successful:   {}", self.successful);
        let _ = writeln!(out, "  Failed:       {}", self.failed);
        let _ = write!(out, "  Success rate: {:.1}%", self.success_rate());
        if !self.failed_items.is_empty() {
            let _ = write!(out, "\nFailed items:");
            for title in &self.failed_items {
                let _ = write!(out, "\n  - {}", title);
            }
        }
        if !self.unconfirmed_items.is_empty() {
            let _ = write!(out, "\nUnverified uploads:");
            for title in &self.unconfirmed_items {
                let _ = write!(out, "\n  - {}", title);
            }
        }
        out
    }
}

impl std::fmt::Display for ExportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.summary())
    }
}

/// How a run ended, as written to a run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    NavigationFailed,
    DeviceFailed,
    Interrupted,
}

/// A finished run, serialized to `~/.notehammer/reports/`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub collection: String,
    pub device: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub status: RunStatus,
    /// The error that ended the run, if any.
    pub error: Option<String>,
    pub success_rate: f64,
    pub stats: ExportStats,
}

impl RunReport {
    pub fn new(
        collection: impl Into<String>,
        device: impl Into<String>,
        started_at: DateTime<Local>,
        status: RunStatus,
        error: Option<String>,
        stats: ExportStats,
    ) -> Self {
        Self {
            collection: collection.into(),
            device: device.into(),
            started_at,
            finished_at: Local::now(),
            status,
            error,
            success_rate: stats.success_rate(),
            stats,
        }
    }

    /// File name for this report, unique per second.
    pub fn file_name(&self) -> String {
        format!("export_{}.json", self.started_at.format("%Y-%m-%d_%H-%M-%S"))
    }
}
