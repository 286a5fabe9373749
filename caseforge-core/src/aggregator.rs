//! Run-level metrics derived from execution records
//!
//! Nothing here is cached: [`summarize`] is recomputed from the records every
//! time it is called, so a summary can never lag behind a status change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::error::Result;
use crate::types::{ExecutionRecord, ExecutionStatus, RunId, TestCase};

/// Counts and pass rate for a set of execution records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub running: usize,
    /// Percentage of passed over total, one decimal place
    pub pass_rate: f64,
}

impl RunSummary {
    /// Whether every record reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.passed + self.failed == self.total
    }

    pub fn pass_rate_label(&self) -> String {
        format!("{:.1}%", self.pass_rate)
    }
}

/// Summarize the current state of a run.
pub fn summarize(records: &[ExecutionRecord]) -> RunSummary {
    let mut summary = RunSummary {
        total: records.len(),
        passed: 0,
        failed: 0,
        pending: 0,
        running: 0,
        pass_rate: 0.0,
    };

    for record in records {
        match record.status {
            ExecutionStatus::Passed => summary.passed += 1,
            ExecutionStatus::Failed => summary.failed += 1,
            ExecutionStatus::Pending => summary.pending += 1,
            ExecutionStatus::Running => summary.running += 1,
        }
    }

    if summary.total > 0 {
        let rate = summary.passed as f64 * 100.0 / summary.total as f64;
        summary.pass_rate = (rate * 10.0).round() / 10.0;
    }

    summary
}

// ============================================
// Report
// ============================================

/// One row of the final report: the frozen case and how it ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub case: TestCase,
    pub record: ExecutionRecord,
}

/// Everything the report view shows for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: RunSummary,
    pub rows: Vec<ReportRow>,
}

impl RunReport {
    pub fn build(
        run_id: RunId,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
        cases: &[TestCase],
        records: &[ExecutionRecord],
    ) -> Self {
        let rows = cases
            .iter()
            .zip(records)
            .map(|(case, record)| ReportRow {
                case: case.clone(),
                record: record.clone(),
            })
            .collect();
        Self {
            run_id,
            started_at,
            finished_at,
            summary: summarize(records),
            rows,
        }
    }

    /// Wall-clock span of the run, if it has finished
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| end.signed_duration_since(self.started_at).num_milliseconds())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows
            .iter()
            .filter(|row| row.record.status == ExecutionStatus::Failed)
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render as a Markdown document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let s = &self.summary;

        let _ = writeln!(out, "# Test Run Report\n");
        let _ = writeln!(out, "- Run: `{}`", self.run_id);
        let _ = writeln!(
            out,
            "- Started: {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Some(ms) = self.duration_ms() {
            let _ = writeln!(out, "- Duration: {}", format_duration_ms(ms.max(0) as u64));
        }
        let _ = writeln!(
            out,
            "- Total: {} | Passed: {} | Failed: {} | Pass rate: {}\n",
            s.total,
            s.passed,
            s.failed,
            s.pass_rate_label()
        );

        let _ = writeln!(out, "| Case | Module | Title | Priority | Type | Status | Duration |");
        let _ = writeln!(out, "|------|--------|-------|----------|------|--------|----------|");
        for row in &self.rows {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} | {} |",
                row.case.case_number,
                row.case.module,
                row.case.title,
                row.case.priority,
                row.case.test_type,
                row.record.status,
                row.record.duration_label.as_deref().unwrap_or("-"),
            );
        }

        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "\n## Failures\n");
            for row in failures {
                let _ = writeln!(
                    out,
                    "- **{}** {}: {}",
                    row.case.case_number,
                    row.case.title,
                    row.record.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }

        out
    }
}

/// Format a millisecond span as `2.4s` (or `850ms` below one second).
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, TestType};

    fn record(status: ExecutionStatus) -> ExecutionRecord {
        ExecutionRecord {
            case_id: uuid::Uuid::new_v4().to_string(),
            case_number: "TC001".to_string(),
            status,
            duration_label: None,
            error_message: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_summarize_counts_and_rate() {
        let records = vec![
            record(ExecutionStatus::Passed),
            record(ExecutionStatus::Passed),
            record(ExecutionStatus::Failed),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.passed + summary.failed, summary.total);
        assert_eq!(summary.pass_rate, 66.7);
        assert_eq!(summary.pass_rate_label(), "66.7%");
        assert!(summary.is_finished());
    }

    #[test]
    fn test_summarize_reflects_latest_mutation() {
        let mut records = vec![
            record(ExecutionStatus::Running),
            record(ExecutionStatus::Pending),
        ];
        let before = summarize(&records);
        assert_eq!(before.pass_rate, 0.0);
        assert!(!before.is_finished());

        records[0].status = ExecutionStatus::Passed;
        records[1].status = ExecutionStatus::Passed;
        let after = summarize(&records);
        assert_eq!(after.pass_rate, 100.0);
        assert!(after.is_finished());
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.pass_rate, 0.0);
        assert!(!summary.is_finished());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(850), "850ms");
        assert_eq!(format_duration_ms(2430), "2.4s");
    }

    #[test]
    fn test_report_markdown_lists_failures() {
        let case = TestCase {
            id: "c1".to_string(),
            case_number: "TC001".to_string(),
            module: "Login".to_string(),
            title: "Reject wrong password".to_string(),
            steps: vec!["Open login page".to_string()],
            expected_result: "Error shown".to_string(),
            priority: Priority::P0,
            test_type: TestType::Functional,
        };
        let mut rec = record(ExecutionStatus::Failed);
        rec.case_id = case.id.clone();
        rec.error_message = Some("Assertion failed".to_string());
        rec.duration_label = Some("2.0s".to_string());

        let start = Utc::now();
        let report = RunReport::build(
            RunId::new(),
            start,
            Some(start + chrono::Duration::seconds(3)),
            &[case],
            &[rec],
        );
        let md = report.to_markdown();

        assert!(md.contains("# Test Run Report"));
        assert!(md.contains("| TC001 | Login | Reject wrong password | P0 | functional | failed | 2.0s |"));
        assert!(md.contains("## Failures"));
        assert!(md.contains("Assertion failed"));
        assert_eq!(report.duration_ms(), Some(3000));
    }
}
