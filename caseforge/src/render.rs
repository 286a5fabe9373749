//! Plain-text rendering for transcript messages, log lines, cases and reports

use caseforge_core::{LogEntry, LogLevel, Message, MessageContent, Role, RunReport, TestCase};
use std::fmt::Write as _;

/// Output format for the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Md,
}

pub fn message(msg: &Message) -> String {
    let speaker = match msg.role {
        Role::User => "you",
        Role::Agent => "agent",
    };
    match &msg.content {
        MessageContent::Text { text } => format!("{}> {}", speaker, text),
        MessageContent::Error { text } => format!("{}> [error] {}", speaker, text),
        MessageContent::CandidatePages { prompt, pages } => {
            let mut out = format!("{}> {}", speaker, prompt);
            for page in pages {
                let _ = write!(out, "\n    {:<10} {}", page.id, page.label);
                if !page.description.is_empty() {
                    let _ = write!(out, " - {}", page.description);
                }
            }
            out.push_str("\n    (use /select, /primary, then /confirm or /cancel)");
            out
        }
    }
}

pub fn log_entry(entry: &LogEntry) -> String {
    let level = match entry.level {
        LogLevel::Info => "INFO",
        LogLevel::Success => "PASS",
        LogLevel::Warning => "WARN",
        LogLevel::Error => "FAIL",
    };
    format!(
        "{} {:<4} {}",
        entry.timestamp.format("%H:%M:%S%.3f"),
        level,
        entry.message
    )
}

pub fn cases(cases: &[TestCase]) -> String {
    if cases.is_empty() {
        return "No test cases.".to_string();
    }
    let mut out = String::new();
    for case in cases {
        let _ = writeln!(
            out,
            "{:<8} {:<3} {:<14} {:<16} {}",
            case.case_number,
            case.priority.as_str(),
            case.test_type.as_str(),
            case.module,
            case.title
        );
        for (i, step) in case.steps.iter().enumerate() {
            let _ = writeln!(out, "         {}. {}", i + 1, step);
        }
        let _ = writeln!(out, "         => {}", case.expected_result);
    }
    out.trim_end().to_string()
}

pub fn report_text(report: &RunReport) -> String {
    let s = &report.summary;
    let mut out = String::new();
    let _ = writeln!(out, "Run {}", report.run_id);
    let _ = writeln!(
        out,
        "  Total: {}  Passed: {}  Failed: {}  Pass rate: {}",
        s.total,
        s.passed,
        s.failed,
        s.pass_rate_label()
    );
    if let Some(ms) = report.duration_ms() {
        let _ = writeln!(out, "  Duration: {:.1}s", ms as f64 / 1000.0);
    }
    for row in &report.rows {
        let _ = writeln!(
            out,
            "  {:<8} {:<7} {:>6}  {}",
            row.case.case_number,
            row.record.status.as_str(),
            row.record.duration_label.as_deref().unwrap_or("-"),
            row.case.title
        );
    }
    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "Failures:");
        for row in failures {
            let _ = writeln!(
                out,
                "  {}: {}",
                row.case.case_number,
                row.record.error_message.as_deref().unwrap_or("unknown error")
            );
        }
    }
    out.trim_end().to_string()
}

pub fn report(report: &RunReport, format: ReportFormat) -> anyhow::Result<String> {
    Ok(match format {
        ReportFormat::Text => report_text(report),
        ReportFormat::Json => report.to_json()?,
        ReportFormat::Md => report.to_markdown(),
    })
}
