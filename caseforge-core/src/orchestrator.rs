//! Simulated execution of a frozen case snapshot
//!
//! Each case walks `Pending -> Running -> {Passed | Failed}` on its own
//! timeline:
//!
//! ```text
//! case 0  |start--step--step--finish|
//! case 1        |start--step------------step--finish|
//! case 2              |start--step--finish|
//!         0    stagger   2*stagger            (virtual ms)
//! ```
//!
//! Starts are staggered in snapshot order and durations are random within the
//! configured bounds, so timelines overlap and may finish out of order. The
//! run completes once every record is terminal, never earlier, and the
//! completion fires exactly once.
//!
//! The orchestrator does not own a clock. The caller pops [`CaseEvent`]s from
//! its scheduler, passes them to [`Orchestrator::handle`], and queues the
//! returned follow-ups.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::aggregator::{format_duration_ms, summarize, RunReport, RunSummary};
use crate::config::ExecutionConfig;
use crate::error::{Error, Result};
use crate::log_stream::LogStream;
use crate::rng::{choose, RandomSource};
use crate::scheduler::VirtualClock;
use crate::types::{ExecutionRecord, ExecutionStatus, LogLevel, RunId, TestCase};

/// A scheduled point on one case's timeline. `index` is the snapshot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseEvent {
    Start { index: usize },
    Step { index: usize, step: usize },
    Finish { index: usize },
}

/// An event to queue `delay_ms` after the current instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUp {
    pub delay_ms: u64,
    pub event: CaseEvent,
}

/// What handling one event produced.
#[derive(Debug, Default)]
pub struct Advance {
    pub follow_ups: Vec<FollowUp>,
    /// Set exactly once, on the event that made the last record terminal
    pub completed: Option<RunSummary>,
}

const FAILURE_REASONS: &[&str] = &[
    "Assertion failed: expected element text did not match",
    "Element not found: the target control never became visible",
    "Timed out after 5000ms waiting for the page to respond",
    "Unexpected HTTP 500 response from the backend",
    "Validation message missing after submitting the form",
];

/// Drives every case of one run.
pub struct Orchestrator {
    run_id: RunId,
    cases: Vec<TestCase>,
    records: Vec<ExecutionRecord>,
    /// Running duration chosen at start, per case
    durations_ms: Vec<Option<u64>>,
    log: LogStream,
    stagger_ms: u64,
    min_duration_ms: u64,
    max_duration_ms: u64,
    pass_probability: f64,
    slow_threshold_ms: u64,
    terminal: usize,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Orchestrator {
    /// Freeze `snapshot` into a new run and return the initial start events.
    ///
    /// Rejects an empty snapshot with [`Error::NoCases`].
    pub fn start(
        run_id: RunId,
        snapshot: Vec<TestCase>,
        config: &ExecutionConfig,
        clock: &VirtualClock,
    ) -> Result<(Self, Vec<FollowUp>)> {
        if snapshot.is_empty() {
            return Err(Error::NoCases);
        }

        let records: Vec<ExecutionRecord> = snapshot.iter().map(ExecutionRecord::pending).collect();
        let log = LogStream::new();
        let now = clock.now();
        log.append(
            LogLevel::Info,
            format!("Starting execution of {} test cases", snapshot.len()),
            None,
            now,
        );

        let starts = (0..snapshot.len())
            .map(|index| FollowUp {
                delay_ms: config.stagger_ms.saturating_mul(index as u64),
                event: CaseEvent::Start { index },
            })
            .collect();

        tracing::info!(
            run_id = %run_id,
            cases = snapshot.len(),
            stagger_ms = config.stagger_ms,
            "Execution run started"
        );

        let orchestrator = Self {
            run_id,
            durations_ms: vec![None; snapshot.len()],
            cases: snapshot,
            records,
            log,
            stagger_ms: config.stagger_ms,
            min_duration_ms: config.min_duration_ms,
            max_duration_ms: config.max_duration_ms,
            pass_probability: config.pass_probability,
            slow_threshold_ms: config.slow_threshold_ms,
            terminal: 0,
            started_at: now,
            finished_at: None,
        };
        Ok((orchestrator, starts))
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// The frozen case definitions, in start order
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Records in snapshot order
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Records keyed by case id
    pub fn status_map(&self) -> BTreeMap<String, ExecutionRecord> {
        self.records
            .iter()
            .map(|r| (r.case_id.clone(), r.clone()))
            .collect()
    }

    pub fn summary(&self) -> RunSummary {
        summarize(&self.records)
    }

    pub fn log(&self) -> &LogStream {
        &self.log
    }

    pub fn is_complete(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn stagger_ms(&self) -> u64 {
        self.stagger_ms
    }

    pub fn report(&self) -> RunReport {
        RunReport::build(
            self.run_id,
            self.started_at,
            self.finished_at,
            &self.cases,
            &self.records,
        )
    }

    /// Apply one event at the clock's current instant.
    ///
    /// Events for unknown cases or out of sequence (a step for a case that is
    /// not running, a second finish) are ignored.
    pub fn handle(
        &mut self,
        event: CaseEvent,
        clock: &VirtualClock,
        rng: &mut dyn RandomSource,
    ) -> Advance {
        match event {
            CaseEvent::Start { index } => self.on_start(index, clock, rng),
            CaseEvent::Step { index, step } => {
                self.on_step(index, step, clock);
                Advance::default()
            }
            CaseEvent::Finish { index } => self.on_finish(index, clock, rng),
        }
    }

    fn on_start(&mut self, index: usize, clock: &VirtualClock, rng: &mut dyn RandomSource) -> Advance {
        let Some(record) = self.records.get_mut(index) else {
            return Advance::default();
        };
        if record.status != ExecutionStatus::Pending {
            return Advance::default();
        }

        let now = clock.now();
        record.status = ExecutionStatus::Running;
        record.started_at = Some(now);

        let case = &self.cases[index];
        let duration = rng.between(self.min_duration_ms, self.max_duration_ms);
        self.durations_ms[index] = Some(duration);

        self.log.append(
            LogLevel::Info,
            format!("[{}] Running: {}", case.case_number, case.title),
            Some(&case.case_number),
            now,
        );
        tracing::debug!(
            run_id = %self.run_id,
            case_number = %case.case_number,
            duration_ms = duration,
            "Case started"
        );

        // Steps spread evenly inside the running window; finish at its end.
        let slots = case.steps.len() as u128 + 1;
        let mut follow_ups: Vec<FollowUp> = (0..case.steps.len())
            .map(|step| FollowUp {
                // Widened so long durations cannot overflow; the quotient fits in u64.
                delay_ms: (u128::from(duration) * (step as u128 + 1) / slots) as u64,
                event: CaseEvent::Step { index, step },
            })
            .collect();
        follow_ups.push(FollowUp {
            delay_ms: duration,
            event: CaseEvent::Finish { index },
        });

        Advance {
            follow_ups,
            completed: None,
        }
    }

    fn on_step(&mut self, index: usize, step: usize, clock: &VirtualClock) {
        let (Some(record), Some(case)) = (self.records.get(index), self.cases.get(index)) else {
            return;
        };
        if record.status != ExecutionStatus::Running {
            return;
        }
        let Some(text) = case.steps.get(step) else {
            return;
        };

        self.log.append(
            LogLevel::Info,
            format!(
                "[{}] Step {}/{}: {}",
                case.case_number,
                step + 1,
                case.steps.len(),
                text
            ),
            Some(&case.case_number),
            clock.now(),
        );
    }

    fn on_finish(&mut self, index: usize, clock: &VirtualClock, rng: &mut dyn RandomSource) -> Advance {
        let Some(record) = self.records.get_mut(index) else {
            return Advance::default();
        };
        if record.status != ExecutionStatus::Running {
            return Advance::default();
        }

        let now = clock.now();
        let case = &self.cases[index];
        let elapsed_ms = record
            .started_at
            .map(|start| now.signed_duration_since(start).num_milliseconds().max(0) as u64)
            .or(self.durations_ms[index])
            .unwrap_or(0);
        let label = format_duration_ms(elapsed_ms);

        if elapsed_ms > self.slow_threshold_ms {
            self.log.append(
                LogLevel::Warning,
                format!(
                    "[{}] Slow case: took {}, above the {} threshold",
                    case.case_number,
                    label,
                    format_duration_ms(self.slow_threshold_ms)
                ),
                Some(&case.case_number),
                now,
            );
        }

        record.finished_at = Some(now);
        record.duration_label = Some(label.clone());

        if rng.chance(self.pass_probability) {
            record.status = ExecutionStatus::Passed;
            record.error_message = None;
            self.log.append(
                LogLevel::Success,
                format!("[{}] Passed in {}", case.case_number, label),
                Some(&case.case_number),
                now,
            );
            tracing::debug!(run_id = %self.run_id, case_number = %case.case_number, "Case passed");
        } else {
            let reason = choose(rng, FAILURE_REASONS)
                .copied()
                .unwrap_or("Unexpected failure");
            let message = match case.steps.last() {
                Some(step) => format!("{} (last step: {})", reason, step),
                None => reason.to_string(),
            };
            self.log.append(
                LogLevel::Error,
                format!("[{}] Failed: {}", case.case_number, message),
                Some(&case.case_number),
                now,
            );
            tracing::debug!(
                run_id = %self.run_id,
                case_number = %case.case_number,
                error = %message,
                "Case failed"
            );
            record.status = ExecutionStatus::Failed;
            record.error_message = Some(message);
        }

        self.terminal += 1;
        let completed = self.check_completion(now);
        Advance {
            follow_ups: Vec::new(),
            completed,
        }
    }

    fn check_completion(&mut self, now: DateTime<Utc>) -> Option<RunSummary> {
        if self.finished_at.is_some() || self.terminal < self.records.len() {
            return None;
        }
        if !self.records.iter().all(|r| r.status.is_terminal()) {
            return None;
        }

        self.finished_at = Some(now);
        let summary = self.summary();
        let level = if summary.failed == 0 {
            LogLevel::Success
        } else {
            LogLevel::Warning
        };
        self.log.append(
            level,
            format!(
                "Execution finished: {} passed, {} failed ({} pass rate)",
                summary.passed,
                summary.failed,
                summary.pass_rate_label()
            ),
            None,
            now,
        );
        self.log.close();

        tracing::info!(
            run_id = %self.run_id,
            passed = summary.passed,
            failed = summary.failed,
            pass_rate = summary.pass_rate,
            "Execution run completed"
        );
        Some(summary)
    }
}
