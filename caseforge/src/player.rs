//! Plays a conversation's virtual clock in real time
//!
//! The conversation never sleeps; this module sleeps for it. Each queued task
//! is awaited for its virtual delay divided by `speed`, then run. Once a run
//! starts, a second task follows its log subscription and prints entries as
//! they arrive, with an `indicatif` bar counting finished cases.

use anyhow::{Context, Result};
use caseforge_core::{Conversation, ExecutionStatus, LogEntry, LogLevel, LogSubscription, RunId};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::render;

/// How a playback prints.
#[derive(Debug, Clone, Copy)]
pub struct Playback {
    /// Virtual-to-real time ratio; 0 or less runs without sleeping
    pub speed: f64,
    /// Print log lines and show the progress bar
    pub live: bool,
}

impl Playback {
    fn real_delay(&self, virtual_ms: u64) -> Option<Duration> {
        if self.speed <= 0.0 || virtual_ms == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(virtual_ms as f64 / 1000.0 / self.speed))
    }
}

/// Run queued tasks until the conversation is idle.
///
/// `seen_run` is the run the caller already reported on. Returns the id of
/// any newer run, whether it was started before or during playback.
pub async fn drive(
    conv: &mut Conversation,
    playback: Playback,
    seen_run: Option<RunId>,
) -> Result<Option<RunId>> {
    let new_run = |conv: &Conversation| conv.current_run_id().filter(|id| Some(*id) != seen_run);
    let mut follower: Option<JoinHandle<()>> = None;

    loop {
        if follower.is_none() && playback.live {
            if let Some(run_id) = new_run(&*conv) {
                let subscription = conv
                    .subscribe_logs(run_id)
                    .context("failed to subscribe to run log")?;
                let total = conv.execution_records(run_id)?.len();
                follower = Some(tokio::spawn(follow(subscription, progress_bar(total)?)));
            }
        }

        let Some(wait_ms) = conv.next_wakeup() else {
            break;
        };
        if let Some(delay) = playback.real_delay(wait_ms) {
            tokio::time::sleep(delay).await;
        }
        conv.advance(wait_ms);

        // Let the follower print between ticks.
        tokio::task::yield_now().await;
    }

    if let Some(handle) = follower {
        handle.await.context("log follower panicked")?;
    }

    Ok(new_run(&*conv))
}

fn progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Print every entry of a run until its log closes.
async fn follow(mut subscription: LogSubscription, pb: ProgressBar) {
    while let Some(entry) = subscription.next().await {
        pb.suspend(|| println!("{}", render::log_entry(&entry)));
        if finishes_case(&entry) {
            pb.inc(1);
            pb.set_message(entry.case_number.clone().unwrap_or_default());
        }
    }
    pb.finish_and_clear();
}

fn finishes_case(entry: &LogEntry) -> bool {
    entry.case_number.is_some()
        && matches!(entry.level, LogLevel::Success | LogLevel::Error)
}

/// One-line status count used by `/cases` while a run is in progress
pub fn status_line(conv: &Conversation, run_id: RunId) -> Result<String> {
    let records = conv.execution_records(run_id)?;
    let count = |status| records.iter().filter(|r| r.status == status).count();
    Ok(format!(
        "{} pending, {} running, {} passed, {} failed",
        count(ExecutionStatus::Pending),
        count(ExecutionStatus::Running),
        count(ExecutionStatus::Passed),
        count(ExecutionStatus::Failed)
    ))
}
