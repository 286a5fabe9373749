//! Scripted end-to-end conversation
//!
//! Plays both sides of a short dialogue: the requirement, a page selection,
//! canned answers until the cases are drafted, then an execute request. The
//! run is played back and the report printed in the requested format.

use anyhow::{bail, Context, Result};
use caseforge_core::{CandidatePage, Conversation, Phase};

use crate::player::{self, Playback};
use crate::render::{self, ReportFormat};

pub const DEFAULT_REQUIREMENT: &str =
    "Users sign in on the login page with a username and password; wrong passwords must be rejected";

const ANSWERS: &[&str] = &[
    "Registered members and administrators, on desktop and mobile web",
    "Empty fields, wrong passwords and locked accounts matter most",
    "Nothing else, go ahead",
];

/// Play the scripted conversation and print the run report.
pub async fn run(
    mut conv: Conversation,
    requirement: &str,
    format: ReportFormat,
    playback: Playback,
) -> Result<()> {
    if requirement.trim().is_empty() {
        bail!("requirement must not be empty");
    }
    let verbose = format == ReportFormat::Text;
    let mut printed = 0;

    conv.submit_user_message(requirement)
        .context("requirement was rejected")?;
    printed = echo(&conv, printed, verbose);

    if let Some(pending) = conv.candidate_pages() {
        let picks = pages_mentioned(requirement, &pending.candidates);
        conv.select_candidate_pages(&picks)?;
        if let Some(primary) = picks.first() {
            conv.set_primary_page(primary)?;
        }
        conv.confirm_page_selection()?;
        printed = echo(&conv, printed, verbose);
    }

    // Rounds 1..=sufficiency_rounds answer questions; the last one drafts the cases.
    let turns = conv.config().dialogue.sufficiency_rounds as usize;
    for answer in ANSWERS.iter().cycle().take(turns) {
        if conv.phase() != Phase::Chat {
            break;
        }
        conv.submit_user_message(answer)?;
        printed = echo(&conv, printed, verbose);
    }
    if conv.phase() != Phase::Review {
        bail!("the conversation did not produce any test cases");
    }
    if verbose {
        println!("\n{}\n", render::cases(conv.cases()));
    }

    let trigger = conv
        .config()
        .dialogue
        .execute_triggers
        .first()
        .cloned()
        .unwrap_or_else(|| "execute".to_string());
    conv.submit_user_message(&trigger)?;
    echo(&conv, printed, verbose);

    let run_id = player::drive(
        &mut conv,
        Playback {
            live: verbose && playback.live,
            ..playback
        },
        None,
    )
    .await?
    .context("execution did not start")?;

    let report = conv.run_report(run_id)?;
    if verbose {
        println!();
    }
    println!("{}", render::report(&report, format)?);

    tracing::info!(
        run_id = %run_id,
        passed = report.summary.passed,
        failed = report.summary.failed,
        "Demo finished"
    );
    Ok(())
}

/// Ids of candidate pages named in the requirement; the first page if none are.
fn pages_mentioned(requirement: &str, candidates: &[CandidatePage]) -> Vec<String> {
    let text = requirement.to_lowercase();
    let mut picks: Vec<String> = candidates
        .iter()
        .filter(|p| text.contains(&p.id.to_lowercase()) || text.contains(&p.label.to_lowercase()))
        .map(|p| p.id.clone())
        .collect();
    if picks.is_empty() {
        picks.extend(candidates.first().map(|p| p.id.clone()));
    }
    picks
}

fn echo(conv: &Conversation, from: usize, verbose: bool) -> usize {
    if verbose {
        for msg in conv.transcript().iter().skip(from) {
            println!("{}", render::message(msg));
        }
    }
    conv.transcript().len()
}
