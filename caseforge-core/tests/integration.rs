//! End-to-end tests for the conversation flow
//!
//! These drive a [`Conversation`] through chat, review, execution and restart
//! on a seeded random source, checking the phase and ordering guarantees that
//! callers rely on.

use caseforge_core::config::Config;
use caseforge_core::logging;
use caseforge_core::{
    CasePatch, Conversation, Error, ExecutionStatus, LogLevel, MessageContent, Phase, Priority,
    Role, RunId,
};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;

fn conversation(seed: u64) -> Conversation {
    logging::init_test();
    Conversation::builder()
        .seed(seed)
        .clock_origin(Utc.with_ymd_and_hms(2025, 5, 20, 8, 30, 0).unwrap())
        .build()
        .expect("default config is valid")
}

/// Four user turns with the page prompt confirmed after the first.
fn chat_to_review(conv: &mut Conversation) {
    conv.submit_user_message("登录功能需要测试用户名密码校验")
        .unwrap();
    conv.select_candidate_pages(&["login".to_string()]).unwrap();
    conv.set_primary_page("login").unwrap();
    conv.confirm_page_selection().unwrap();
    conv.submit_user_message("Regular users and administrators")
        .unwrap();
    conv.submit_user_message("Wrong passwords and empty fields")
        .unwrap();
    assert_eq!(conv.phase(), Phase::Chat);
    conv.submit_user_message("Lock the account after five failures")
        .unwrap();
    assert_eq!(conv.phase(), Phase::Review);
}

/// Replace the synthesized cases with exactly `count` blank ones.
fn with_case_count(conv: &mut Conversation, count: usize) {
    let ids: Vec<String> = conv.cases().iter().map(|c| c.id.clone()).collect();
    for _ in 0..count {
        conv.add_case().unwrap();
    }
    for id in ids {
        conv.remove_case(&id).unwrap();
    }
    assert_eq!(conv.cases().len(), count);
}

// ============================================
// Dialogue
// ============================================

#[test]
fn test_first_message_requests_page_selection() {
    let mut conv = conversation(1);
    let delta = conv
        .submit_user_message("登录功能需要测试用户名密码校验")
        .unwrap();

    let reply = delta.agent_message().unwrap();
    match &reply.content {
        MessageContent::CandidatePages { pages, .. } => assert!(!pages.is_empty()),
        other => panic!("expected candidate pages, got {:?}", other),
    }
    let state = conv.state();
    assert_eq!(state.phase, Phase::Chat);
    assert!(state.pending_disambiguation.is_some());
}

#[test]
fn test_four_turns_reach_review_with_numbered_cases() {
    let mut conv = conversation(2);
    chat_to_review(&mut conv);

    let cases = conv.cases();
    assert!(!cases.is_empty());
    assert_eq!(cases[0].case_number, "TC001");
    assert!(cases
        .iter()
        .all(|c| c.case_number.starts_with("TC") && c.case_number.len() == 5));
    // Primary page contributes a UI case
    assert!(cases.iter().any(|c| c.module == "Login page"));
}

#[test]
fn test_transcript_alternates_in_call_order() {
    let mut conv = conversation(3);
    chat_to_review(&mut conv);

    let roles: Vec<Role> = conv.transcript().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Agent,
            Role::Agent, // summary plus opening question
            Role::User,
            Role::Agent,
            Role::User,
            Role::Agent,
            Role::User,
            Role::Agent,
        ]
    );
    let times: Vec<_> = conv.transcript().iter().map(|m| m.timestamp).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_at_most_one_primary_page() {
    let mut conv = conversation(4);
    conv.submit_user_message("search for products").unwrap();
    for id in ["search", "home", "login", "search"] {
        let pending = conv.set_primary_page(id).unwrap();
        assert_eq!(pending.candidates.iter().filter(|p| p.is_primary).count(), 1);
    }
    assert!(matches!(
        conv.set_primary_page("checkout"),
        Err(Error::PageNotFound(_))
    ));
}

#[test]
fn test_primary_page_always_within_selection() {
    let mut conv = conversation(4);
    conv.submit_user_message("login and home").unwrap();
    conv.set_primary_page("login").unwrap();
    let pending = conv
        .select_candidate_pages(&["home".to_string()])
        .unwrap();
    assert_eq!(pending.selected, vec!["home".to_string()]);
    assert!(pending.candidates.iter().all(|p| !p.is_primary));

    let summary = conv.confirm_page_selection().unwrap();
    assert_eq!(summary, "Selected 1 page.");
}

#[test]
fn test_cancel_leaves_pages_untouched() {
    let mut conv = conversation(5);
    let delta = conv.submit_user_message("search for products").unwrap();
    let presented = match &delta.agent_message().unwrap().content {
        MessageContent::CandidatePages { pages, .. } => pages.clone(),
        _ => unreachable!(),
    };

    conv.set_primary_page("home").unwrap();
    conv.cancel_page_selection().unwrap();
    assert!(conv.candidate_pages().is_none());

    // A fresh prompt after restart presents the same catalog untouched
    conv.restart();
    let delta = conv.submit_user_message("search again").unwrap();
    match &delta.agent_message().unwrap().content {
        MessageContent::CandidatePages { pages, .. } => assert_eq!(pages, &presented),
        _ => unreachable!(),
    }
}

// ============================================
// Review
// ============================================

#[test]
fn test_case_numbers_unique_through_edits() {
    let mut conv = conversation(6);
    chat_to_review(&mut conv);

    let first = conv.cases()[0].id.clone();
    conv.remove_case(&first).unwrap();
    for _ in 0..3 {
        conv.add_case().unwrap();
    }
    let numbers: HashSet<_> = conv.cases().iter().map(|c| c.case_number.clone()).collect();
    assert_eq!(numbers.len(), conv.cases().len());
}

#[test]
fn test_update_case_keeps_number() {
    let mut conv = conversation(7);
    chat_to_review(&mut conv);
    let case = conv.cases()[1].clone();

    let updated = conv
        .update_case(
            &case.id,
            CasePatch {
                title: Some("Sign in with email instead of username".to_string()),
                priority: Some(Priority::P0),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.case_number, case.case_number);
    assert_eq!(updated.priority, Priority::P0);
    assert!(matches!(
        conv.update_case("missing", CasePatch::default()),
        Err(Error::CaseNotFound(_))
    ));
}

#[test]
fn test_execution_rejected_without_cases() {
    let mut conv = conversation(8);
    chat_to_review(&mut conv);
    with_case_count(&mut conv, 1);
    let only = conv.cases()[0].id.clone();
    conv.remove_case(&only).unwrap();

    let err = conv.begin_execution().unwrap_err();
    assert!(matches!(err, Error::NoCases));
    assert!(err.is_phase_violation());
    assert_eq!(conv.phase(), Phase::Review);
    assert!(conv.current_run_id().is_none());
}

#[test]
fn test_execute_intent_with_no_cases_reports_error() {
    let mut conv = conversation(9);
    chat_to_review(&mut conv);
    let ids: Vec<String> = conv.cases().iter().map(|c| c.id.clone()).collect();
    for id in ids {
        conv.remove_case(&id).unwrap();
    }

    conv.submit_user_message("execute").unwrap();
    conv.run_until_idle();

    assert_eq!(conv.phase(), Phase::Review);
    assert!(conv.transcript().last().unwrap().is_error());
}

// ============================================
// Execution
// ============================================

#[test]
fn test_five_cases_complete_exactly_once() {
    let mut conv = conversation(10);
    chat_to_review(&mut conv);
    with_case_count(&mut conv, 5);
    let run_id = conv.begin_execution().unwrap();

    let mut completions = 0;
    let mut last_phase = conv.phase();
    while let Some(wait) = conv.next_wakeup() {
        conv.advance(wait);
        let status = conv.execution_status(run_id).unwrap();
        let all_terminal = status.values().all(|r| r.status.is_terminal());
        assert_eq!(conv.phase() == Phase::Completed, all_terminal);
        if last_phase != Phase::Completed && conv.phase() == Phase::Completed {
            completions += 1;
        }
        last_phase = conv.phase();
    }

    assert_eq!(completions, 1);
    let summary = conv.run_summary(run_id).unwrap();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.passed + summary.failed, 5);
}

#[test]
fn test_failed_cases_carry_error_and_passed_do_not() {
    let mut config = Config::default();
    config.execution.pass_probability = 0.5;
    logging::init_test();
    let mut conv = Conversation::builder()
        .config(config)
        .seed(11)
        .build()
        .unwrap();
    chat_to_review(&mut conv);
    let run_id = conv.begin_execution().unwrap();
    conv.run_until_idle();

    for record in conv.execution_status(run_id).unwrap().values() {
        match record.status {
            ExecutionStatus::Failed => {
                assert!(!record.error_message.as_deref().unwrap_or_default().is_empty())
            }
            ExecutionStatus::Passed => assert!(record.error_message.is_none()),
            other => panic!("non-terminal record after completion: {:?}", other),
        }
    }
}

#[test]
fn test_phases_only_move_forward_until_restart() {
    let mut conv = conversation(12);
    let mut seen = vec![conv.phase()];
    chat_to_review(&mut conv);
    seen.push(conv.phase());
    conv.begin_execution().unwrap();
    seen.push(conv.phase());
    conv.run_until_idle();
    seen.push(conv.phase());

    assert_eq!(
        seen,
        vec![Phase::Chat, Phase::Review, Phase::Executing, Phase::Completed]
    );
    assert!(conv.add_case().unwrap_err().is_phase_violation());
    assert!(conv.begin_execution().unwrap_err().is_phase_violation());

    let state = conv.restart();
    assert_eq!(state.phase, Phase::Chat);
    assert_eq!(state.round, 0);
}

#[test]
fn test_cases_frozen_once_executing() {
    let mut conv = conversation(13);
    chat_to_review(&mut conv);
    let id = conv.cases()[0].id.clone();
    conv.begin_execution().unwrap();

    assert!(matches!(
        conv.remove_case(&id),
        Err(Error::PhaseViolation { phase: Phase::Executing, .. })
    ));
    assert!(conv
        .update_case(&id, CasePatch::default())
        .unwrap_err()
        .is_phase_violation());
}

#[test]
fn test_log_order_preserved_for_late_subscribers() {
    let mut conv = conversation(14);
    chat_to_review(&mut conv);
    let run_id = conv.begin_execution().unwrap();

    let mut early = conv.subscribe_logs(run_id).unwrap();
    conv.advance(2_000);
    let mut seen = early.drain();
    conv.run_until_idle();
    seen.extend(early.drain());

    let late: Vec<_> = conv.subscribe_logs(run_id).unwrap().drain();
    assert_eq!(seen, late);
    assert_eq!(
        late.iter().map(|e| e.id).collect::<Vec<_>>(),
        (1..=late.len() as u64).collect::<Vec<_>>()
    );
    assert!(late.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(late
        .iter()
        .any(|e| e.level == LogLevel::Success || e.level == LogLevel::Error));
}

#[test]
fn test_same_seed_replays_same_run() {
    let play = |seed| {
        let mut conv = conversation(seed);
        chat_to_review(&mut conv);
        let run_id = conv.begin_execution().unwrap();
        conv.run_until_idle();
        let log: Vec<_> = conv
            .subscribe_logs(run_id)
            .unwrap()
            .drain()
            .into_iter()
            .map(|e| (e.timestamp, e.level, e.message))
            .collect();
        let outcomes: Vec<_> = conv
            .execution_records(run_id)
            .unwrap()
            .into_iter()
            .map(|r| (r.case_number, r.status, r.duration_label))
            .collect();
        (log, outcomes)
    };
    assert_eq!(play(21), play(21));
}

#[test]
fn test_unknown_run_id_rejected() {
    let mut conv = conversation(15);
    chat_to_review(&mut conv);
    conv.begin_execution().unwrap();
    assert!(matches!(
        conv.execution_status(RunId::new()),
        Err(Error::RunNotFound(_))
    ));
}

#[test]
fn test_report_lists_every_frozen_case() {
    let mut conv = conversation(16);
    chat_to_review(&mut conv);
    let expected = conv.cases().len();
    let run_id = conv.begin_execution().unwrap();
    conv.run_until_idle();

    let report = conv.run_report(run_id).unwrap();
    assert_eq!(report.rows.len(), expected);
    assert!(report.finished_at.is_some());
    let markdown = report.to_markdown();
    assert!(markdown.contains("TC001"));
    assert!(markdown.contains(&report.summary.pass_rate_label()));
}

#[tokio::test]
async fn test_async_subscription_ends_when_run_completes() {
    let mut conv = conversation(17);
    chat_to_review(&mut conv);
    let run_id = conv.begin_execution().unwrap();
    let mut subscription = conv.subscribe_logs(run_id).unwrap();

    let reader = tokio::spawn(async move {
        let mut entries = Vec::new();
        while let Some(entry) = subscription.next().await {
            entries.push(entry);
        }
        entries
    });

    conv.run_until_idle();
    let entries = reader.await.unwrap();
    assert_eq!(entries.len(), conv.subscribe_logs(run_id).unwrap().drain().len());
    assert!(entries
        .last()
        .unwrap()
        .message
        .starts_with("Execution finished"));
}
