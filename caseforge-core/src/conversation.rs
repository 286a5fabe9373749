//! The conversation facade
//!
//! [`Conversation`] owns one conversation end to end: the transcript, the
//! dialogue state, the case repository and at most one execution run. Every
//! delayed effect (acknowledgement delays, resynthesis, case timelines) is a
//! task on a single virtual-clock [`Scheduler`]; nothing happens between
//! calls. Callers move time forward with [`Conversation::advance`] or
//! [`Conversation::run_until_idle`].
//!
//! ## Phase gates
//!
//! | Operation | Allowed in |
//! |-----------|------------|
//! | `submit_user_message` | any phase (reply depends on phase) |
//! | page selection calls | while the page prompt is open |
//! | `add_case` / `update_case` / `remove_case` | review |
//! | `begin_execution` | review, with at least one case |
//! | `restart` | any phase |

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::aggregator::{RunReport, RunSummary};
use crate::config::Config;
use crate::dialogue::{DialogueDecision, DialogueEngine};
use crate::disambiguation::Disambiguator;
use crate::error::{Error, Result};
use crate::log_stream::LogSubscription;
use crate::orchestrator::{CaseEvent, FollowUp, Orchestrator};
use crate::repository::CaseRepository;
use crate::rng::{RandomSource, SeededRandom};
use crate::scheduler::Scheduler;
use crate::synthesizer::{CaseSynthesizer, SynthesisContext, TemplateSynthesizer};
use crate::types::{
    CasePatch, ConversationState, ExecutionRecord, Message, MessageContent, PendingDisambiguation,
    Phase, Role, RunId, TestCase, TranscriptDelta,
};

/// Receives every phase change. The conversation signals; it never waits on
/// the navigator or asks it anything.
pub trait Navigator: Send {
    fn on_phase_change(&mut self, from: Phase, to: Phase) {
        let _ = (from, to);
    }
}

/// Navigator that ignores every signal
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {}

/// Deferred work queued on the conversation's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    BeginExecution,
    Resynthesize,
    Case { run_id: RunId, event: CaseEvent },
}

// ============================================
// Builder
// ============================================

/// Assembles a [`Conversation`] with injectable collaborators.
pub struct ConversationBuilder {
    config: Config,
    rng: Option<Box<dyn RandomSource>>,
    synthesizer: Option<Box<dyn CaseSynthesizer>>,
    navigator: Option<Box<dyn Navigator>>,
    origin: Option<DateTime<Utc>>,
}

impl ConversationBuilder {
    fn new() -> Self {
        Self {
            config: Config::default(),
            rng: None,
            synthesizer: None,
            navigator: None,
            origin: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Seed the default random source. Ignored if a source is injected.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.execution.seed = Some(seed);
        self
    }

    pub fn random_source(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn synthesizer(mut self, synthesizer: impl CaseSynthesizer + 'static) -> Self {
        self.synthesizer = Some(Box::new(synthesizer));
        self
    }

    pub fn navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Some(Box::new(navigator));
        self
    }

    /// Wall-clock instant that virtual time zero maps to
    pub fn clock_origin(mut self, origin: DateTime<Utc>) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn build(self) -> Result<Conversation> {
        self.config.validate()?;
        let engine = DialogueEngine::new(&self.config.dialogue)?;

        let rng = self.rng.unwrap_or_else(|| {
            Box::new(SeededRandom::from_optional_seed(self.config.execution.seed))
        });
        let synthesizer = self
            .synthesizer
            .unwrap_or_else(|| Box::new(TemplateSynthesizer::new(&self.config.synthesis)));
        let navigator = self.navigator.unwrap_or_else(|| Box::new(NoopNavigator));
        let origin = self.origin.unwrap_or_else(Utc::now);

        tracing::debug!(
            synthesizer = synthesizer.name(),
            seeded = self.config.execution.seed.is_some(),
            "Conversation created"
        );

        Ok(Conversation {
            repository: CaseRepository::new(self.config.synthesis.case_prefix.clone()),
            config: self.config,
            engine,
            synthesizer,
            rng,
            navigator,
            scheduler: Scheduler::new(origin),
            phase: Phase::Chat,
            round: 0,
            transcript: Vec::new(),
            disambiguator: Disambiguator::new(),
            context: SynthesisContext::default(),
            run: None,
        })
    }
}

// ============================================
// Conversation
// ============================================

/// One conversation from requirement to report.
pub struct Conversation {
    config: Config,
    engine: DialogueEngine,
    synthesizer: Box<dyn CaseSynthesizer>,
    rng: Box<dyn RandomSource>,
    navigator: Box<dyn Navigator>,
    scheduler: Scheduler<Task>,
    phase: Phase,
    round: u32,
    transcript: Vec<Message>,
    disambiguator: Disambiguator,
    context: SynthesisContext,
    repository: CaseRepository,
    run: Option<Orchestrator>,
}

impl Conversation {
    pub fn builder() -> ConversationBuilder {
        ConversationBuilder::new()
    }

    /// Start a conversation with default collaborators.
    pub fn new(config: Config) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ConversationState {
        ConversationState {
            phase: self.phase,
            round: self.round,
            pending_disambiguation: self.disambiguator.pending(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Transcript as pretty-printed JSON
    pub fn export_transcript_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.transcript)?)
    }

    // ----- dialogue -----

    /// Submit one user turn and get the messages it produced.
    ///
    /// Appends exactly one user message and one agent message. Blank text is
    /// rejected, as is any message while the page prompt is open.
    pub fn submit_user_message(&mut self, text: &str) -> Result<TranscriptDelta> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("message is empty".to_string()));
        }
        if self.disambiguator.is_pending() {
            return Err(Error::AwaitingPageSelection);
        }

        let now = self.scheduler.now();
        let user = Message::user(text, now);
        let decision = self
            .engine
            .decide(self.phase, self.round, text, self.rng.as_mut());

        tracing::debug!(
            phase = %self.phase,
            round = self.round,
            decision = ?decision,
            "User message received"
        );

        let reply = match decision {
            DialogueDecision::RequestPages { prompt } => {
                self.context.requirement = text.to_string();
                let pending = self.disambiguator.present(self.config.candidate_pages());
                Message::new(
                    Role::Agent,
                    MessageContent::CandidatePages {
                        prompt,
                        pages: pending.candidates,
                    },
                    now,
                )
            }
            DialogueDecision::Ask { question } => {
                self.context.answers.push(text.to_string());
                Message::agent(question, now)
            }
            DialogueDecision::Synthesize { acknowledgement } => {
                self.context.answers.push(text.to_string());
                match self.synthesize_into_repository() {
                    Ok(count) => {
                        self.transition(Phase::Review)?;
                        Message::agent(
                            format!(
                                "{} I drafted {} test cases. Review and edit them, then say \"execute\" to run them.",
                                acknowledgement, count
                            ),
                            now,
                        )
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Synthesis failed, staying in chat");
                        Message::agent_error(format!("I couldn't draft test cases: {}", e), now)
                    }
                }
            }
            DialogueDecision::BeginExecution {
                acknowledgement,
                delay_ms,
            } => {
                self.scheduler.schedule_after(delay_ms, Task::BeginExecution);
                Message::agent(acknowledgement, now)
            }
            DialogueDecision::Revise {
                acknowledgement,
                delay_ms,
            } => {
                self.context.revisions.push(text.to_string());
                self.scheduler.schedule_after(delay_ms, Task::Resynthesize);
                Message::agent(acknowledgement, now)
            }
            DialogueDecision::Notice { text } => Message::agent(text, now),
        };

        self.round += 1;
        self.transcript.push(user.clone());
        self.transcript.push(reply.clone());

        Ok(TranscriptDelta {
            messages: vec![user, reply],
            phase_after: self.phase,
        })
    }

    // ----- page selection -----

    /// The open page prompt, if any
    pub fn candidate_pages(&self) -> Option<PendingDisambiguation> {
        self.disambiguator.pending()
    }

    pub fn select_candidate_pages(&mut self, ids: &[String]) -> Result<PendingDisambiguation> {
        self.disambiguator.select(ids)?;
        self.disambiguator.pending().ok_or(Error::NoPendingSelection)
    }

    pub fn set_primary_page(&mut self, id: &str) -> Result<PendingDisambiguation> {
        self.disambiguator.set_primary(id)?;
        self.disambiguator.pending().ok_or(Error::NoPendingSelection)
    }

    /// Close the prompt, keep the selection and resume the dialogue.
    ///
    /// The summary is returned and also leads the agent's next question.
    pub fn confirm_page_selection(&mut self) -> Result<String> {
        let selection = self.disambiguator.confirm()?;
        let summary = selection.summary();
        self.context.pages = selection;

        let question = self.engine.opening_question(self.rng.as_mut());
        let now = self.scheduler.now();
        self.transcript
            .push(Message::agent(format!("{} {}", summary, question), now));
        Ok(summary)
    }

    /// Close the prompt without a selection and resume the dialogue.
    pub fn cancel_page_selection(&mut self) -> Result<()> {
        self.disambiguator.cancel()?;
        self.context.pages = Default::default();

        let question = self.engine.opening_question(self.rng.as_mut());
        let now = self.scheduler.now();
        self.transcript.push(Message::agent(question, now));
        Ok(())
    }

    // ----- case repository -----

    pub fn cases(&self) -> &[TestCase] {
        self.repository.list()
    }

    /// Look a case up by id or case number
    pub fn find_case(&self, id_or_number: &str) -> Option<&TestCase> {
        self.repository.find(id_or_number)
    }

    pub fn add_case(&mut self) -> Result<TestCase> {
        self.require_phase(Phase::Review, "add_case")?;
        let case = self.repository.add();
        tracing::info!(case_number = %case.case_number, "Case added");
        Ok(case)
    }

    pub fn update_case(&mut self, id: &str, patch: CasePatch) -> Result<TestCase> {
        self.require_phase(Phase::Review, "update_case")?;
        let case = self.repository.update(id, patch)?;
        tracing::info!(case_number = %case.case_number, "Case updated");
        Ok(case)
    }

    pub fn remove_case(&mut self, id: &str) -> Result<TestCase> {
        self.require_phase(Phase::Review, "remove_case")?;
        let case = self.repository.remove(id)?;
        tracing::info!(case_number = %case.case_number, "Case removed");
        Ok(case)
    }

    // ----- execution -----

    /// Freeze the current cases and start a run.
    ///
    /// Only allowed in review with at least one case; nothing changes on
    /// rejection.
    pub fn begin_execution(&mut self) -> Result<RunId> {
        self.require_phase(Phase::Review, "begin_execution")?;
        if self.repository.is_empty() {
            return Err(Error::NoCases);
        }

        let run_id = RunId::new();
        let (orchestrator, starts) = Orchestrator::start(
            run_id,
            self.repository.snapshot(),
            &self.config.execution,
            self.scheduler.clock(),
        )?;
        self.transition(Phase::Executing)?;
        self.queue_case_events(run_id, starts);
        self.run = Some(orchestrator);
        Ok(run_id)
    }

    /// Id of the current run, if execution has begun
    pub fn current_run_id(&self) -> Option<RunId> {
        self.run.as_ref().map(Orchestrator::run_id)
    }

    /// Live log of a run, replaying every entry so far.
    pub fn subscribe_logs(&self, run_id: RunId) -> Result<LogSubscription> {
        Ok(self.run(run_id)?.log().subscribe())
    }

    /// Records of a run keyed by case id
    pub fn execution_status(&self, run_id: RunId) -> Result<BTreeMap<String, ExecutionRecord>> {
        Ok(self.run(run_id)?.status_map())
    }

    /// Records of a run in start order
    pub fn execution_records(&self, run_id: RunId) -> Result<Vec<ExecutionRecord>> {
        Ok(self.run(run_id)?.records().to_vec())
    }

    pub fn run_summary(&self, run_id: RunId) -> Result<RunSummary> {
        Ok(self.run(run_id)?.summary())
    }

    pub fn run_report(&self, run_id: RunId) -> Result<RunReport> {
        Ok(self.run(run_id)?.report())
    }

    // ----- clock -----

    pub fn now(&self) -> DateTime<Utc> {
        self.scheduler.now()
    }

    /// Virtual milliseconds since the clock origin
    pub fn elapsed_ms(&self) -> u64 {
        self.scheduler.elapsed_ms()
    }

    /// Milliseconds until the next queued task, or `None` when idle
    pub fn next_wakeup(&self) -> Option<u64> {
        self.scheduler
            .next_due_ms()
            .map(|due| due.saturating_sub(self.scheduler.elapsed_ms()))
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    /// Run every task due within the next `ms` milliseconds, then move the
    /// clock to the end of the window. Returns the number of tasks run.
    pub fn advance(&mut self, ms: u64) -> usize {
        let until = self.scheduler.elapsed_ms().saturating_add(ms);
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_due(until) {
            self.dispatch(task);
            ran += 1;
        }
        self.scheduler.advance_clock_to(until);
        ran
    }

    /// Run queued tasks until none remain. Returns the number of tasks run.
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_next() {
            self.dispatch(task);
            ran += 1;
        }
        ran
    }

    // ----- restart -----

    /// Discard everything and return to a fresh chat.
    pub fn restart(&mut self) -> ConversationState {
        self.scheduler.clear();
        if let Some(run) = self.run.take() {
            // Wake any async subscriber still waiting on the discarded run.
            run.log().close();
        }
        self.transcript.clear();
        self.disambiguator.reset();
        self.context = SynthesisContext::default();
        self.repository.clear();
        self.round = 0;

        let from = self.phase;
        self.phase = Phase::Chat;
        if from != Phase::Chat {
            self.navigator.on_phase_change(from, Phase::Chat);
        }
        tracing::info!(from = %from, "Conversation restarted");
        self.state()
    }

    // ----- internals -----

    fn require_phase(&self, expected: Phase, operation: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::PhaseViolation {
                operation,
                phase: self.phase,
            })
        }
    }

    fn transition(&mut self, to: Phase) -> Result<()> {
        let from = self.phase;
        if !from.can_advance_to(to) {
            return Err(Error::PhaseViolation {
                operation: "transition",
                phase: from,
            });
        }
        self.phase = to;
        tracing::info!(from = %from, to = %to, "Phase changed");
        self.navigator.on_phase_change(from, to);
        Ok(())
    }

    fn run(&self, run_id: RunId) -> Result<&Orchestrator> {
        self.run
            .as_ref()
            .filter(|run| run.run_id() == run_id)
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))
    }

    fn synthesize_into_repository(&mut self) -> Result<usize> {
        let cases = self.synthesizer.synthesize(&self.context)?;
        let count = cases.len();
        self.repository.replace_all(cases)?;
        tracing::info!(
            synthesizer = self.synthesizer.name(),
            cases = count,
            "Case collection replaced"
        );
        Ok(count)
    }

    fn queue_case_events(&mut self, run_id: RunId, follow_ups: Vec<FollowUp>) {
        for FollowUp { delay_ms, event } in follow_ups {
            self.scheduler
                .schedule_after(delay_ms, Task::Case { run_id, event });
        }
    }

    fn dispatch(&mut self, task: Task) {
        match task {
            Task::BeginExecution => self.on_begin_execution(),
            Task::Resynthesize => self.on_resynthesize(),
            Task::Case { run_id, event } => self.on_case_event(run_id, event),
        }
    }

    fn on_begin_execution(&mut self) {
        match self.begin_execution() {
            Ok(run_id) => {
                tracing::debug!(run_id = %run_id, "Execution started from chat intent");
            }
            Err(Error::NoCases) => {
                let now = self.scheduler.now();
                self.transcript.push(Message::agent_error(
                    "There are no test cases to run. Add at least one case first.",
                    now,
                ));
            }
            Err(e) => {
                // Already executing, e.g. a repeated execute request.
                tracing::debug!(error = %e, "Queued execution start skipped");
            }
        }
    }

    fn on_resynthesize(&mut self) {
        if self.phase != Phase::Review {
            tracing::debug!(phase = %self.phase, "Resynthesis skipped outside review");
            return;
        }
        if let Err(e) = self.synthesize_into_repository() {
            tracing::warn!(error = %e, "Resynthesis failed, keeping current cases");
            let now = self.scheduler.now();
            self.transcript.push(Message::agent_error(
                format!("I couldn't revise the test cases: {}", e),
                now,
            ));
        }
    }

    fn on_case_event(&mut self, run_id: RunId, event: CaseEvent) {
        let Some(run) = self.run.as_mut().filter(|run| run.run_id() == run_id) else {
            return;
        };
        let advance = run.handle(event, self.scheduler.clock(), self.rng.as_mut());
        self.queue_case_events(run_id, advance.follow_ups);

        if advance.completed.is_some() {
            if let Err(e) = self.transition(Phase::Completed) {
                tracing::warn!(error = %e, "Run completed outside the executing phase");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionStatus;
    use crate::config::SynthesisConfig;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingNavigator {
        changes: Arc<Mutex<Vec<(Phase, Phase)>>>,
    }

    impl Navigator for RecordingNavigator {
        fn on_phase_change(&mut self, from: Phase, to: Phase) {
            self.changes.lock().unwrap().push((from, to));
        }
    }

    struct FailingSynthesizer;

    impl CaseSynthesizer for FailingSynthesizer {
        fn name(&self) -> &str {
            "failing"
        }

        fn synthesize(&self, _context: &SynthesisContext) -> Result<Vec<TestCase>> {
            Ok(Vec::new())
        }
    }

    /// Drafts normally the first time, then fails every revision.
    struct FlakySynthesizer {
        inner: TemplateSynthesizer,
        calls: AtomicUsize,
    }

    impl CaseSynthesizer for FlakySynthesizer {
        fn name(&self) -> &str {
            "flaky"
        }

        fn synthesize(&self, context: &SynthesisContext) -> Result<Vec<TestCase>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.inner.synthesize(context)
            } else {
                Err(Error::Synthesis("template store unavailable".to_string()))
            }
        }
    }

    fn conversation() -> Conversation {
        Conversation::builder()
            .seed(7)
            .clock_origin(Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap())
            .build()
            .unwrap()
    }

    fn into_review(conv: &mut Conversation) {
        conv.submit_user_message("login with username and password")
            .unwrap();
        conv.confirm_page_selection().unwrap();
        conv.submit_user_message("regular members").unwrap();
        conv.submit_user_message("lock after five failures").unwrap();
        let delta = conv.submit_user_message("nothing else").unwrap();
        assert_eq!(delta.phase_after, Phase::Review);
    }

    #[test]
    fn test_blank_message_rejected_without_change() {
        let mut conv = conversation();
        assert!(matches!(
            conv.submit_user_message("   "),
            Err(Error::InvalidInput(_))
        ));
        assert!(conv.transcript().is_empty());
        assert_eq!(conv.state(), ConversationState::fresh());
    }

    #[test]
    fn test_each_turn_appends_one_user_and_one_agent_message() {
        let mut conv = conversation();
        let delta = conv.submit_user_message("search by keyword").unwrap();
        assert_eq!(delta.messages.len(), 2);
        assert_eq!(delta.messages[0].role, Role::User);
        assert_eq!(delta.messages[1].role, Role::Agent);
        assert!(matches!(
            delta.messages[1].content,
            MessageContent::CandidatePages { .. }
        ));
        assert_eq!(conv.transcript().len(), 2);
        assert_eq!(conv.state().round, 1);
    }

    #[test]
    fn test_message_while_pages_pending_rejected() {
        let mut conv = conversation();
        conv.submit_user_message("search by keyword").unwrap();
        assert!(matches!(
            conv.submit_user_message("hello?"),
            Err(Error::AwaitingPageSelection)
        ));
        assert_eq!(conv.transcript().len(), 2);
    }

    #[test]
    fn test_confirm_prepends_summary_to_next_question() {
        let mut conv = conversation();
        conv.submit_user_message("login page").unwrap();
        conv.select_candidate_pages(&["login".to_string(), "home".to_string()])
            .unwrap();
        conv.set_primary_page("login").unwrap();
        let summary = conv.confirm_page_selection().unwrap();

        assert_eq!(summary, "Selected 2 pages; primary page: Login page.");
        let last = conv.transcript().last().unwrap();
        assert!(last.text().starts_with(&summary));
        assert!(conv.state().pending_disambiguation.is_none());
    }

    #[test]
    fn test_repository_ops_gated_on_review() {
        let mut conv = conversation();
        let err = conv.add_case().unwrap_err();
        assert!(err.is_phase_violation());
        assert!(matches!(
            conv.begin_execution(),
            Err(Error::PhaseViolation { phase: Phase::Chat, .. })
        ));

        into_review(&mut conv);
        let added = conv.add_case().unwrap();
        assert!(conv.find_case(&added.case_number).is_some());
    }

    #[test]
    fn test_execute_intent_starts_after_ack_delay() {
        let mut conv = conversation();
        into_review(&mut conv);

        let delta = conv.submit_user_message("Run the tests").unwrap();
        assert_eq!(delta.phase_after, Phase::Review);
        assert_eq!(conv.next_wakeup(), Some(800));

        conv.advance(799);
        assert_eq!(conv.phase(), Phase::Review);
        conv.advance(1);
        assert_eq!(conv.phase(), Phase::Executing);
        assert!(conv.current_run_id().is_some());
    }

    #[test]
    fn test_revision_replaces_cases_after_delay() {
        let mut conv = conversation();
        into_review(&mut conv);
        let before = conv.cases().len();

        conv.submit_user_message("also cover the remember-me checkbox")
            .unwrap();
        assert_eq!(conv.cases().len(), before);
        conv.run_until_idle();

        assert_eq!(conv.cases().len(), before + 1);
        assert!(conv
            .cases()
            .last()
            .unwrap()
            .title
            .contains("remember-me"));
    }

    #[test]
    fn test_resynthesis_ignored_once_executing() {
        let mut conv = conversation();
        into_review(&mut conv);
        conv.submit_user_message("add a case for SSO").unwrap();
        let run_id = conv.begin_execution().unwrap();
        let frozen = conv.execution_status(run_id).unwrap().len();

        conv.run_until_idle();
        assert_eq!(conv.phase(), Phase::Completed);
        assert_eq!(conv.execution_status(run_id).unwrap().len(), frozen);
        assert!(!conv.cases().iter().any(|c| c.title.contains("SSO")));
    }

    #[test]
    fn test_failed_synthesis_keeps_chat_phase() {
        let mut conv = Conversation::builder()
            .seed(1)
            .synthesizer(FailingSynthesizer)
            .build()
            .unwrap();
        conv.submit_user_message("login").unwrap();
        conv.cancel_page_selection().unwrap();
        conv.submit_user_message("members").unwrap();
        conv.submit_user_message("wrong passwords").unwrap();
        let delta = conv.submit_user_message("that's all").unwrap();

        assert_eq!(delta.phase_after, Phase::Chat);
        assert!(delta.agent_message().unwrap().is_error());
        assert!(conv.cases().is_empty());
    }

    #[test]
    fn test_failed_resynthesis_keeps_review_and_cases() {
        let mut conv = Conversation::builder()
            .seed(2)
            .synthesizer(FlakySynthesizer {
                inner: TemplateSynthesizer::new(&SynthesisConfig::default()),
                calls: AtomicUsize::new(0),
            })
            .build()
            .unwrap();
        into_review(&mut conv);
        let before = conv.cases().to_vec();
        assert!(!before.is_empty());

        conv.submit_user_message("also cover password reset").unwrap();
        conv.run_until_idle();

        assert_eq!(conv.phase(), Phase::Review);
        assert_eq!(conv.cases(), before.as_slice());
        let last = conv.transcript().last().unwrap();
        assert_eq!(last.role, Role::Agent);
        assert!(last.is_error());
        assert!(last.text().contains("template store unavailable"));
    }

    #[test]
    fn test_clock_saturates_without_panicking() {
        let mut conv = conversation();
        conv.advance(u64::MAX);
        assert_eq!(conv.elapsed_ms(), u64::MAX);
        assert_eq!(conv.now(), DateTime::<Utc>::MAX_UTC);

        let delta = conv.submit_user_message("login").unwrap();
        assert_eq!(delta.messages.len(), 2);
        conv.advance(u64::MAX);
        assert_eq!(conv.elapsed_ms(), u64::MAX);
    }

    #[test]
    fn test_navigator_sees_every_phase_change() {
        let navigator = RecordingNavigator::default();
        let changes = Arc::clone(&navigator.changes);
        let mut conv = Conversation::builder()
            .seed(3)
            .navigator(navigator)
            .build()
            .unwrap();

        into_review(&mut conv);
        conv.begin_execution().unwrap();
        conv.run_until_idle();
        conv.restart();

        assert_eq!(
            *changes.lock().unwrap(),
            vec![
                (Phase::Chat, Phase::Review),
                (Phase::Review, Phase::Executing),
                (Phase::Executing, Phase::Completed),
                (Phase::Completed, Phase::Chat),
            ]
        );
    }

    #[test]
    fn test_restart_discards_run() {
        let mut conv = conversation();
        into_review(&mut conv);
        let run_id = conv.begin_execution().unwrap();
        conv.advance(1000);

        let state = conv.restart();
        assert_eq!(state, ConversationState::fresh());
        assert!(conv.transcript().is_empty());
        assert!(conv.cases().is_empty());
        assert!(conv.is_idle());
        assert!(matches!(
            conv.run_summary(run_id),
            Err(Error::RunNotFound(_))
        ));
    }

    #[test]
    fn test_transcript_export_roundtrips() {
        let mut conv = conversation();
        conv.submit_user_message("search by keyword").unwrap();
        let json = conv.export_transcript_json().unwrap();
        let parsed: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, conv.transcript());
    }

    #[test]
    fn test_all_records_terminal_when_completed() {
        let mut conv = conversation();
        into_review(&mut conv);
        let run_id = conv.begin_execution().unwrap();
        conv.run_until_idle();

        let status = conv.execution_status(run_id).unwrap();
        assert!(status.values().all(|r| r.status.is_terminal()));
        assert!(status
            .values()
            .all(|r| (r.status == ExecutionStatus::Failed) == r.error_message.is_some()));
        let summary = conv.run_summary(run_id).unwrap();
        assert_eq!(summary.passed + summary.failed, summary.total);
    }
}
