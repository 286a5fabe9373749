//! Core domain types for caseforge
//!
//! These types model one conversation from the first requirement message through
//! review and simulated execution.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Phase** | Top-level lifecycle stage: chat, review, executing, completed |
//! | **Round** | Number of user-authored turns in the current conversation |
//! | **Disambiguation** | Sub-protocol for selecting and confirming candidate application screens |
//! | **TestCase** | Immutable-once-running definition of a single check |
//! | **ExecutionRecord** | Per-case mutable run status, distinct from the [`TestCase`] definition |
//! | **LogEntry** | One line of the append-only run log |
//!
//! A restart discards every message, case, record and log entry owned by the
//! conversation and returns it to [`Phase::Chat`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================
// Phase
// ============================================

/// Lifecycle stage of a conversation.
///
/// Transitions only move forward (`Chat -> Review -> Executing -> Completed`);
/// the only way back is an explicit restart, which is not modelled as a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Chat,
    Review,
    Executing,
    Completed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Chat => "chat",
            Phase::Review => "review",
            Phase::Executing => "executing",
            Phase::Completed => "completed",
        }
    }

    /// The single phase reachable from this one, if any.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Chat => Some(Phase::Review),
            Phase::Review => Some(Phase::Executing),
            Phase::Executing => Some(Phase::Completed),
            Phase::Completed => None,
        }
    }

    /// Whether `to` directly follows this phase.
    pub fn can_advance_to(&self, to: Phase) -> bool {
        self.next() == Some(to)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Phase::Chat),
            "review" => Ok(Phase::Review),
            "executing" => Ok(Phase::Executing),
            "completed" => Ok(Phase::Completed),
            _ => Err(format!("unknown phase: {}", s)),
        }
    }
}

/// Snapshot of the dialogue state exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub phase: Phase,
    /// Completed user turns
    pub round: u32,
    /// Open page selection, if the first turn is waiting on it
    pub pending_disambiguation: Option<PendingDisambiguation>,
}

impl ConversationState {
    pub fn fresh() -> Self {
        Self {
            phase: Phase::Chat,
            round: 0,
            pending_disambiguation: None,
        }
    }
}

/// The page selection the user has not yet confirmed or cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDisambiguation {
    pub candidates: Vec<CandidatePage>,
    pub selected: Vec<String>,
}

// ============================================
// Transcript
// ============================================

/// Author of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }
}

/// Body of a transcript message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain conversational text
    Text { text: String },
    /// Request to pick the screens under test
    CandidatePages {
        prompt: String,
        pages: Vec<CandidatePage>,
    },
    /// Agent-authored error (synthesis failure, rejected execution)
    Error { text: String },
}

/// A single immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: MessageContent, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp,
        }
    }

    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::User, MessageContent::Text { text: text.into() }, timestamp)
    }

    pub fn agent(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Agent, MessageContent::Text { text: text.into() }, timestamp)
    }

    pub fn agent_error(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(Role::Agent, MessageContent::Error { text: text.into() }, timestamp)
    }

    /// Displayable text of the message, whatever its payload
    pub fn text(&self) -> &str {
        match &self.content {
            MessageContent::Text { text } | MessageContent::Error { text } => text,
            MessageContent::CandidatePages { prompt, .. } => prompt,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.content, MessageContent::Error { .. })
    }
}

/// Messages appended by one call, plus the phase the conversation ended in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptDelta {
    pub messages: Vec<Message>,
    pub phase_after: Phase,
}

impl TranscriptDelta {
    /// The agent's reply within this delta
    pub fn agent_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Agent)
    }
}

// ============================================
// Candidate pages
// ============================================

/// An application screen the generated cases may target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePage {
    pub id: String,
    pub label: String,
    pub description: String,
    pub is_primary: bool,
}

// ============================================
// Test cases
// ============================================

/// Case priority, P0 being the most important
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::P0, Priority::P1, Priority::P2, Priority::P3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

/// Kind of check a case performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Functional,
    Performance,
    Ui,
    Compatibility,
}

impl TestType {
    pub const ALL: [TestType; 4] = [
        TestType::Functional,
        TestType::Performance,
        TestType::Ui,
        TestType::Compatibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Functional => "functional",
            TestType::Performance => "performance",
            TestType::Ui => "ui",
            TestType::Compatibility => "compatibility",
        }
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "functional" => Ok(TestType::Functional),
            "performance" => Ok(TestType::Performance),
            "ui" => Ok(TestType::Ui),
            "compatibility" => Ok(TestType::Compatibility),
            _ => Err(format!("unknown test type: {}", s)),
        }
    }
}

/// A single test case definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Stable identity, unaffected by renumbering
    pub id: String,
    /// Display number, e.g. `TC001`; unique within the repository
    pub case_number: String,
    pub module: String,
    pub title: String,
    pub steps: Vec<String>,
    pub expected_result: String,
    pub priority: Priority,
    pub test_type: TestType,
}

impl TestCase {
    /// Blank template inserted by a manual "add case"
    pub fn blank(case_number: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            case_number,
            module: "Unassigned".to_string(),
            title: "New test case".to_string(),
            steps: vec!["Describe the first step".to_string()],
            expected_result: "Describe the expected result".to_string(),
            priority: Priority::P2,
            test_type: TestType::Functional,
        }
    }
}

/// Partial update for a [`TestCase`]. The case number is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasePatch {
    pub module: Option<String>,
    pub title: Option<String>,
    pub steps: Option<Vec<String>>,
    pub expected_result: Option<String>,
    pub priority: Option<Priority>,
    pub test_type: Option<TestType>,
}

impl CasePatch {
    pub fn is_empty(&self) -> bool {
        self.module.is_none()
            && self.title.is_none()
            && self.steps.is_none()
            && self.expected_result.is_none()
            && self.priority.is_none()
            && self.test_type.is_none()
    }

    pub(crate) fn apply(self, case: &mut TestCase) {
        if let Some(module) = self.module {
            case.module = module;
        }
        if let Some(title) = self.title {
            case.title = title;
        }
        if let Some(steps) = self.steps {
            case.steps = steps;
        }
        if let Some(expected) = self.expected_result {
            case.expected_result = expected;
        }
        if let Some(priority) = self.priority {
            case.priority = priority;
        }
        if let Some(test_type) = self.test_type {
            case.test_type = test_type;
        }
    }
}

// ============================================
// Execution
// ============================================

/// Identifier of one execution run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(RunId)
            .map_err(|e| format!("invalid run id {}: {}", s, e))
    }
}

/// Per-case execution state: `Pending -> Running -> {Passed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Passed => "passed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Passed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable run status of one case. Owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub case_id: String,
    pub case_number: String,
    pub status: ExecutionStatus,
    /// Human-readable running time, e.g. `2.4s`; set when terminal
    pub duration_label: Option<String>,
    /// Always set for failed cases, never for passed ones
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    pub fn pending(case: &TestCase) -> Self {
        Self {
            case_id: case.id.clone(),
            case_number: case.case_number.clone(),
            status: ExecutionStatus::Pending,
            duration_label: None,
            error_message: None,
            started_at: None,
            finished_at: None,
        }
    }
}

// ============================================
// Run log
// ============================================

/// Severity of a run log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the stream, starting at 1
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Case the entry belongs to; `None` for run-level entries
    pub case_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_only_advances_forward() {
        assert!(Phase::Chat.can_advance_to(Phase::Review));
        assert!(Phase::Review.can_advance_to(Phase::Executing));
        assert!(Phase::Executing.can_advance_to(Phase::Completed));

        assert!(!Phase::Chat.can_advance_to(Phase::Executing));
        assert!(!Phase::Review.can_advance_to(Phase::Chat));
        assert!(!Phase::Completed.can_advance_to(Phase::Chat));
        assert_eq!(Phase::Completed.next(), None);
    }

    #[test]
    fn test_phase_roundtrip_str() {
        for phase in [Phase::Chat, Phase::Review, Phase::Executing, Phase::Completed] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("paused".parse::<Phase>().is_err());
    }

    #[test]
    fn test_priority_parse_is_case_insensitive() {
        assert_eq!("p1".parse::<Priority>().unwrap(), Priority::P1);
        assert_eq!("P3".parse::<Priority>().unwrap(), Priority::P3);
        assert!("P4".parse::<Priority>().is_err());
    }

    #[test]
    fn test_case_patch_leaves_unset_fields() {
        let mut case = TestCase::blank("TC001".to_string());
        let patch = CasePatch {
            title: Some("Login with valid credentials".to_string()),
            priority: Some(Priority::P0),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        patch.apply(&mut case);

        assert_eq!(case.title, "Login with valid credentials");
        assert_eq!(case.priority, Priority::P0);
        assert_eq!(case.case_number, "TC001");
        assert_eq!(case.test_type, TestType::Functional);
    }

    #[test]
    fn test_message_serializes_with_tagged_content() {
        let msg = Message::agent_error("no cases", Utc::now());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "agent");
        assert_eq!(json["content"]["type"], "error");
        assert!(msg.is_error());
        assert_eq!(msg.text(), "no cases");
    }

    #[test]
    fn test_execution_status_terminal() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Passed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }
}
