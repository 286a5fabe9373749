//! Error types for caseforge-core

use thiserror::Error;

use crate::types::Phase;

/// Main error type for the caseforge-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected user input (blank message, malformed command argument)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted in a phase that does not allow it
    #[error("{operation} is not allowed while the conversation is in the {phase} phase")]
    PhaseViolation {
        operation: &'static str,
        phase: Phase,
    },

    /// Execution requested with an empty case repository
    #[error("cannot begin execution without any test cases")]
    NoCases,

    /// Synthesizer produced no usable cases
    #[error("test case synthesis failed: {0}")]
    Synthesis(String),

    /// Test case not found
    #[error("test case not found: {0}")]
    CaseNotFound(String),

    /// Candidate page not found
    #[error("candidate page not found: {0}")]
    PageNotFound(String),

    /// A user message arrived while page selection is still open
    #[error("page selection is pending; confirm or cancel it first")]
    AwaitingPageSelection,

    /// Selection command issued with no page selection open
    #[error("no page selection is pending")]
    NoPendingSelection,

    /// Run not found (unknown id or discarded by restart)
    #[error("run not found: {0}")]
    RunNotFound(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is a phase-gate rejection (including the empty-run guard)
    pub fn is_phase_violation(&self) -> bool {
        matches!(self, Error::PhaseViolation { .. } | Error::NoCases)
    }
}

/// Result type alias for caseforge-core
pub type Result<T> = std::result::Result<T, Error>;
