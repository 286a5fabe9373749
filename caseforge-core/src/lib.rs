//! # caseforge-core
//!
//! Core library for caseforge - conversational test generation with simulated
//! execution.
//!
//! This library provides:
//! - A dialogue that turns a free-text requirement into test cases
//! - Candidate page selection on the first turn
//! - An editable case repository for review
//! - A simulated execution orchestrator with a live, replayable log
//! - Run summaries and reports
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A [`Conversation`] moves through four phases:
//! - **Chat:** the dialogue gathers context until it has enough to synthesize
//! - **Review:** the user edits the cases or asks for a revision
//! - **Executing:** the orchestrator runs a frozen snapshot of the cases
//! - **Completed:** every case reached passed or failed; the report is final
//!
//! All delayed work runs on a virtual clock owned by the conversation, so a
//! seeded run replays identically.
//!
//! ## Example
//!
//! ```rust,no_run
//! use caseforge_core::{Config, Conversation};
//!
//! let config = Config::load().expect("failed to load config");
//! let mut conv = Conversation::new(config).expect("invalid config");
//!
//! conv.submit_user_message("Login needs username and password validation")
//!     .expect("message rejected");
//! conv.confirm_page_selection().expect("no page prompt");
//! ```

// Re-export commonly used items at the crate root
pub use aggregator::{summarize, RunReport, RunSummary};
pub use config::Config;
pub use conversation::{Conversation, ConversationBuilder, Navigator, NoopNavigator};
pub use error::{Error, Result};
pub use log_stream::{LogStream, LogSubscription};
pub use rng::{RandomSource, SeededRandom};
pub use synthesizer::{CaseSynthesizer, SynthesisContext, TemplateSynthesizer};
pub use types::*;

// Public modules
pub mod aggregator;
pub mod config;
pub mod conversation;
pub mod dialogue;
pub mod disambiguation;
pub mod error;
pub mod log_stream;
pub mod logging;
pub mod orchestrator;
pub mod repository;
pub mod rng;
pub mod scheduler;
pub mod synthesizer;
pub mod types;
