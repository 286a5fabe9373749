//! Dialogue policy: what the agent says next
//!
//! The engine is a pure decision function over `(phase, round, text)`; the
//! [`crate::Conversation`] owns the state and applies the decision. Keeping the
//! policy separate lets it be tested without a clock or a transcript.
//!
//! Chat-phase flow:
//!
//! ```text
//! round 0          -> ask for candidate pages (question from bucket A once confirmed)
//! round 1          -> question from bucket B
//! round >= 2       -> question from bucket C
//! round >= limit   -> synthesize, move to review
//! ```

use crate::config::DialogueConfig;
use crate::error::{Error, Result};
use crate::rng::{choose, RandomSource};
use crate::types::Phase;

/// What a review-phase message asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Execute,
    Revise,
}

/// Matches execute trigger phrases, case-insensitively, anywhere in the text.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    triggers: Vec<String>,
}

impl IntentClassifier {
    pub fn new<S: AsRef<str>>(triggers: &[S]) -> Result<Self> {
        let triggers: Vec<String> = triggers
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if triggers.is_empty() {
            return Err(Error::Config(
                "intent classifier needs at least one trigger phrase".to_string(),
            ));
        }
        Ok(Self { triggers })
    }

    pub fn classify(&self, text: &str) -> Intent {
        let text = text.to_lowercase();
        if self.triggers.iter().any(|t| text.contains(t.as_str())) {
            Intent::Execute
        } else {
            Intent::Revise
        }
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }
}

/// Follow-up question buckets, keyed by round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    A,
    B,
    C,
}

impl Bucket {
    pub fn for_round(round: u32) -> Self {
        match round {
            0 => Bucket::A,
            1 => Bucket::B,
            _ => Bucket::C,
        }
    }
}

const BUCKET_A: &[&str] = &[
    "Who uses this feature, and which account types or roles should the tests cover?",
    "What does a successful run of this feature look like from the user's point of view?",
    "Which platforms matter here: desktop web, mobile web, or the native apps?",
];

const BUCKET_B: &[&str] = &[
    "Which error situations worry you most, such as invalid input, timeouts or locked accounts?",
    "Are there limits I should test, like field lengths, rate limits or retry counts?",
    "Does this feature depend on other services that might be unavailable during testing?",
];

const BUCKET_C: &[&str] = &[
    "Which of these scenarios should be treated as release blockers?",
    "Are there performance targets, for example a maximum response time?",
    "Anything else the cases should cover before I draft them?",
];

/// Fixed question bank.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionBank;

impl QuestionBank {
    pub fn questions(&self, bucket: Bucket) -> &'static [&'static str] {
        match bucket {
            Bucket::A => BUCKET_A,
            Bucket::B => BUCKET_B,
            Bucket::C => BUCKET_C,
        }
    }

    /// Random question from the bucket for `round`; never empty.
    pub fn pick(&self, round: u32, rng: &mut dyn RandomSource) -> &'static str {
        let questions = self.questions(Bucket::for_round(round));
        choose(rng, questions)
            .copied()
            .unwrap_or("Could you tell me more about what should be tested?")
    }
}

/// The engine's verdict on one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueDecision {
    /// First turn: ask which pages are involved before any question
    RequestPages { prompt: String },
    /// Not enough context yet
    Ask { question: String },
    /// Enough context: synthesize cases and move to review
    Synthesize { acknowledgement: String },
    /// Review: start execution after `delay_ms`
    BeginExecution {
        acknowledgement: String,
        delay_ms: u64,
    },
    /// Review: regenerate cases with the message as a revision note
    Revise {
        acknowledgement: String,
        delay_ms: u64,
    },
    /// Executing or completed: informational reply, no state change
    Notice { text: String },
}

impl DialogueDecision {
    /// Text of the agent reply this decision produces
    pub fn reply(&self) -> &str {
        match self {
            DialogueDecision::RequestPages { prompt } => prompt,
            DialogueDecision::Ask { question } => question,
            DialogueDecision::Synthesize { acknowledgement }
            | DialogueDecision::BeginExecution {
                acknowledgement, ..
            }
            | DialogueDecision::Revise {
                acknowledgement, ..
            } => acknowledgement,
            DialogueDecision::Notice { text } => text,
        }
    }
}

/// Decides the agent's next move.
#[derive(Debug, Clone)]
pub struct DialogueEngine {
    classifier: IntentClassifier,
    questions: QuestionBank,
    sufficiency_rounds: u32,
    ack_delay_ms: u64,
    resynthesis_delay_ms: u64,
}

impl DialogueEngine {
    pub fn new(config: &DialogueConfig) -> Result<Self> {
        if config.sufficiency_rounds == 0 {
            return Err(Error::Config(
                "dialogue.sufficiency_rounds must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            classifier: IntentClassifier::new(&config.execute_triggers)?,
            questions: QuestionBank,
            sufficiency_rounds: config.sufficiency_rounds,
            ack_delay_ms: config.ack_delay_ms,
            resynthesis_delay_ms: config.resynthesis_delay_ms,
        })
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// Question asked once the page prompt is confirmed or cancelled
    pub fn opening_question(&self, rng: &mut dyn RandomSource) -> &'static str {
        self.questions.pick(0, rng)
    }

    /// Decide the reply to `text`, where `round` counts the user turns before it.
    pub fn decide(
        &self,
        phase: Phase,
        round: u32,
        text: &str,
        rng: &mut dyn RandomSource,
    ) -> DialogueDecision {
        match phase {
            Phase::Chat => self.decide_chat(round, rng),
            Phase::Review => match self.classifier.classify(text) {
                Intent::Execute => DialogueDecision::BeginExecution {
                    acknowledgement: "Starting execution. The live log will follow each case as it runs."
                        .to_string(),
                    delay_ms: self.ack_delay_ms,
                },
                Intent::Revise => DialogueDecision::Revise {
                    acknowledgement: "Got it, I'm revising the test cases with that in mind."
                        .to_string(),
                    delay_ms: self.resynthesis_delay_ms,
                },
            },
            Phase::Executing => DialogueDecision::Notice {
                text: "Execution is in progress; results will appear as each case finishes."
                    .to_string(),
            },
            Phase::Completed => DialogueDecision::Notice {
                text: "This run is complete. Open the report, or restart to test another requirement."
                    .to_string(),
            },
        }
    }

    fn decide_chat(&self, round: u32, rng: &mut dyn RandomSource) -> DialogueDecision {
        if round == 0 {
            return DialogueDecision::RequestPages {
                prompt: "Before I ask anything else: which pages does this requirement involve? \
                         Select the relevant pages and mark the main one as primary."
                    .to_string(),
            };
        }

        // `round` prior turns are complete; the limit defaults to 3.
        if round >= self.sufficiency_rounds {
            return DialogueDecision::Synthesize {
                acknowledgement: "Thanks, that's enough to draft the test cases.".to_string(),
            };
        }

        DialogueDecision::Ask {
            question: self.questions.pick(round, rng).to_string(),
        }
    }
}
