//! Test case synthesis
//!
//! A [`CaseSynthesizer`] turns the context gathered by the dialogue into an
//! ordered list of [`TestCase`]s. The built-in [`TemplateSynthesizer`] is a
//! deterministic keyword matcher; a model-backed implementation can replace it
//! behind the same trait.
//!
//! Every synthesizer must return at least one case, number them
//! `{prefix}{NNN}` starting at 1, and assign exactly one [`Priority`] and one
//! [`TestType`] per case. Returning an empty list is treated as a failure by
//! the caller.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SynthesisConfig;
use crate::disambiguation::PageSelection;
use crate::error::{Error, Result};
use crate::repository::format_case_number;
use crate::types::{Priority, TestCase, TestType};

/// Everything the conversation has gathered so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisContext {
    /// The first user message
    pub requirement: String,
    /// Later answers to follow-up questions
    pub answers: Vec<String>,
    /// Confirmed page context, empty if the prompt was cancelled
    pub pages: PageSelection,
    /// Revision requests made during review, oldest first
    pub revisions: Vec<String>,
}

impl SynthesisContext {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            ..Default::default()
        }
    }

    /// Requirement and answers joined, lowercased for keyword matching
    fn searchable_text(&self) -> String {
        let mut text = self.requirement.to_lowercase();
        for answer in &self.answers {
            text.push('\n');
            text.push_str(&answer.to_lowercase());
        }
        text
    }
}

/// Converts gathered context into test cases.
pub trait CaseSynthesizer: Send {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn synthesize(&self, context: &SynthesisContext) -> Result<Vec<TestCase>>;
}

// ============================================
// Templates
// ============================================

struct CaseTemplate {
    title: &'static str,
    steps: &'static [&'static str],
    expected: &'static str,
    priority: Priority,
    test_type: TestType,
}

struct Feature {
    module: &'static str,
    keywords: &'static [&'static str],
    cases: &'static [CaseTemplate],
}

const FEATURES: &[Feature] = &[
    Feature {
        module: "Login",
        keywords: &["login", "log in", "sign in", "password", "登录", "密码"],
        cases: &[
            CaseTemplate {
                title: "Sign in with a valid username and password",
                steps: &[
                    "Open the login page",
                    "Enter a registered username",
                    "Enter the matching password",
                    "Click the sign-in button",
                ],
                expected: "The user lands on the home dashboard",
                priority: Priority::P0,
                test_type: TestType::Functional,
            },
            CaseTemplate {
                title: "Reject an incorrect password",
                steps: &[
                    "Open the login page",
                    "Enter a registered username",
                    "Enter a wrong password",
                    "Click the sign-in button",
                ],
                expected: "An 'incorrect username or password' message is shown and the user stays signed out",
                priority: Priority::P0,
                test_type: TestType::Functional,
            },
            CaseTemplate {
                title: "Validate empty username and password fields",
                steps: &[
                    "Open the login page",
                    "Leave both fields empty",
                    "Click the sign-in button",
                ],
                expected: "Inline validation marks both fields as required",
                priority: Priority::P1,
                test_type: TestType::Functional,
            },
            CaseTemplate {
                title: "Lock the account after repeated failures",
                steps: &[
                    "Open the login page",
                    "Submit a wrong password five times in a row",
                    "Submit the correct password",
                ],
                expected: "The account is temporarily locked and a notice explains how to unlock it",
                priority: Priority::P1,
                test_type: TestType::Functional,
            },
        ],
    },
    Feature {
        module: "Registration",
        keywords: &["register", "sign up", "signup", "注册"],
        cases: &[
            CaseTemplate {
                title: "Register a new account with valid details",
                steps: &[
                    "Open the registration page",
                    "Fill in username, email and password",
                    "Submit the form",
                    "Open the verification email and follow the link",
                ],
                expected: "The account is created and verified",
                priority: Priority::P0,
                test_type: TestType::Functional,
            },
            CaseTemplate {
                title: "Reject an email address that is already registered",
                steps: &[
                    "Open the registration page",
                    "Enter an email that belongs to an existing account",
                    "Submit the form",
                ],
                expected: "The form reports that the email is already in use",
                priority: Priority::P1,
                test_type: TestType::Functional,
            },
        ],
    },
    Feature {
        module: "Search",
        keywords: &["search", "query", "filter", "搜索", "查询"],
        cases: &[
            CaseTemplate {
                title: "Search by keyword returns matching results",
                steps: &[
                    "Open the search page",
                    "Enter a keyword with known matches",
                    "Press enter",
                ],
                expected: "Every listed result contains the keyword",
                priority: Priority::P1,
                test_type: TestType::Functional,
            },
            CaseTemplate {
                title: "Search responds within two seconds",
                steps: &[
                    "Open the search page",
                    "Enter a broad keyword",
                    "Measure the time until results render",
                ],
                expected: "Results render in under two seconds",
                priority: Priority::P2,
                test_type: TestType::Performance,
            },
        ],
    },
    Feature {
        module: "Payment",
        keywords: &["pay", "payment", "checkout", "order", "支付", "订单"],
        cases: &[
            CaseTemplate {
                title: "Complete checkout with a valid card",
                steps: &[
                    "Add an item to the cart",
                    "Proceed to checkout",
                    "Enter valid card details",
                    "Confirm the payment",
                ],
                expected: "The order is created and a receipt is shown",
                priority: Priority::P0,
                test_type: TestType::Functional,
            },
            CaseTemplate {
                title: "Decline an expired card",
                steps: &[
                    "Proceed to checkout",
                    "Enter an expired card",
                    "Confirm the payment",
                ],
                expected: "The payment is declined and no order is created",
                priority: Priority::P1,
                test_type: TestType::Functional,
            },
        ],
    },
    Feature {
        module: "Profile",
        keywords: &["profile", "account settings", "avatar", "个人", "资料"],
        cases: &[CaseTemplate {
            title: "Update profile details",
            steps: &[
                "Open profile settings",
                "Change the display name",
                "Save the changes",
                "Reload the page",
            ],
            expected: "The new display name persists after reload",
            priority: Priority::P2,
            test_type: TestType::Functional,
        }],
    },
];

/// Whether `text` mentions `keyword`.
///
/// ASCII keywords must stand as whole words (a trailing plural `s` is
/// allowed), so "pay" does not match "display". Other scripts have no word
/// separators and match anywhere.
fn mentions(text: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return text.contains(keyword);
    }
    let is_word = |c: char| c.is_ascii_alphanumeric();
    text.match_indices(keyword).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let mut after = text[start + keyword.len()..].chars();
        let next = match after.next() {
            Some('s') => after.next(),
            other => other,
        };
        !before.is_some_and(is_word) && !next.is_some_and(is_word)
    })
}

/// Keyword-driven synthesizer with fixed templates.
pub struct TemplateSynthesizer {
    prefix: String,
    max_cases: usize,
}

impl TemplateSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            prefix: config.case_prefix.clone(),
            max_cases: config.max_cases.max(1),
        }
    }

    fn draft(
        module: &str,
        title: String,
        steps: Vec<String>,
        expected: String,
        priority: Priority,
        test_type: TestType,
    ) -> TestCase {
        TestCase {
            id: Uuid::new_v4().to_string(),
            case_number: String::new(),
            module: module.to_string(),
            title,
            steps,
            expected_result: expected,
            priority,
            test_type,
        }
    }

    fn from_template(module: &str, template: &CaseTemplate) -> TestCase {
        Self::draft(
            module,
            template.title.to_string(),
            template.steps.iter().map(|s| s.to_string()).collect(),
            template.expected.to_string(),
            template.priority,
            template.test_type,
        )
    }

    fn feature_cases(text: &str) -> Vec<TestCase> {
        FEATURES
            .iter()
            .filter(|f| f.keywords.iter().any(|k| mentions(text, k)))
            .flat_map(|f| f.cases.iter().map(|t| Self::from_template(f.module, t)))
            .collect()
    }

    fn generic_cases(requirement: &str) -> Vec<TestCase> {
        let subject: String = requirement.trim().chars().take(40).collect();
        vec![
            Self::draft(
                "General",
                format!("Happy path: {}", subject),
                vec![
                    "Prepare valid input data".to_string(),
                    format!("Perform the flow described as: {}", subject),
                    "Observe the result".to_string(),
                ],
                "The flow completes without errors".to_string(),
                Priority::P0,
                TestType::Functional,
            ),
            Self::draft(
                "General",
                format!("Boundary values: {}", subject),
                vec![
                    "Prepare minimum and maximum allowed inputs".to_string(),
                    "Run the flow with each boundary value".to_string(),
                ],
                "Boundary inputs are accepted; values just outside are rejected".to_string(),
                Priority::P1,
                TestType::Functional,
            ),
            Self::draft(
                "General",
                format!("Invalid input handling: {}", subject),
                vec![
                    "Submit malformed input".to_string(),
                    "Check the error feedback".to_string(),
                ],
                "A clear error is shown and no data is changed".to_string(),
                Priority::P1,
                TestType::Functional,
            ),
            Self::draft(
                "General",
                format!("Response time under load: {}", subject),
                vec![
                    "Simulate 50 concurrent users".to_string(),
                    "Measure the response time of the flow".to_string(),
                ],
                "95th percentile response time stays under three seconds".to_string(),
                Priority::P2,
                TestType::Performance,
            ),
        ]
    }

    fn page_cases(pages: &PageSelection) -> Vec<TestCase> {
        let mut cases: Vec<TestCase> = pages
            .selected
            .iter()
            .map(|page| {
                let is_primary = pages.primary.as_ref().is_some_and(|p| p.id == page.id);
                Self::draft(
                    &page.label,
                    format!("{} renders correctly", page.label),
                    vec![
                        format!("Open the {}", page.label.to_lowercase()),
                        "Compare the layout against the design".to_string(),
                        "Resize the window to tablet and phone widths".to_string(),
                    ],
                    "All elements are visible, aligned and readable at every width".to_string(),
                    if is_primary { Priority::P1 } else { Priority::P2 },
                    TestType::Ui,
                )
            })
            .collect();

        if let Some(primary) = &pages.primary {
            cases.push(Self::draft(
                &primary.label,
                format!("{} works across browsers", primary.label),
                vec![
                    format!("Open the {} in Chrome", primary.label.to_lowercase()),
                    "Repeat in Firefox and Safari".to_string(),
                ],
                "Behaviour and layout match in every browser".to_string(),
                Priority::P3,
                TestType::Compatibility,
            ));
        }
        cases
    }

    fn revision_cases(revisions: &[String]) -> Vec<TestCase> {
        revisions
            .iter()
            .map(|note| {
                Self::draft(
                    "Revision",
                    format!("Additional coverage: {}", note.trim()),
                    vec![
                        format!("Set up the scenario: {}", note.trim()),
                        "Execute the scenario".to_string(),
                        "Record the observed behaviour".to_string(),
                    ],
                    "Behaviour matches the revised requirement".to_string(),
                    Priority::P2,
                    TestType::Functional,
                )
            })
            .collect()
    }
}

impl CaseSynthesizer for TemplateSynthesizer {
    fn name(&self) -> &str {
        "template"
    }

    fn synthesize(&self, context: &SynthesisContext) -> Result<Vec<TestCase>> {
        if context.requirement.trim().is_empty() {
            return Err(Error::Synthesis(
                "no requirement has been described yet".to_string(),
            ));
        }

        let mut cases = Self::feature_cases(&context.searchable_text());
        if cases.is_empty() {
            cases = Self::generic_cases(&context.requirement);
        }
        cases.extend(Self::page_cases(&context.pages));
        cases.extend(Self::revision_cases(&context.revisions));

        // Keep the newest revisions when trimming: they were asked for last.
        if cases.len() > self.max_cases {
            let revision_count = context.revisions.len().min(self.max_cases);
            let base_len = self.max_cases - revision_count;
            let revisions = cases.split_off(cases.len() - revision_count);
            cases.truncate(base_len);
            cases.extend(revisions);
        }

        for (index, case) in cases.iter_mut().enumerate() {
            case.case_number = format_case_number(&self.prefix, index as u32 + 1);
        }

        tracing::debug!(
            synthesizer = self.name(),
            cases = cases.len(),
            revisions = context.revisions.len(),
            "Synthesized test cases"
        );
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidatePage;
    use std::collections::HashSet;

    fn synthesizer() -> TemplateSynthesizer {
        TemplateSynthesizer::new(&SynthesisConfig::default())
    }

    fn page(id: &str, label: &str) -> CandidatePage {
        CandidatePage {
            id: id.to_string(),
            label: label.to_string(),
            description: String::new(),
            is_primary: false,
        }
    }

    #[test]
    fn test_login_requirement_yields_login_cases() {
        let ctx = SynthesisContext::new("登录功能需要测试用户名密码校验");
        let cases = synthesizer().synthesize(&ctx).unwrap();

        assert!(!cases.is_empty());
        assert!(cases.iter().all(|c| c.module == "Login"));
        assert_eq!(cases[0].case_number, "TC001");
        assert_eq!(cases[0].priority, Priority::P0);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        assert!(mentions("users pay by card", "pay"));
        assert!(mentions("list past orders", "order"));
        assert!(mentions("wrong passwords", "password"));
        assert!(mentions("log in, then check out", "log in"));
        assert!(!mentions("display an error", "pay"));
        assert!(!mentions("a red border", "order"));
        assert!(!mentions("prepayment", "pay"));
        assert!(mentions("需要登录", "登录"));
    }

    #[test]
    fn test_display_answer_does_not_pull_in_payment() {
        let mut ctx = SynthesisContext::new("Users sign in with a password");
        ctx.answers.push("Display an error under the border".to_string());
        let cases = synthesizer().synthesize(&ctx).unwrap();

        assert!(cases.iter().any(|c| c.module == "Login"));
        assert!(cases.iter().all(|c| c.module != "Payment"));
    }

    #[test]
    fn test_case_numbers_unique_and_padded() {
        let mut ctx = SynthesisContext::new("login and search and checkout");
        ctx.answers.push("also the profile page".to_string());
        let cases = synthesizer().synthesize(&ctx).unwrap();

        let numbers: HashSet<_> = cases.iter().map(|c| c.case_number.as_str()).collect();
        assert_eq!(numbers.len(), cases.len());
        assert!(cases
            .iter()
            .all(|c| c.case_number.len() == 5 && c.case_number.starts_with("TC")));
    }

    #[test]
    fn test_unknown_requirement_falls_back_to_generic() {
        let ctx = SynthesisContext::new("export monthly invoices to spreadsheet");
        let cases = synthesizer().synthesize(&ctx).unwrap();
        assert_eq!(cases.len(), 4);
        assert!(cases[0].title.starts_with("Happy path:"));
        assert!(cases.iter().any(|c| c.test_type == TestType::Performance));
    }

    #[test]
    fn test_pages_and_revisions_add_cases() {
        let mut ctx = SynthesisContext::new("export invoices");
        let login = page("login", "Login page");
        ctx.pages = PageSelection {
            selected: vec![login.clone(), page("home", "Home dashboard")],
            primary: Some(login),
        };
        ctx.revisions.push("cover the CSV encoding".to_string());

        let cases = synthesizer().synthesize(&ctx).unwrap();
        let ui: Vec<_> = cases.iter().filter(|c| c.test_type == TestType::Ui).collect();
        assert_eq!(ui.len(), 2);
        assert_eq!(ui[0].priority, Priority::P1);
        assert!(cases.iter().any(|c| c.test_type == TestType::Compatibility));
        assert_eq!(
            cases.last().unwrap().title,
            "Additional coverage: cover the CSV encoding"
        );
    }

    #[test]
    fn test_trimming_keeps_revisions() {
        let synth = TemplateSynthesizer::new(&SynthesisConfig {
            case_prefix: "TC".to_string(),
            max_cases: 3,
        });
        let mut ctx = SynthesisContext::new("login flow");
        ctx.revisions.push("check remember-me".to_string());

        let cases = synth.synthesize(&ctx).unwrap();
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[2].module, "Revision");
        assert_eq!(cases[2].case_number, "TC003");
    }

    #[test]
    fn test_empty_requirement_fails() {
        let ctx = SynthesisContext::new("   ");
        assert!(matches!(
            synthesizer().synthesize(&ctx),
            Err(Error::Synthesis(_))
        ));
    }
}
