//! In-memory test case collection edited during review
//!
//! The repository does not know about phases; [`crate::Conversation`] gates
//! every mutation on [`crate::Phase::Review`] before it reaches this type.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::{CasePatch, TestCase};

/// Format a case number as `{prefix}{ordinal:03}`, e.g. `TC007`.
pub fn format_case_number(prefix: &str, ordinal: u32) -> String {
    format!("{}{:03}", prefix, ordinal)
}

/// Ordered, uniquely numbered test cases.
#[derive(Debug, Clone)]
pub struct CaseRepository {
    prefix: String,
    cases: Vec<TestCase>,
    /// Highest ordinal handed out since the last replace; freed numbers are
    /// not minted again
    high_water: u32,
}

impl CaseRepository {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            cases: Vec::new(),
            high_water: 0,
        }
    }

    pub fn list(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Look a case up by id or by case number
    pub fn find(&self, id_or_number: &str) -> Option<&TestCase> {
        self.cases
            .iter()
            .find(|c| c.id == id_or_number || c.case_number == id_or_number)
    }

    /// Owned copy of the current cases, used to freeze a run
    pub fn snapshot(&self) -> Vec<TestCase> {
        self.cases.clone()
    }

    /// Replace every case at once. Nothing changes if the batch is empty or
    /// carries duplicate numbers or ids.
    pub fn replace_all(&mut self, cases: Vec<TestCase>) -> Result<()> {
        if cases.is_empty() {
            return Err(Error::Synthesis("synthesizer returned no cases".to_string()));
        }

        let mut numbers = HashSet::new();
        let mut ids = HashSet::new();
        for case in &cases {
            if case.case_number.trim().is_empty() {
                return Err(Error::Synthesis(format!(
                    "case {} has no case number",
                    case.id
                )));
            }
            if !numbers.insert(case.case_number.as_str()) {
                return Err(Error::Synthesis(format!(
                    "duplicate case number {}",
                    case.case_number
                )));
            }
            if !ids.insert(case.id.as_str()) {
                return Err(Error::Synthesis(format!("duplicate case id {}", case.id)));
            }
        }

        self.high_water = cases
            .iter()
            .filter_map(|c| self.ordinal_of(&c.case_number))
            .max()
            .unwrap_or(0);
        self.cases = cases;
        Ok(())
    }

    /// Insert a blank case with a freshly minted number.
    pub fn add(&mut self) -> TestCase {
        let number = self.mint_number();
        let case = TestCase::blank(number);
        self.cases.push(case.clone());
        case
    }

    /// Apply a patch to the case with the given id.
    pub fn update(&mut self, id: &str, patch: CasePatch) -> Result<TestCase> {
        let case = self
            .cases
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::CaseNotFound(id.to_string()))?;
        patch.apply(case);
        Ok(case.clone())
    }

    /// Remove the case with the given id.
    pub fn remove(&mut self, id: &str) -> Result<TestCase> {
        let index = self
            .cases
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| Error::CaseNotFound(id.to_string()))?;
        Ok(self.cases.remove(index))
    }

    pub fn clear(&mut self) {
        self.cases.clear();
        self.high_water = 0;
    }

    fn ordinal_of(&self, case_number: &str) -> Option<u32> {
        case_number.strip_prefix(&self.prefix)?.parse().ok()
    }

    fn mint_number(&mut self) -> String {
        let mut ordinal = self
            .cases
            .iter()
            .filter_map(|c| self.ordinal_of(&c.case_number))
            .max()
            .unwrap_or(0)
            .max(self.high_water);

        // Numbers that do not follow the prefix scheme can still collide.
        loop {
            ordinal += 1;
            let candidate = format_case_number(&self.prefix, ordinal);
            if !self.cases.iter().any(|c| c.case_number == candidate) {
                self.high_water = ordinal;
                return candidate;
            }
        }
    }
}
