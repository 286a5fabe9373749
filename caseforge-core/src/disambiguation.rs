//! Candidate page selection
//!
//! On the first user turn the conversation pauses and asks which application
//! screens the requirement touches. The user may pick any number of pages and
//! mark one as primary, then confirm or cancel. This module only gathers that
//! context; deciding when the dialogue has enough information is left to
//! [`crate::dialogue`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{CandidatePage, PendingDisambiguation};

/// Confirmed page context handed to the synthesizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelection {
    pub selected: Vec<CandidatePage>,
    pub primary: Option<CandidatePage>,
}

impl PageSelection {
    /// Deterministic one-line summary: count selected plus the primary page.
    pub fn summary(&self) -> String {
        let count = self.selected.len();
        let noun = if count == 1 { "page" } else { "pages" };
        match &self.primary {
            Some(primary) => format!(
                "Selected {} {}; primary page: {}.",
                count, noun, primary.label
            ),
            None => format!("Selected {} {}.", count, noun),
        }
    }
}

/// Holds the page prompt while it is open.
#[derive(Debug, Default)]
pub struct Disambiguator {
    /// Pages as presented, used to undo primary marks on cancel
    presented: Vec<CandidatePage>,
    pages: Vec<CandidatePage>,
    selected: Vec<String>,
    open: bool,
}

impl Disambiguator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.open
    }

    /// Open the prompt with the given candidates. At most one may arrive
    /// marked primary; extra marks are cleared and the kept one starts selected.
    pub fn present(&mut self, mut pages: Vec<CandidatePage>) -> PendingDisambiguation {
        let mut primary_seen = false;
        for page in &mut pages {
            if page.is_primary && !primary_seen {
                primary_seen = true;
            } else {
                page.is_primary = false;
            }
        }

        self.selected = pages
            .iter()
            .filter(|p| p.is_primary)
            .map(|p| p.id.clone())
            .collect();
        self.presented = pages.clone();
        self.pages = pages;
        self.open = true;

        tracing::debug!(candidates = self.pages.len(), "Presented candidate pages");
        self.snapshot()
    }

    /// Current prompt state, if open
    pub fn pending(&self) -> Option<PendingDisambiguation> {
        self.open.then(|| self.snapshot())
    }

    pub fn pages(&self) -> &[CandidatePage] {
        &self.pages
    }

    /// Replace the selection. Duplicate ids collapse; unknown ids are rejected
    /// without touching the current selection. A primary page left out of the
    /// new selection loses its mark.
    pub fn select(&mut self, ids: &[String]) -> Result<()> {
        self.ensure_open()?;
        let mut next: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.pages.iter().any(|p| &p.id == id) {
                return Err(Error::PageNotFound(id.clone()));
            }
            if !next.contains(id) {
                next.push(id.clone());
            }
        }
        for page in &mut self.pages {
            if page.is_primary && !next.contains(&page.id) {
                page.is_primary = false;
            }
        }
        self.selected = next;
        Ok(())
    }

    /// Mark one page primary, clearing every other mark. The page joins the
    /// selection if it was not already in it.
    pub fn set_primary(&mut self, id: &str) -> Result<()> {
        self.ensure_open()?;
        if !self.pages.iter().any(|p| p.id == id) {
            return Err(Error::PageNotFound(id.to_string()));
        }
        for page in &mut self.pages {
            page.is_primary = page.id == id;
        }
        if !self.selected.iter().any(|s| s == id) {
            self.selected.push(id.to_string());
        }
        Ok(())
    }

    /// Close the prompt and return the confirmed context.
    pub fn confirm(&mut self) -> Result<PageSelection> {
        self.ensure_open()?;
        let selected: Vec<CandidatePage> = self
            .selected
            .iter()
            .filter_map(|id| self.pages.iter().find(|p| &p.id == id).cloned())
            .collect();
        let primary = self.pages.iter().find(|p| p.is_primary).cloned();
        self.open = false;

        let selection = PageSelection { selected, primary };
        tracing::info!(
            selected = selection.selected.len(),
            primary = selection.primary.as_ref().map(|p| p.id.as_str()).unwrap_or(""),
            "Page selection confirmed"
        );
        Ok(selection)
    }

    /// Close the prompt without keeping any selection or primary mark.
    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.pages = self.presented.clone();
        self.selected.clear();
        self.open = false;
        tracing::info!("Page selection cancelled");
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::NoPendingSelection)
        }
    }

    fn snapshot(&self) -> PendingDisambiguation {
        PendingDisambiguation {
            candidates: self.pages.clone(),
            selected: self.selected.clone(),
        }
    }
}
