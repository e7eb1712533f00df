use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::PageNumber;

/// A page's extracted text was ingested twice within one document load.
/// The rendering collaborator is contracted to produce each page exactly
/// once, so the second ingestion is rejected rather than overwritten.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("text for page {page} ingested twice")]
pub struct DuplicateIngestError {
    pub page: PageNumber,
}

/// Per-page extracted text, built incrementally while a document loads and
/// discarded when it closes. Entries are immutable once written.
#[derive(Debug, Default)]
pub struct PageTextIndex {
    pages: BTreeMap<PageNumber, String>,
}

impl PageTextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, page: PageNumber, text: String) -> Result<(), DuplicateIngestError> {
        if self.pages.contains_key(&page) {
            return Err(DuplicateIngestError { page });
        }
        debug!(page, chars = text.chars().count(), "page text indexed");
        self.pages.insert(page, text);
        Ok(())
    }

    /// Stored text for a page, or `None` while the page is not yet indexed.
    /// Never blocks; a search issued mid-load simply sees fewer pages.
    pub fn get(&self, page: PageNumber) -> Option<&str> {
        self.pages.get(&page).map(String::as_str)
    }

    /// Indexed pages in ascending page order.
    pub fn pages(&self) -> impl Iterator<Item = (PageNumber, &str)> {
        self.pages.iter().map(|(page, text)| (*page, text.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
