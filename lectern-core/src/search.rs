use std::ops::Range;

use tracing::debug;

use crate::{PageNumber, PageTextIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// All matches on one page: zero-based character offsets of each match
/// start within the page's indexed text, ascending and non-overlapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMatches {
    pub page: PageNumber,
    pub offsets: Vec<usize>,
}

/// One submitted query and its results, replaced wholesale by the next
/// submission. The navigation cursor is absent while there are no results.
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    query: String,
    results: Vec<PageMatches>,
    current: usize,
}

impl SearchSession {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Case-insensitive literal substring search over every indexed page.
    /// An empty query or an empty index yields an empty session, never an
    /// error. Occurrences are collected left-to-right and a scan resumes
    /// after the end of the previous match, so matches never overlap.
    pub fn search(query: &str, index: &PageTextIndex) -> Self {
        if query.is_empty() || index.is_empty() {
            return Self::empty();
        }

        let mut results = Vec::new();
        for (page, text) in index.pages() {
            let offsets: Vec<usize> = occurrences(text, query)
                .into_iter()
                .map(|occurrence| occurrence.char_start)
                .collect();
            if !offsets.is_empty() {
                results.push(PageMatches { page, offsets });
            }
        }

        debug!(query, pages = results.len(), "search completed");
        Self {
            query: query.to_string(),
            results,
            current: 0,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[PageMatches] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        if self.results.is_empty() {
            None
        } else {
            Some(self.current)
        }
    }

    /// Page of the currently selected result, or `None` on an empty session.
    pub fn current_page(&self) -> Option<PageNumber> {
        self.results.get(self.current).map(|matches| matches.page)
    }

    /// Moves the cursor one result forward or back, wrapping in both
    /// directions, and reports the newly selected page. No-op on an empty
    /// session.
    pub fn navigate(&mut self, direction: Direction) -> Option<PageNumber> {
        if self.results.is_empty() {
            return None;
        }
        let len = self.results.len();
        self.current = match direction {
            Direction::Next => (self.current + 1) % len,
            Direction::Prev => (self.current + len - 1) % len,
        };
        self.current_page()
    }
}

/// A single located occurrence: its character offset within the haystack
/// and the byte range it occupies, for slicing the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Occurrence {
    pub char_start: usize,
    pub byte_range: Range<usize>,
}

/// Finds every case-insensitive occurrence of `needle` in `haystack`,
/// left-to-right and non-overlapping. The needle is a literal substring;
/// case folding is the only normalization applied.
pub(crate) fn occurrences(haystack: &str, needle: &str) -> Vec<Occurrence> {
    let mut found = Vec::new();
    if needle.is_empty() {
        return found;
    }
    let needle_lower: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    let chars: Vec<(usize, char)> = haystack.char_indices().collect();

    let mut at = 0;
    while at < chars.len() {
        match match_len_at(&chars, at, &needle_lower) {
            Some(consumed) => {
                let byte_start = chars[at].0;
                let byte_end = chars
                    .get(at + consumed)
                    .map_or(haystack.len(), |&(offset, _)| offset);
                found.push(Occurrence {
                    char_start: at,
                    byte_range: byte_start..byte_end,
                });
                at += consumed;
            }
            None => at += 1,
        }
    }
    found
}

/// Number of haystack characters consumed by a match starting at `at`, or
/// `None` if the needle does not match there. Comparison runs over the
/// lowercase expansion of each character, so one-to-many case mappings are
/// handled; a needle ending mid-expansion is not a match.
fn match_len_at(chars: &[(usize, char)], at: usize, needle_lower: &[char]) -> Option<usize> {
    let mut needle_pos = 0;
    let mut consumed = 0;
    for &(_, c) in &chars[at..] {
        for lowered in c.to_lowercase() {
            if needle_pos >= needle_lower.len() || lowered != needle_lower[needle_pos] {
                return None;
            }
            needle_pos += 1;
        }
        consumed += 1;
        if needle_pos == needle_lower.len() {
            return Some(consumed);
        }
    }
    None
}
