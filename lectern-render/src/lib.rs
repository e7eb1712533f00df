//! Plain-text rendering collaborator: paginates a text file and
//! materializes one presentation root per page, one text-bearing leaf per
//! line. Documents exported with form-feed page separators keep their
//! original pagination; anything else is chunked by line count.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lectern_core::{
    document_id_for_path, DocumentInfo, DocumentProvider, PageNumber, PageRenderer, PageRoot,
    PageRootHandle,
};
use parking_lot::Mutex;
use tracing::{debug, instrument};

const DEFAULT_LINES_PER_PAGE: usize = 40;

/// Mounted roots kept per document. Stale handles evicted here are safe:
/// highlight operations on them are idempotent and tag-scoped.
const ROOT_CACHE_CAPACITY: usize = 8;

pub struct TextRenderFactory {
    lines_per_page: usize,
}

impl TextRenderFactory {
    pub fn new() -> Self {
        Self {
            lines_per_page: DEFAULT_LINES_PER_PAGE,
        }
    }

    pub fn with_lines_per_page(lines_per_page: usize) -> Self {
        Self {
            lines_per_page: lines_per_page.max(1),
        }
    }
}

impl Default for TextRenderFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentProvider for TextRenderFactory {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Arc<dyn PageRenderer>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let content = std::fs::read_to_string(&absolute)
            .with_context(|| format!("failed to read {:?}", absolute))?;
        let pages = paginate(&content, self.lines_per_page);

        let title = absolute
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("<unknown>")
            .to_string();
        let info = DocumentInfo {
            id: document_id_for_path(&absolute),
            path: absolute,
            title,
            page_count: pages.len(),
        };
        debug!(title = %info.title, pages = info.page_count, "text document opened");

        Ok(Arc::new(TextDocument {
            info,
            pages,
            roots: Mutex::new(HashMap::new()),
        }))
    }
}

struct TextDocument {
    info: DocumentInfo,
    pages: Vec<Vec<String>>,
    roots: Mutex<HashMap<PageNumber, PageRootHandle>>,
}

impl TextDocument {
    fn page_lines(&self, page: PageNumber) -> Result<&[String]> {
        self.pages
            .get(page.wrapping_sub(1))
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("page {} out of range", page))
    }

    fn store_root(&self, page: PageNumber, root: &PageRootHandle) {
        let mut roots = self.roots.lock();
        roots.insert(page, Arc::clone(root));

        if roots.len() > ROOT_CACHE_CAPACITY {
            let mut pages: Vec<PageNumber> = roots.keys().copied().collect();
            pages.sort_by_key(|mounted| mounted.abs_diff(page));
            for stale in pages.into_iter().skip(ROOT_CACHE_CAPACITY) {
                roots.remove(&stale);
            }
        }
    }
}

#[async_trait]
impl PageRenderer for TextDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    async fn page_text(&self, page: PageNumber) -> Result<String> {
        Ok(self.page_lines(page)?.join("\n"))
    }

    fn presentation_root(&self, page: PageNumber) -> Option<PageRootHandle> {
        self.roots.lock().get(&page).cloned()
    }

    fn render_page(&self, page: PageNumber) -> Result<PageRootHandle> {
        if let Some(root) = self.presentation_root(page) {
            return Ok(root);
        }
        let lines = self.page_lines(page)?.to_vec();
        let root: PageRootHandle = Arc::new(Mutex::new(PageRoot::from_lines(lines)));
        self.store_root(page, &root);
        Ok(root)
    }
}

/// Splits document content into pages of lines. Form feeds win when
/// present; otherwise fixed-size line chunks. Every document has at least
/// one page, so an empty file still renders.
fn paginate(content: &str, lines_per_page: usize) -> Vec<Vec<String>> {
    let pages: Vec<Vec<String>> = if content.contains('\u{c}') {
        let mut pages: Vec<Vec<String>> = content
            .split('\u{c}')
            .map(|page| page.lines().map(str::to_string).collect())
            .collect();
        // A trailing form feed is a page terminator, not an empty page.
        if pages.len() > 1 && pages.last().is_some_and(|page| page.is_empty()) {
            pages.pop();
        }
        pages
    } else {
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        lines
            .chunks(lines_per_page.max(1))
            .map(<[String]>::to_vec)
            .collect()
    };

    if pages.is_empty() {
        vec![Vec::new()]
    } else {
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginates_on_form_feeds() {
        let pages = paginate("one\ntwo\u{c}three\u{c}four\n", 40);
        assert_eq!(
            pages,
            vec![
                vec!["one".to_string(), "two".to_string()],
                vec!["three".to_string()],
                vec!["four".to_string()],
            ]
        );
    }

    #[test]
    fn trailing_form_feed_does_not_add_an_empty_page() {
        let pages = paginate("one\u{c}two\u{c}", 40);
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn paginates_by_line_count_without_form_feeds() {
        let content = (1..=5).map(|n| format!("line {n}\n")).collect::<String>();
        let pages = paginate(&content, 2);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], vec!["line 1".to_string(), "line 2".to_string()]);
        assert_eq!(pages[2], vec!["line 5".to_string()]);
    }

    #[test]
    fn empty_content_still_has_one_page() {
        assert_eq!(paginate("", 40), vec![Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn open_exposes_text_and_roots_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "The quick brown fox\u{c}jumps over\nthe lazy dog").unwrap();

        let factory = TextRenderFactory::new();
        let doc = factory.open(&path).await.unwrap();

        assert_eq!(doc.info().page_count, 2);
        assert_eq!(doc.info().title, "doc.txt");
        assert_eq!(doc.page_text(1).await.unwrap(), "The quick brown fox");
        assert_eq!(doc.page_text(2).await.unwrap(), "jumps over\nthe lazy dog");
        assert!(doc.page_text(3).await.is_err());

        assert!(doc.presentation_root(1).is_none());
        let root = doc.render_page(1).unwrap();
        assert_eq!(root.lock().plain_text(), "The quick brown fox");
        // One leaf per line on the second page.
        let second = doc.render_page(2).unwrap();
        assert_eq!(second.lock().leaves().len(), 2);
    }

    #[tokio::test]
    async fn render_page_returns_the_mounted_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "only page").unwrap();

        let doc = TextRenderFactory::new().open(&path).await.unwrap();
        let first = doc.render_page(1).unwrap();
        let second = doc.render_page(1).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(doc.presentation_root(1).is_some());
    }

    #[tokio::test]
    async fn distant_roots_are_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let content = (1..=20).map(|n| format!("line {n}\n")).collect::<String>();
        std::fs::write(&path, content).unwrap();

        let doc = TextRenderFactory::with_lines_per_page(1)
            .open(&path)
            .await
            .unwrap();
        assert_eq!(doc.info().page_count, 20);

        for page in 1..=20 {
            doc.render_page(page).unwrap();
        }

        // The most recently rendered page is always mounted; the earliest
        // pages have been evicted.
        assert!(doc.presentation_root(20).is_some());
        assert!(doc.presentation_root(1).is_none());
    }
}
