use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use uuid::Uuid;

mod highlight;
mod index;
mod reader;
mod search;
mod store;
mod tree;

pub use highlight::{HighlightChannel, HighlightCoordinator, BOOKMARK_CHANNEL, SEARCH_CHANNEL};
pub use index::{DuplicateIngestError, PageTextIndex};
pub use reader::{Command, ReaderController, ReaderEvent, SearchSummary};
pub use search::{Direction, PageMatches, SearchSession};
pub use store::{
    Bookmark, BookmarkProvider, FileBookmarkStore, FileProgressStore, MemoryProgressStore,
    ProgressStore, ReadingProgress,
};
pub use tree::{Fragment, PageRoot, TextLeaf};

pub type DocumentId = Uuid;

/// Page numbers are 1-based throughout, matching how persisted reading
/// progress and bookmarks count pages.
pub type PageNumber = usize;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("4c1f7d2e-8b4a-5f3d-9c6b-21d0a8e5b7f4").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub title: String,
    pub page_count: usize,
}

/// Shared handle to one page's presentation root. The rendering collaborator
/// owns the root's lifecycle; the highlight machinery only ever mutates
/// fragments it tagged itself.
pub type PageRootHandle = Arc<Mutex<PageRoot>>;

/// The rendering collaborator for one open document: produces per-page
/// extractable text and materializes presentation roots on demand.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    /// Extracted text for one page. Awaited one page at a time during
    /// document load; see [`ReaderController::ingest_all`].
    async fn page_text(&self, page: PageNumber) -> Result<String>;

    /// Root for a page that has already been rendered, or `None` when the
    /// page is not currently mounted.
    fn presentation_root(&self, page: PageNumber) -> Option<PageRootHandle>;

    /// Materializes (or returns the cached) presentation root for a page.
    /// The caller signals render completion to the reader afterwards.
    fn render_page(&self, page: PageNumber) -> Result<PageRootHandle>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn PageRenderer>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_stable_for_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("sample.txt");
        std::fs::write(&file_path, b"dummy").unwrap();

        let first = document_id_for_path(&file_path);
        let second = document_id_for_path(&file_path);

        assert_eq!(first, second);
    }
}
