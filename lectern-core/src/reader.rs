use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::{
    Bookmark, Direction, DocumentInfo, DocumentProvider, HighlightCoordinator, PageNumber,
    PageRenderer, PageTextIndex, ProgressStore, ReadingProgress, SearchSession, BOOKMARK_CHANNEL,
    SEARCH_CHANNEL,
};

#[derive(Debug, Clone)]
pub enum Command {
    NextPage,
    PrevPage,
    GotoPage { page: PageNumber },
    Search { query: String },
    SearchNext,
    SearchPrev,
    ClearSearch,
    ActivateBookmark { bookmark: Bookmark },
    SaveProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// The displayed page changed; the caller should render the new page
    /// and signal render completion back to the reader.
    PageChanged(PageNumber),
    /// Highlight or status state changed on the current page.
    RedrawNeeded,
}

/// Search state condensed for a status line: the query, how many pages
/// matched, and the ordinal of the selected result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSummary {
    pub query: String,
    pub total: usize,
    pub current_index: Option<usize>,
}

/// Owns the reader's explicit state (current page, text index, search
/// session, highlight coordinator) and wires commands to the engine. All
/// page-rendering and persistence work stays with the collaborators.
pub struct ReaderController {
    renderer: Arc<dyn PageRenderer>,
    store: Arc<dyn ProgressStore>,
    index: PageTextIndex,
    session: SearchSession,
    coordinator: HighlightCoordinator,
    current_page: PageNumber,
    events: Vec<ReaderEvent>,
}

impl ReaderController {
    /// Opens a document through the provider and restores saved reading
    /// progress. A never-opened document starts on page 1 and reports that
    /// immediately, so it shows up in the library with progress attached.
    #[instrument(skip(provider, store))]
    pub async fn open_with<P: DocumentProvider>(
        provider: &P,
        path: PathBuf,
        store: Arc<dyn ProgressStore>,
    ) -> Result<Self> {
        let renderer = provider.open(&path).await?;
        let info = renderer.info().clone();

        let current_page = match store.load(&info)? {
            Some(progress) => progress.current_page.clamp(1, info.page_count.max(1)),
            None => {
                store.save(&info, &ReadingProgress::start_of(&info))?;
                1
            }
        };

        Ok(Self {
            renderer,
            store,
            index: PageTextIndex::new(),
            session: SearchSession::empty(),
            coordinator: HighlightCoordinator::new(current_page),
            current_page,
            events: Vec::new(),
        })
    }

    /// Ingests every page's text in ascending order, one page at a time.
    /// Dropping the returned future abandons the remaining pages; searches
    /// issued mid-load see only what has been ingested so far.
    #[instrument(skip(self))]
    pub async fn ingest_all(&mut self) -> Result<()> {
        let page_count = self.renderer.info().page_count;
        for page in 1..=page_count {
            let text = self.renderer.page_text(page).await?;
            self.index.ingest(page, text)?;
        }
        debug!(page_count, "document text fully indexed");
        Ok(())
    }

    pub fn info(&self) -> &DocumentInfo {
        self.renderer.info()
    }

    /// The rendering collaborator, for callers that drive page rendering
    /// and feed the render-complete signal back in.
    pub fn renderer(&self) -> &Arc<dyn PageRenderer> {
        &self.renderer
    }

    pub fn current_page(&self) -> PageNumber {
        self.current_page
    }

    pub fn index(&self) -> &PageTextIndex {
        &self.index
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn search_summary(&self) -> Option<SearchSummary> {
        if self.session.query().is_empty() {
            return None;
        }
        Some(SearchSummary {
            query: self.session.query().to_string(),
            total: self.session.results().len(),
            current_index: self.session.current_index(),
        })
    }

    /// Pending UI events, in the order they were produced.
    pub fn take_events(&mut self) -> Vec<ReaderEvent> {
        std::mem::take(&mut self.events)
    }

    /// Render-completion signal from the rendering collaborator. Forwards
    /// the page's root (if still mounted) to the coordinator, which
    /// reconciles channel markup only when the page is still current.
    pub fn on_render_complete(&mut self, page: PageNumber) {
        let root = self.renderer.presentation_root(page);
        self.coordinator.on_render_complete(page, root.as_ref());
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::NextPage => {
                let page_count = self.renderer.info().page_count;
                let target = (self.current_page + 1).min(page_count.max(1));
                self.navigate_clearing(target);
            }
            Command::PrevPage => {
                let target = self.current_page.saturating_sub(1).max(1);
                self.navigate_clearing(target);
            }
            Command::GotoPage { page } => {
                let page_count = self.renderer.info().page_count;
                let target = page.clamp(1, page_count.max(1));
                self.navigate_clearing(target);
            }
            Command::Search { query } => {
                if query.is_empty() {
                    return self.apply(Command::ClearSearch);
                }
                self.session = SearchSession::search(&query, &self.index);
                match self.session.current_page() {
                    Some(page) => {
                        self.coordinator.set_target(SEARCH_CHANNEL, Some(query));
                        self.navigate_preserving(page);
                    }
                    None => {
                        // No matches: drop any previous search markup but
                        // keep the session so the status line can say so.
                        self.coordinator.set_target(SEARCH_CHANNEL, None);
                        self.reconcile_current();
                        self.events.push(ReaderEvent::RedrawNeeded);
                    }
                }
            }
            Command::SearchNext => {
                if let Some(page) = self.session.navigate(Direction::Next) {
                    self.navigate_preserving(page);
                }
            }
            Command::SearchPrev => {
                if let Some(page) = self.session.navigate(Direction::Prev) {
                    self.navigate_preserving(page);
                }
            }
            Command::ClearSearch => {
                self.session = SearchSession::empty();
                self.coordinator.set_target(SEARCH_CHANNEL, None);
                self.reconcile_current();
                self.events.push(ReaderEvent::RedrawNeeded);
            }
            Command::ActivateBookmark { bookmark } => {
                let page_count = self.renderer.info().page_count;
                let target = bookmark.page_number.clamp(1, page_count.max(1));
                self.coordinator
                    .set_target(BOOKMARK_CHANNEL, Some(bookmark.description));
                self.navigate_preserving(target);
            }
            Command::SaveProgress => {
                self.persist()?;
            }
        }
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        let info = self.renderer.info();
        self.store.save(
            info,
            &ReadingProgress {
                current_page: self.current_page,
                page_count: info.page_count,
            },
        )
    }

    /// Explicit prev/next/goto: drops every channel's target and strips
    /// markup from the outgoing page before switching.
    fn navigate_clearing(&mut self, target: PageNumber) {
        let outgoing = self.renderer.presentation_root(self.current_page);
        self.coordinator.navigate_clearing(target, outgoing.as_ref());
        if target != self.current_page {
            self.current_page = target;
            self.events.push(ReaderEvent::PageChanged(target));
        } else {
            self.events.push(ReaderEvent::RedrawNeeded);
        }
    }

    /// Channel-driven navigation (search result, bookmark): targets stay
    /// armed. When the page does not change, the current root is
    /// reconciled right away; otherwise the render-complete signal for the
    /// new page applies the markup.
    fn navigate_preserving(&mut self, target: PageNumber) {
        self.coordinator.navigate_preserving(target);
        if target != self.current_page {
            self.current_page = target;
            self.events.push(ReaderEvent::PageChanged(target));
        } else {
            self.reconcile_current();
            self.events.push(ReaderEvent::RedrawNeeded);
        }
    }

    fn reconcile_current(&mut self) {
        let root = self.renderer.presentation_root(self.current_page);
        self.coordinator
            .on_render_complete(self.current_page, root.as_ref());
    }
}
