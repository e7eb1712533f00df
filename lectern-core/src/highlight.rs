use tracing::{debug, trace};

use crate::search::occurrences;
use crate::tree::{merge_adjacent_plain, Fragment, PageRoot};
use crate::{PageNumber, PageRootHandle};

pub const SEARCH_CHANNEL: &str = "search";
pub const BOOKMARK_CHANNEL: &str = "bookmark";

/// A named overlay that can mark up one target string at a time on the
/// visible page. Every fragment it inserts carries its name, and that tag
/// is the only markup it will ever remove, so channels cannot corrupt each
/// other.
#[derive(Debug, Clone)]
pub struct HighlightChannel {
    name: String,
    target: Option<String>,
}

impl HighlightChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn set_target(&mut self, target: Option<String>) {
        self.target = target;
    }

    /// Marks up every case-insensitive occurrence of `target` under `root`.
    ///
    /// Any markup previously inserted by this channel is removed first, so
    /// calling `apply` twice leaves the same state as calling it once with
    /// the latest target. An empty target or a root without text-bearing
    /// leaves is a no-op. Occurrences are found per leaf, left-to-right and
    /// non-overlapping; a match spanning two leaves is not detected.
    pub fn apply(&self, target: &str, root: &mut PageRoot) {
        self.clear(root);
        if target.is_empty() || root.is_empty() {
            return;
        }

        let mut marked = 0usize;
        for leaf in root.leaves_mut() {
            let mut rebuilt = Vec::new();
            for fragment in leaf.take_fragments() {
                match fragment {
                    Fragment::Plain(text) => {
                        marked += self.split_around_matches(text, target, &mut rebuilt);
                    }
                    // Another channel's markup is left untouched; its text is
                    // fragmented out of this channel's view, the same blind
                    // spot as a leaf boundary.
                    mark => rebuilt.push(mark),
                }
            }
            merge_adjacent_plain(&mut rebuilt);
            leaf.set_fragments(rebuilt);
        }
        trace!(channel = %self.name, target, marked, "highlight applied");
    }

    /// Unwraps every fragment tagged with this channel's name back to plain
    /// text and re-merges the surrounding fragments. Markup tagged with any
    /// other channel's name is never touched. Safe to call when no markup
    /// exists.
    pub fn clear(&self, root: &mut PageRoot) {
        for leaf in root.leaves_mut() {
            let fragments = leaf.take_fragments();
            let mut rebuilt = Vec::with_capacity(fragments.len());
            for fragment in fragments {
                match fragment {
                    Fragment::Mark { channel, text } if channel == self.name => {
                        rebuilt.push(Fragment::Plain(text));
                    }
                    other => rebuilt.push(other),
                }
            }
            merge_adjacent_plain(&mut rebuilt);
            leaf.set_fragments(rebuilt);
        }
    }

    /// Splits one plain fragment around the matches inside it, pushing the
    /// resulting plain and marked segments onto `out`. Returns the number
    /// of matches marked.
    fn split_around_matches(&self, text: String, target: &str, out: &mut Vec<Fragment>) -> usize {
        let found = occurrences(&text, target);
        if found.is_empty() {
            out.push(Fragment::Plain(text));
            return 0;
        }

        let count = found.len();
        let mut cursor = 0;
        for occurrence in found {
            if occurrence.byte_range.start > cursor {
                out.push(Fragment::Plain(
                    text[cursor..occurrence.byte_range.start].to_string(),
                ));
            }
            out.push(Fragment::Mark {
                channel: self.name.clone(),
                text: text[occurrence.byte_range.clone()].to_string(),
            });
            cursor = occurrence.byte_range.end;
        }
        if cursor < text.len() {
            out.push(Fragment::Plain(text[cursor..].to_string()));
        }
        count
    }
}

/// Owns the active channels for the displayed page and keeps their markup
/// consistent across page changes and render-completion signals.
///
/// Channels are registered lazily on first use and reconciled in
/// registration order. Ordering is inconsequential beyond the guarantee
/// that a later apply never removes an earlier channel's markup, which the
/// tag-scoped clear already provides.
#[derive(Debug)]
pub struct HighlightCoordinator {
    channels: Vec<HighlightChannel>,
    current_page: PageNumber,
}

impl HighlightCoordinator {
    pub fn new(initial_page: PageNumber) -> Self {
        Self {
            channels: Vec::new(),
            current_page: initial_page,
        }
    }

    pub fn current_page(&self) -> PageNumber {
        self.current_page
    }

    pub fn channel(&self, name: &str) -> Option<&HighlightChannel> {
        self.channels.iter().find(|channel| channel.name() == name)
    }

    /// Records the desired state for a channel: `Some` text is (re)applied
    /// and `None` clears the channel's markup on the next reconciliation.
    pub fn set_target(&mut self, name: &str, target: Option<String>) {
        match self.channels.iter_mut().find(|c| c.name() == name) {
            Some(channel) => channel.set_target(target),
            None => {
                let mut channel = HighlightChannel::new(name);
                channel.set_target(target);
                self.channels.push(channel);
            }
        }
    }

    /// Switches page keeping every channel's target, the policy for a
    /// navigation caused by the channel itself (activating a bookmark,
    /// stepping through search results).
    pub fn navigate_preserving(&mut self, page: PageNumber) {
        self.current_page = page;
    }

    /// Switches page dropping every channel's target, the policy for an
    /// explicit previous/next/goto navigation. Markup on the outgoing root
    /// is stripped when the root is still mounted.
    pub fn navigate_clearing(&mut self, page: PageNumber, outgoing: Option<&PageRootHandle>) {
        for channel in &mut self.channels {
            channel.set_target(None);
        }
        if let Some(root) = outgoing {
            let mut root = root.lock();
            for channel in &self.channels {
                channel.clear(&mut root);
            }
        }
        self.current_page = page;
    }

    /// The authoritative synchronization point: once the renderer reports a
    /// stable root for the current page, every channel with a target is
    /// applied and every channel without one is cleared. Signals for other
    /// pages, and a missing root, are ignored.
    pub fn on_render_complete(&mut self, page: PageNumber, root: Option<&PageRootHandle>) {
        if page != self.current_page {
            debug!(page, current = self.current_page, "stale render-complete ignored");
            return;
        }
        let Some(root) = root else {
            return;
        };
        let mut root = root.lock();
        for channel in &self.channels {
            match channel.target() {
                Some(target) => channel.apply(target, &mut root),
                None => channel.clear(&mut root),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn sample_root() -> PageRoot {
        PageRoot::from_lines(["The quick brown fox", "jumps over the lazy dog"])
    }

    fn marked_texts<'a>(root: &'a PageRoot, channel: &str) -> Vec<String> {
        root.leaves()
            .iter()
            .flat_map(|leaf| leaf.fragments())
            .filter(|fragment| fragment.channel() == Some(channel))
            .map(|fragment| fragment.text().to_string())
            .collect()
    }

    #[test]
    fn apply_splits_leaves_around_matches() {
        let channel = HighlightChannel::new(SEARCH_CHANNEL);
        let mut root = sample_root();

        channel.apply("the", &mut root);

        assert_eq!(marked_texts(&root, SEARCH_CHANNEL), vec!["The", "the"]);
        assert_eq!(root.plain_text(), sample_root().plain_text());
        assert_eq!(
            root.leaves()[1].fragments(),
            &[
                Fragment::Plain("jumps over ".to_string()),
                Fragment::Mark {
                    channel: SEARCH_CHANNEL.to_string(),
                    text: "the".to_string(),
                },
                Fragment::Plain(" lazy dog".to_string()),
            ]
        );
    }

    #[test]
    fn apply_is_idempotent() {
        let channel = HighlightChannel::new(SEARCH_CHANNEL);
        let mut once = sample_root();
        channel.apply("fox", &mut once);

        let mut twice = sample_root();
        channel.apply("fox", &mut twice);
        channel.apply("fox", &mut twice);

        assert_eq!(once, twice);
    }

    #[test]
    fn reapply_supersedes_previous_target() {
        let channel = HighlightChannel::new(SEARCH_CHANNEL);
        let mut root = sample_root();

        channel.apply("fox", &mut root);
        channel.apply("lazy", &mut root);

        assert_eq!(marked_texts(&root, SEARCH_CHANNEL), vec!["lazy"]);
        assert_eq!(root.plain_text(), sample_root().plain_text());
    }

    #[test]
    fn empty_target_is_a_no_op() {
        let channel = HighlightChannel::new(SEARCH_CHANNEL);
        let mut root = sample_root();
        channel.apply("", &mut root);
        assert_eq!(root, sample_root());
    }

    #[test]
    fn match_spanning_leaf_boundary_is_not_detected() {
        let channel = HighlightChannel::new(SEARCH_CHANNEL);
        let mut root = PageRoot::from_lines(["quick br", "own fox"]);

        channel.apply("brown", &mut root);

        assert!(marked_texts(&root, SEARCH_CHANNEL).is_empty());
    }

    #[test]
    fn clear_removes_only_own_markup_and_remerges() {
        let search = HighlightChannel::new(SEARCH_CHANNEL);
        let bookmark = HighlightChannel::new(BOOKMARK_CHANNEL);
        let mut root = sample_root();

        search.apply("quick", &mut root);
        bookmark.apply("lazy", &mut root);
        search.clear(&mut root);

        assert!(marked_texts(&root, SEARCH_CHANNEL).is_empty());
        assert_eq!(marked_texts(&root, BOOKMARK_CHANNEL), vec!["lazy"]);
        // The first leaf is back to a single plain fragment.
        assert_eq!(
            root.leaves()[0].fragments(),
            &[Fragment::Plain("The quick brown fox".to_string())]
        );
    }

    #[test]
    fn channels_do_not_interfere_in_either_order() {
        for search_first in [true, false] {
            let search = HighlightChannel::new(SEARCH_CHANNEL);
            let bookmark = HighlightChannel::new(BOOKMARK_CHANNEL);
            let mut root = sample_root();

            if search_first {
                search.apply("quick", &mut root);
                bookmark.apply("lazy", &mut root);
            } else {
                bookmark.apply("lazy", &mut root);
                search.apply("quick", &mut root);
            }

            assert_eq!(marked_texts(&root, SEARCH_CHANNEL), vec!["quick"]);
            assert_eq!(marked_texts(&root, BOOKMARK_CHANNEL), vec!["lazy"]);
        }
    }

    #[test]
    fn clear_on_unmarked_root_is_a_no_op() {
        let channel = HighlightChannel::new(SEARCH_CHANNEL);
        let mut root = sample_root();
        channel.clear(&mut root);
        assert_eq!(root, sample_root());
    }

    #[test]
    fn coordinator_reconciles_on_render_complete() {
        let mut coordinator = HighlightCoordinator::new(1);
        coordinator.set_target(SEARCH_CHANNEL, Some("fox".to_string()));

        let root: PageRootHandle = Arc::new(Mutex::new(sample_root()));
        coordinator.on_render_complete(1, Some(&root));

        assert_eq!(marked_texts(&root.lock(), SEARCH_CHANNEL), vec!["fox"]);
    }

    #[test]
    fn stale_render_complete_is_ignored() {
        let mut coordinator = HighlightCoordinator::new(2);
        coordinator.set_target(SEARCH_CHANNEL, Some("fox".to_string()));

        let root: PageRootHandle = Arc::new(Mutex::new(sample_root()));
        coordinator.on_render_complete(1, Some(&root));

        assert_eq!(*root.lock(), sample_root());
    }

    #[test]
    fn render_complete_without_root_is_a_no_op() {
        let mut coordinator = HighlightCoordinator::new(1);
        coordinator.set_target(SEARCH_CHANNEL, Some("fox".to_string()));
        coordinator.on_render_complete(1, None);
    }

    #[test]
    fn clearing_navigation_drops_targets_and_strips_outgoing_markup() {
        let mut coordinator = HighlightCoordinator::new(1);
        coordinator.set_target(SEARCH_CHANNEL, Some("fox".to_string()));
        coordinator.set_target(BOOKMARK_CHANNEL, Some("lazy".to_string()));

        let outgoing: PageRootHandle = Arc::new(Mutex::new(sample_root()));
        coordinator.on_render_complete(1, Some(&outgoing));
        coordinator.navigate_clearing(2, Some(&outgoing));

        assert_eq!(coordinator.current_page(), 2);
        assert_eq!(*outgoing.lock(), sample_root());
        assert_eq!(coordinator.channel(SEARCH_CHANNEL).unwrap().target(), None);
        assert_eq!(coordinator.channel(BOOKMARK_CHANNEL).unwrap().target(), None);
    }

    #[test]
    fn preserving_navigation_keeps_targets() {
        let mut coordinator = HighlightCoordinator::new(1);
        coordinator.set_target(BOOKMARK_CHANNEL, Some("jumps over".to_string()));

        coordinator.navigate_preserving(2);

        assert_eq!(coordinator.current_page(), 2);
        assert_eq!(
            coordinator.channel(BOOKMARK_CHANNEL).unwrap().target(),
            Some("jumps over")
        );
    }

    #[test]
    fn reconciliation_clears_channels_without_targets() {
        let mut coordinator = HighlightCoordinator::new(1);
        coordinator.set_target(SEARCH_CHANNEL, Some("fox".to_string()));

        let root: PageRootHandle = Arc::new(Mutex::new(sample_root()));
        coordinator.on_render_complete(1, Some(&root));
        assert!(!marked_texts(&root.lock(), SEARCH_CHANNEL).is_empty());

        coordinator.set_target(SEARCH_CHANNEL, None);
        coordinator.on_render_complete(1, Some(&root));
        assert_eq!(*root.lock(), sample_root());
    }
}
