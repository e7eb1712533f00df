//! Presentation-tree model for one rendered page.
//!
//! The rendering collaborator owns the tree; the highlight machinery only
//! rewrites fragments inside individual text-bearing leaves. A leaf starts
//! life as a single plain fragment and is split around highlighted spans,
//! each tagged with the channel that inserted it. Matches never cross a
//! leaf boundary; text fragmented across leaves by the renderer is a
//! documented search blind spot.

/// One piece of a text-bearing leaf: either plain text or a highlighted
/// span tagged with the inserting channel's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Plain(String),
    Mark { channel: String, text: String },
}

impl Fragment {
    pub fn text(&self) -> &str {
        match self {
            Fragment::Plain(text) => text,
            Fragment::Mark { text, .. } => text,
        }
    }

    pub fn channel(&self) -> Option<&str> {
        match self {
            Fragment::Plain(_) => None,
            Fragment::Mark { channel, .. } => Some(channel),
        }
    }
}

/// The smallest unit of the tree that carries displayable text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextLeaf {
    fragments: Vec<Fragment>,
}

impl TextLeaf {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            fragments: vec![Fragment::Plain(text.into())],
        }
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// The leaf's text with all markup ignored.
    pub fn plain_text(&self) -> String {
        self.fragments.iter().map(Fragment::text).collect()
    }

    pub(crate) fn take_fragments(&mut self) -> Vec<Fragment> {
        std::mem::take(&mut self.fragments)
    }

    pub(crate) fn set_fragments(&mut self, fragments: Vec<Fragment>) {
        self.fragments = fragments;
    }
}

/// The rendered subtree for one page: its text-bearing leaves in document
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRoot {
    leaves: Vec<TextLeaf>,
}

impl PageRoot {
    pub fn new(leaves: Vec<TextLeaf>) -> Self {
        Self { leaves }
    }

    /// Builds a root with one leaf per line, the fragmentation a line-based
    /// renderer produces.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            leaves: lines.into_iter().map(TextLeaf::new).collect(),
        }
    }

    pub fn leaves(&self) -> &[TextLeaf] {
        &self.leaves
    }

    pub(crate) fn leaves_mut(&mut self) -> &mut [TextLeaf] {
        &mut self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Full page text with markup ignored, one line per leaf.
    pub fn plain_text(&self) -> String {
        let lines: Vec<String> = self.leaves.iter().map(TextLeaf::plain_text).collect();
        lines.join("\n")
    }
}

/// Collapses runs of adjacent plain fragments and drops empty ones, so the
/// leaf reads as a normal text structure to every other channel.
pub(crate) fn merge_adjacent_plain(fragments: &mut Vec<Fragment>) {
    let mut merged: Vec<Fragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments.drain(..) {
        match fragment {
            Fragment::Plain(text) => {
                if text.is_empty() {
                    continue;
                }
                if let Some(Fragment::Plain(last)) = merged.last_mut() {
                    last.push_str(&text);
                } else {
                    merged.push(Fragment::Plain(text));
                }
            }
            mark => merged.push(mark),
        }
    }
    *fragments = merged;
}
