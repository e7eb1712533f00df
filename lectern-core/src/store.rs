use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{DocumentId, DocumentInfo, PageNumber};

/// How far a reader got through one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadingProgress {
    pub current_page: PageNumber,
    pub page_count: usize,
}

impl ReadingProgress {
    pub fn start_of(info: &DocumentInfo) -> Self {
        Self {
            current_page: 1,
            page_count: info.page_count,
        }
    }
}

/// Progress-persistence collaborator. The reader reports the current page
/// on explicit save and on the first load of a never-opened document;
/// nothing else couples the two.
pub trait ProgressStore: Send + Sync {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<ReadingProgress>>;
    fn save(&self, doc: &DocumentInfo, progress: &ReadingProgress) -> Result<()>;
}

pub struct FileProgressStore {
    root: PathBuf,
}

impl FileProgressStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create progress directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn progress_path(&self, doc: &DocumentInfo) -> PathBuf {
        self.root.join(format!("{}.json", doc.id))
    }
}

impl ProgressStore for FileProgressStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<ReadingProgress>> {
        let path = self.progress_path(doc);
        if !path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&path)
            .with_context(|| format!("failed to open progress file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let progress = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode progress file {:?}", path))?;
        Ok(Some(progress))
    }

    fn save(&self, doc: &DocumentInfo, progress: &ReadingProgress) -> Result<()> {
        let path = self.progress_path(doc);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(progress)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp progress file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

pub struct MemoryProgressStore {
    inner: Mutex<HashMap<DocumentId, ReadingProgress>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self, doc: &DocumentInfo) -> Result<Option<ReadingProgress>> {
        Ok(self.inner.lock().get(&doc.id).cloned())
    }

    fn save(&self, doc: &DocumentInfo, progress: &ReadingProgress) -> Result<()> {
        self.inner.lock().insert(doc.id, progress.clone());
        Ok(())
    }
}

/// A saved place in a document. The description doubles as the text the
/// bookmark channel highlights when the bookmark is activated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub page_number: PageNumber,
    pub description: String,
}

/// Read-only view of another collaborator's bookmarks.
pub trait BookmarkProvider: Send + Sync {
    fn bookmarks(&self, doc: &DocumentId) -> Result<Vec<Bookmark>>;
}

/// Bookmarks stored as one JSON array per document, keyed by document id.
/// A missing file reads as "no bookmarks".
pub struct FileBookmarkStore {
    root: PathBuf,
}

impl FileBookmarkStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create bookmark directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn bookmark_path(&self, doc: &DocumentId) -> PathBuf {
        self.root.join(format!("{}.bookmarks.json", doc))
    }
}

impl BookmarkProvider for FileBookmarkStore {
    fn bookmarks(&self, doc: &DocumentId) -> Result<Vec<Bookmark>> {
        let path = self.bookmark_path(doc);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut file = File::open(&path)
            .with_context(|| format!("failed to open bookmark file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let bookmarks = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode bookmark file {:?}", path))?;
        Ok(bookmarks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_id_for_path;

    use tempfile::tempdir;

    fn sample_info(path: &std::path::Path) -> DocumentInfo {
        DocumentInfo {
            id: document_id_for_path(path),
            path: path.to_path_buf(),
            title: "sample.txt".to_string(),
            page_count: 3,
        }
    }

    #[test]
    fn file_progress_store_round_trips() {
        let dir = tempdir().unwrap();
        let doc_path = dir.path().join("sample.txt");
        std::fs::write(&doc_path, b"dummy").unwrap();
        let info = sample_info(&doc_path);

        let store = FileProgressStore::new(dir.path().join("progress")).unwrap();
        assert!(store.load(&info).unwrap().is_none());

        let progress = ReadingProgress {
            current_page: 2,
            page_count: 3,
        };
        store.save(&info, &progress).unwrap();

        assert_eq!(store.load(&info).unwrap(), Some(progress));
    }

    #[test]
    fn memory_progress_store_round_trips() {
        let dir = tempdir().unwrap();
        let doc_path = dir.path().join("sample.txt");
        std::fs::write(&doc_path, b"dummy").unwrap();
        let info = sample_info(&doc_path);

        let store = MemoryProgressStore::new();
        assert!(store.load(&info).unwrap().is_none());

        store.save(&info, &ReadingProgress::start_of(&info)).unwrap();
        assert_eq!(
            store.load(&info).unwrap(),
            Some(ReadingProgress {
                current_page: 1,
                page_count: 3,
            })
        );
    }

    #[test]
    fn missing_bookmark_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = FileBookmarkStore::new(dir.path().join("bookmarks")).unwrap();
        let id = document_id_for_path(std::path::Path::new("/nowhere/sample.txt"));

        assert!(store.bookmarks(&id).unwrap().is_empty());
    }

    #[test]
    fn bookmark_file_is_read_back() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("bookmarks");
        let store = FileBookmarkStore::new(root.clone()).unwrap();
        let id = document_id_for_path(std::path::Path::new("/nowhere/sample.txt"));

        let bookmarks = vec![Bookmark {
            page_number: 2,
            description: "jumps over".to_string(),
        }];
        std::fs::write(
            root.join(format!("{}.bookmarks.json", id)),
            serde_json::to_string(&bookmarks).unwrap(),
        )
        .unwrap();

        assert_eq!(store.bookmarks(&id).unwrap(), bookmarks);
    }
}
