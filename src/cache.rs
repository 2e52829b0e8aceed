//! File-based cache for transcripts, comment sets and analyses.
//!
//! Each namespace is its own subdirectory under the cache root and every entry
//! is a single JSON document. Writes land in a temporary file in the target
//! directory and are renamed into place, so a reader sees either the old record
//! or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{AnalysisKey, AnalysisRecord, CommentSet, TranscriptRecord};
use crate::video_id::VideoId;

/// Longest key stored under its own name.
const MAX_PLAIN_KEY_LEN: usize = 64;

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Independent key spaces of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Transcripts,
    Comments,
    Analyses,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [
        Namespace::Transcripts,
        Namespace::Comments,
        Namespace::Analyses,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Namespace::Transcripts => "transcripts",
            Namespace::Comments => "comments",
            Namespace::Analyses => "analyses",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A file found while listing a namespace.
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub namespace: &'static str,
    pub file_stem: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Counts of stored entries per namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    pub transcripts: usize,
    pub comments: usize,
    pub analyses: usize,
}

/// Map a cache key to its file stem.
///
/// Keys made only of `[A-Za-z0-9_-]` up to 64 characters are used as-is;
/// everything else becomes the hex SHA-256 of the key.
pub fn file_stem_for_key(key: &str) -> String {
    let plain = !key.is_empty()
        && key.len() <= MAX_PLAIN_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if plain {
        key.to_string()
    } else {
        hex::encode(Sha256::digest(key.as_bytes()))
    }
}

/// On-disk store owned by the pipeline.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Open (and create if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let store = Self { root: root.into() };
        store.ensure_directories()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_directories(&self) -> Result<(), CacheError> {
        for ns in Namespace::ALL {
            let dir = self.namespace_dir(ns);
            fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn namespace_dir(&self, ns: Namespace) -> PathBuf {
        self.root.join(ns.dir_name())
    }

    pub fn entry_path(&self, ns: Namespace, key: &str) -> PathBuf {
        self.namespace_dir(ns)
            .join(format!("{}.{}", file_stem_for_key(key), ENTRY_EXTENSION))
    }

    /// Read an entry, reporting I/O and decoding failures.
    pub fn try_get<T: DeserializeOwned>(
        &self,
        ns: Namespace,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        let path = self.entry_path(ns, key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Corrupt { path, source })
    }

    /// Read an entry; any failure counts as a miss.
    pub fn get<T: DeserializeOwned>(&self, ns: Namespace, key: &str) -> Option<T> {
        match self.try_get(ns, key) {
            Ok(Some(value)) => {
                debug!("Cache hit: {}/{}", ns, key);
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Treating unreadable cache entry as a miss: {}", e);
                None
            }
        }
    }

    /// Store an entry, replacing any previous value.
    pub fn put<T: Serialize>(&self, ns: Namespace, key: &str, value: &T) -> Result<(), CacheError> {
        let dir = self.namespace_dir(ns);
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let json = serde_json::to_vec_pretty(value)?;
        let path = self.entry_path(ns, key);

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| CacheError::io(&dir, e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.flush())
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;

        debug!("Cached {}/{}", ns, key);
        Ok(())
    }

    /// Delete every entry in every namespace. Returns the number removed.
    pub fn reset(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for ns in Namespace::ALL {
            for entry in self.list(ns)? {
                fs::remove_file(&entry.path).map_err(|e| CacheError::io(&entry.path, e))?;
                removed += 1;
            }
        }
        self.ensure_directories()?;
        Ok(removed)
    }

    /// Enumerate the stored entries of a namespace, sorted by file name.
    pub fn list(&self, ns: Namespace) -> Result<Vec<CacheEntry>, CacheError> {
        let dir = self.namespace_dir(ns);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&dir, e)),
        };

        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| CacheError::io(&dir, e))?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let metadata = item.metadata().map_err(|e| CacheError::io(&path, e))?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(CacheEntry {
                namespace: ns.dir_name(),
                file_stem: stem.to_string(),
                size_bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                path,
            });
        }
        entries.sort_by(|a, b| a.file_stem.cmp(&b.file_stem));
        Ok(entries)
    }

    pub fn summary(&self) -> Result<CacheSummary, CacheError> {
        Ok(CacheSummary {
            transcripts: self.list(Namespace::Transcripts)?.len(),
            comments: self.list(Namespace::Comments)?.len(),
            analyses: self.list(Namespace::Analyses)?.len(),
        })
    }

    /// Decode every record of a namespace, skipping unreadable ones.
    fn records<T: DeserializeOwned>(&self, ns: Namespace) -> Result<Vec<T>, CacheError> {
        let mut records = Vec::new();
        for entry in self.list(ns)? {
            let decoded = fs::read(&entry.path)
                .map_err(|e| CacheError::io(&entry.path, e))
                .and_then(|bytes| {
                    serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
                        path: entry.path.clone(),
                        source,
                    })
                });
            match decoded {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping cache entry: {}", e),
            }
        }
        Ok(records)
    }

    // Typed accessors

    pub fn transcript(&self, id: &VideoId) -> Option<TranscriptRecord> {
        self.get(Namespace::Transcripts, id.as_str())
    }

    pub fn put_transcript(&self, record: &TranscriptRecord) -> Result<(), CacheError> {
        self.put(Namespace::Transcripts, record.video_id.as_str(), record)
    }

    pub fn comments(&self, id: &VideoId) -> Option<CommentSet> {
        self.get(Namespace::Comments, id.as_str())
    }

    pub fn put_comments(&self, set: &CommentSet) -> Result<(), CacheError> {
        self.put(Namespace::Comments, set.video_id.as_str(), set)
    }

    pub fn analysis(&self, key: &AnalysisKey) -> Option<AnalysisRecord> {
        self.get(Namespace::Analyses, &key.cache_key())
    }

    /// Store an analysis. Blank results are refused and `Ok(false)` returned.
    pub fn put_analysis(&self, record: &AnalysisRecord) -> Result<bool, CacheError> {
        if record.result_text.trim().is_empty() {
            return Ok(false);
        }
        self.put(Namespace::Analyses, &record.key().cache_key(), record)?;
        Ok(true)
    }

    pub fn transcripts(&self) -> Result<Vec<TranscriptRecord>, CacheError> {
        self.records(Namespace::Transcripts)
    }

    pub fn comment_sets(&self) -> Result<Vec<CommentSet>, CacheError> {
        self.records(Namespace::Comments)
    }

    pub fn analyses(&self) -> Result<Vec<AnalysisRecord>, CacheError> {
        self.records(Namespace::Analyses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisMode;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    fn vid(s: &str) -> VideoId {
        VideoId::new(s).unwrap()
    }

    #[test]
    fn test_file_stem_for_key() {
        assert_eq!(file_stem_for_key("abc12345678"), "abc12345678");
        assert_eq!(
            file_stem_for_key("abc12345678_comments_gpt-4o"),
            "abc12345678_comments_gpt-4o"
        );

        let hashed = file_stem_for_key("abc12345678_comments_openai/gpt-4o-mini");
        assert_eq!(hashed.len(), 64);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));

        let long = "a".repeat(65);
        assert_eq!(file_stem_for_key(&long).len(), 64);
        assert_ne!(file_stem_for_key(&long), long[..64]);
        assert_eq!(file_stem_for_key(""), hex::encode(Sha256::digest(b"")));
    }

    #[test]
    fn test_creates_namespace_directories() {
        let (_dir, store) = setup();
        for ns in Namespace::ALL {
            assert!(store.namespace_dir(ns).is_dir());
        }
    }

    #[test]
    fn test_put_get_and_overwrite() {
        let (_dir, store) = setup();
        let id = vid("abc12345678");
        assert!(store.transcript(&id).is_none());

        store
            .put_transcript(&TranscriptRecord::new(id.clone(), "first".into()))
            .unwrap();
        store
            .put_transcript(&TranscriptRecord::new(id.clone(), "second".into()))
            .unwrap();
        assert_eq!(store.transcript(&id).unwrap().text, "second");

        // no temp files left behind
        let entries = store.list(Namespace::Transcripts).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            fs::read_dir(store.namespace_dir(Namespace::Transcripts))
                .unwrap()
                .count(),
            1
        );
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let (_dir, store) = setup();
        store.put(Namespace::Transcripts, "same_key", &"t").unwrap();
        store.put(Namespace::Comments, "same_key", &"c").unwrap();
        assert_eq!(
            store.get::<String>(Namespace::Transcripts, "same_key").as_deref(),
            Some("t")
        );
        assert_eq!(
            store.get::<String>(Namespace::Comments, "same_key").as_deref(),
            Some("c")
        );
        assert!(store.get::<String>(Namespace::Analyses, "same_key").is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let (_dir, store) = setup();
        let id = vid("abc12345678");
        fs::write(store.entry_path(Namespace::Comments, id.as_str()), b"{not json").unwrap();
        assert!(store.comments(&id).is_none());
        assert!(matches!(
            store.try_get::<CommentSet>(Namespace::Comments, id.as_str()),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_blank_analysis_not_stored() {
        let (_dir, store) = setup();
        let key = AnalysisKey::new(vid("abc12345678"), AnalysisMode::Comments, "openai/gpt-4o-mini");
        assert!(!store
            .put_analysis(&AnalysisRecord::new(&key, "  \n".into()))
            .unwrap());
        assert!(store.analysis(&key).is_none());

        assert!(store
            .put_analysis(&AnalysisRecord::new(&key, "insightful".into()))
            .unwrap());
        assert_eq!(store.analysis(&key).unwrap().result_text, "insightful");
        assert_eq!(store.analyses().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (_dir, store) = setup();
        let id = vid("abc12345678");
        store
            .put_transcript(&TranscriptRecord::new(id.clone(), "text".into()))
            .unwrap();
        store.put_comments(&CommentSet::empty(id.clone())).unwrap();
        let key = AnalysisKey::new(id.clone(), AnalysisMode::Transcript, "m");
        store
            .put_analysis(&AnalysisRecord::new(&key, "result".into()))
            .unwrap();

        assert_eq!(
            store.summary().unwrap(),
            CacheSummary {
                transcripts: 1,
                comments: 1,
                analyses: 1
            }
        );
        assert_eq!(store.reset().unwrap(), 3);
        assert_eq!(store.summary().unwrap(), CacheSummary::default());
        assert!(store.transcript(&id).is_none());
        for ns in Namespace::ALL {
            assert!(store.namespace_dir(ns).is_dir());
        }
    }
}
