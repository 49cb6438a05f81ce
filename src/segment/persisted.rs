//! Persisted segments
//!
//! A persisted segment is a directory:
//!
//! ```text
//! <data_dir>/<name>/
//!     data.pages   page records, numbered 0.. in file order
//!     meta.json    node table, root, per-page metadata
//! ```
//!
//! `meta.json` is written last, via rename, so a segment without it was never
//! completed and cannot be opened. Every page read re-verifies its checksum.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::errors::{ChronoError, ChronoResult};
use crate::observability::{log_event_with_fields, Event};
use crate::trie::{Bucketer, HashTrie, NodeEntry, PageSink, TrieWriter};

use super::fact::FactVersion;
use super::page::{Page, PageMeta};
use super::record::{decode_page, encode_page};

pub const DATA_FILE: &str = "data.pages";
pub const META_FILE: &str = "meta.json";
pub const FORMAT_VERSION: u32 = 1;

/// Contents of `meta.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub format_version: u32,
    pub level_bits: u8,
    /// Post-order: children precede their parent
    pub nodes: Vec<NodeEntry>,
    pub root: Option<usize>,
    pub pages: Vec<PageMeta>,
}

/// Streams pages of one new segment to disk.
///
/// Used as the `PageSink` of a `TrieWriter`; `finish` seals the segment.
pub struct PersistedSegmentWriter {
    name: String,
    dir: PathBuf,
    data: BufWriter<File>,
    offset: u64,
    bloom_bits: usize,
    pages: Vec<PageMeta>,
}

impl PersistedSegmentWriter {
    /// Creates `<data_dir>/<name>/`. Fails if a completed segment of that
    /// name already exists.
    pub fn create(config: &EngineConfig, name: &str) -> ChronoResult<Self> {
        let dir = config.segment_dir(name);

        if dir.join(META_FILE).exists() {
            return Err(ChronoError::malformed(format!(
                "segment '{}' already exists at {}",
                name,
                dir.display()
            )));
        }

        fs::create_dir_all(&dir)
            .map_err(|e| ChronoError::io(format!("creating {}", dir.display()), e))?;

        let data_path = dir.join(DATA_FILE);
        let file = File::create(&data_path)
            .map_err(|e| ChronoError::io(format!("creating {}", data_path.display()), e))?;

        Ok(Self {
            name: name.to_string(),
            dir,
            data: BufWriter::new(file),
            offset: 0,
            bloom_bits: config.bloom_bits,
            pages: Vec::new(),
        })
    }

    /// Fsyncs the pages, then writes `meta.json` and opens the result.
    pub fn finish(self, trie: &HashTrie) -> ChronoResult<PersistedSegment> {
        let Self {
            name,
            dir,
            data,
            pages,
            ..
        } = self;

        let file = data
            .into_inner()
            .map_err(|e| ChronoError::io(format!("flushing segment '{}'", name), e.into_error()))?;
        file.sync_all()
            .map_err(|e| ChronoError::io(format!("syncing segment '{}'", name), e))?;

        let (nodes, root) = trie.to_table();
        let meta = SegmentMeta {
            format_version: FORMAT_VERSION,
            level_bits: trie.bucketer().level_bits(),
            nodes,
            root,
            pages,
        };

        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| ChronoError::malformed(format!("segment metadata: {}", e)))?;

        let tmp_path = dir.join(format!("{}.tmp", META_FILE));
        {
            let mut tmp = File::create(&tmp_path)
                .map_err(|e| ChronoError::io(format!("creating {}", tmp_path.display()), e))?;
            tmp.write_all(&json)
                .and_then(|_| tmp.sync_all())
                .map_err(|e| ChronoError::io(format!("writing {}", tmp_path.display()), e))?;
        }
        fs::rename(&tmp_path, dir.join(META_FILE))
            .map_err(|e| ChronoError::io(format!("sealing segment '{}'", name), e))?;

        PersistedSegment::from_meta(name, dir, meta)
    }
}

impl PageSink for PersistedSegmentWriter {
    fn write_page(&mut self, page: Page) -> ChronoResult<usize> {
        let page_idx = self.pages.len();
        let record = encode_page(page_idx, &page)?;

        self.data
            .write_all(&record)
            .map_err(|e| ChronoError::io(format!("writing page {} of '{}'", page_idx, self.name), e))?;

        let mut meta = page.meta(self.bloom_bits);
        meta.offset = self.offset;
        meta.len = record.len() as u64;
        self.offset += record.len() as u64;
        self.pages.push(meta);

        Ok(page_idx)
    }
}

/// A sealed, read-only segment on disk
#[derive(Debug, Clone)]
pub struct PersistedSegment {
    name: String,
    dir: PathBuf,
    trie: HashTrie,
    pages: Vec<PageMeta>,
}

impl PersistedSegment {
    /// Writes rows already in writer order as the new segment `name`.
    pub fn write(config: &EngineConfig, name: &str, rows: &[FactVersion]) -> ChronoResult<Self> {
        Self::write_with(config, name, rows, &TrieWriter::new(config)?)
    }

    pub fn write_with(
        config: &EngineConfig,
        name: &str,
        rows: &[FactVersion],
        writer: &TrieWriter,
    ) -> ChronoResult<Self> {
        let mut sink = PersistedSegmentWriter::create(config, name)?;
        let trie = writer.write(rows, &mut sink)?;
        sink.finish(&trie)
    }

    /// Opens `<data_dir>/<name>/`.
    pub fn open(config: &EngineConfig, name: &str) -> ChronoResult<Self> {
        Self::open_dir(name, &config.segment_dir(name))
    }

    pub fn open_dir(name: &str, dir: &Path) -> ChronoResult<Self> {
        let meta_path = dir.join(META_FILE);
        let content = fs::read_to_string(&meta_path)
            .map_err(|e| ChronoError::io(format!("reading {}", meta_path.display()), e))?;

        let meta: SegmentMeta = serde_json::from_str(&content).map_err(|e| {
            ChronoError::corruption(format!("invalid {}: {}", meta_path.display(), e))
        })?;

        let segment = Self::from_meta(name.to_string(), dir.to_path_buf(), meta)?;

        let pages = segment.pages.len().to_string();
        log_event_with_fields(
            Event::SegmentOpened,
            &[("segment", name), ("pages", &pages)],
        );

        Ok(segment)
    }

    fn from_meta(name: String, dir: PathBuf, meta: SegmentMeta) -> ChronoResult<Self> {
        if meta.format_version != FORMAT_VERSION {
            return Err(ChronoError::corruption(format!(
                "segment '{}' has format version {}, expected {}",
                name, meta.format_version, FORMAT_VERSION
            )));
        }

        let bucketer = Bucketer::new(meta.level_bits)
            .map_err(|e| ChronoError::corruption(format!("segment '{}': {}", name, e)))?;
        let trie = HashTrie::from_table(&meta.nodes, meta.root, bucketer, meta.pages.len())?;

        Ok(Self {
            name,
            dir,
            trie,
            pages: meta.pages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn trie(&self) -> &HashTrie {
        &self.trie
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_meta(&self, page_idx: usize) -> Option<&PageMeta> {
        self.pages.get(page_idx)
    }

    /// Reads and verifies page `page_idx`.
    ///
    /// Any failure is reported as `PageUnavailable` naming this segment and
    /// the page.
    pub fn load_page(&self, page_idx: usize) -> ChronoResult<Page> {
        self.read_page(page_idx).map_err(|e| {
            let page = page_idx.to_string();
            let reason = e.to_string();
            log_event_with_fields(
                Event::PageLoadFailed,
                &[("segment", &self.name), ("page", &page), ("reason", &reason)],
            );
            ChronoError::page_unavailable(self.name.clone(), page_idx, e)
        })
    }

    fn read_page(&self, page_idx: usize) -> ChronoResult<Page> {
        let meta = self.pages.get(page_idx).ok_or_else(|| {
            ChronoError::malformed(format!("no page {} of {}", page_idx, self.pages.len()))
        })?;

        let data_path = self.dir.join(DATA_FILE);
        let mut file = File::open(&data_path)
            .map_err(|e| ChronoError::io(format!("opening {}", data_path.display()), e))?;

        let mut buf = vec![0u8; meta.len as usize];
        file.seek(SeekFrom::Start(meta.offset))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| ChronoError::corruption(format!("reading page record: {}", e)))?;

        let page = decode_page(&buf, page_idx)?;
        if page.row_count() != meta.row_count {
            return Err(ChronoError::corruption(format!(
                "page has {} rows, metadata says {}",
                page.row_count(),
                meta.row_count
            )));
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{sort_for_write, Document};
    use crate::trie::Iid;
    use serde_json::json;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> EngineConfig {
        EngineConfig::default()
            .with_data_dir(dir.path())
            .with_leaf_row_limit(2)
    }

    fn rows() -> Vec<FactVersion> {
        let mut rows: Vec<FactVersion> = (0..6)
            .map(|i| {
                let doc: Document = json!({"n": i}).as_object().cloned().unwrap();
                FactVersion::put(Iid::for_key(&format!("e{}", i)), 10 + i, 0, doc)
            })
            .collect();
        sort_for_write(&mut rows);
        rows
    }

    #[test]
    fn test_write_open_load() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let written = PersistedSegment::write(&config, "seg-1", &rows()).unwrap();

        let opened = PersistedSegment::open(&config, "seg-1").unwrap();
        assert_eq!(opened.trie(), written.trie());
        assert_eq!(opened.page_count(), written.page_count());

        let mut total = 0;
        for idx in 0..opened.page_count() {
            let page = opened.load_page(idx).unwrap();
            assert!(page.row_count() <= 2);
            assert_eq!(opened.page_meta(idx).unwrap().row_count, page.row_count());
            total += page.row_count();
        }
        assert_eq!(total, 6);
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        PersistedSegment::write(&config, "seg-1", &rows()).unwrap();
        assert!(PersistedSegment::write(&config, "seg-1", &rows()).is_err());
    }

    #[test]
    fn test_missing_meta_cannot_open() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let sink = PersistedSegmentWriter::create(&config, "partial").unwrap();
        drop(sink);
        assert!(PersistedSegment::open(&config, "partial").is_err());
    }

    #[test]
    fn test_corrupt_page_is_unavailable_and_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let seg = PersistedSegment::write(&config, "seg-1", &rows()).unwrap();

        let meta = seg.page_meta(0).unwrap().clone();
        let data_path = seg.dir().join(DATA_FILE);
        let mut bytes = fs::read(&data_path).unwrap();
        bytes[(meta.offset + meta.len / 2) as usize] ^= 0xFF;
        fs::write(&data_path, bytes).unwrap();

        let err = seg.load_page(0).unwrap_err();
        assert_eq!(err.code().code(), "CHRONO_PAGE_UNAVAILABLE");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("seg-1"));

        // the other pages are untouched
        assert!(seg.load_page(seg.page_count() - 1).is_ok());
    }
}
