//! In-memory segments
//!
//! Pages are kept decoded and shared; loading one is a reference-count bump.
//! There is no page metadata, so every page passes `test_page`.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::errors::{ChronoError, ChronoResult};
use crate::trie::{HashTrie, TrieWriter};

use super::fact::{sort_for_write, FactVersion};
use super::page::Page;

#[derive(Debug, Clone)]
pub struct MemorySegment {
    name: String,
    trie: HashTrie,
    pages: Vec<Arc<Page>>,
}

impl MemorySegment {
    /// Wraps an already-built trie and its pages.
    ///
    /// Fails if a leaf refers to a page that isn't there, or sits deeper
    /// than the iid has bits for.
    pub fn new(name: impl Into<String>, trie: HashTrie, pages: Vec<Page>) -> ChronoResult<Self> {
        let name = name.into();
        let max_depth = trie.bucketer().max_depth();
        if trie.depth() > max_depth {
            return Err(ChronoError::malformed(format!(
                "segment '{}': trie depth {} exceeds the maximum of {}",
                name,
                trie.depth(),
                max_depth
            )));
        }
        if let Some((path, page_idx)) = trie
            .leaves()
            .into_iter()
            .find(|(_, page_idx)| *page_idx >= pages.len())
        {
            return Err(ChronoError::malformed(format!(
                "segment '{}': leaf at {:?} refers to page {} of {}",
                name,
                path,
                page_idx,
                pages.len()
            )));
        }

        Ok(Self {
            name,
            trie,
            pages: pages.into_iter().map(Arc::new).collect(),
        })
    }

    /// Writes rows already in writer order into a new segment.
    pub fn write(
        name: impl Into<String>,
        rows: &[FactVersion],
        config: &EngineConfig,
    ) -> ChronoResult<Self> {
        Self::write_with(name, rows, &TrieWriter::new(config)?)
    }

    pub fn write_with(
        name: impl Into<String>,
        rows: &[FactVersion],
        writer: &TrieWriter,
    ) -> ChronoResult<Self> {
        let mut pages: Vec<Page> = Vec::new();
        let trie = writer.write(rows, &mut pages)?;
        Self::new(name, trie, pages)
    }

    /// Sorts `rows` into writer order first.
    pub fn from_unsorted(
        name: impl Into<String>,
        mut rows: Vec<FactVersion>,
        config: &EngineConfig,
    ) -> ChronoResult<Self> {
        sort_for_write(&mut rows);
        Self::write(name, &rows, config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trie(&self) -> &HashTrie {
        &self.trie
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn load_page(&self, page_idx: usize) -> ChronoResult<Arc<Page>> {
        self.pages.get(page_idx).cloned().ok_or_else(|| {
            ChronoError::page_unavailable(
                self.name.clone(),
                page_idx,
                ChronoError::malformed(format!("no page {} of {}", page_idx, self.pages.len())),
            )
        })
    }
}
