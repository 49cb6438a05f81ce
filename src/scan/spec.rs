//! What a scan asks for, and how that prunes pages
//!
//! Pruning is conservative throughout. A page may be dropped only when none
//! of its rows can change the result:
//!
//! - rows recorded after the as-of point, or wholly outside the valid-time
//!   window, never affect a visible rectangle
//! - pages whose bloom rules out every selected iid hold no selected entity
//! - a page failing only the content predicates is kept when it may share an
//!   entity with a page that passed, since its versions still cap that
//!   entity's older versions

use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::segment::{IidBloom, PageMeta, PageRef, PagesFilter, Segment};
use crate::temporal::TemporalBounds;
use crate::trie::Iid;

use super::filters::{ColumnPredicate, PredicateFilter};
use super::selector::IidSelector;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSpec {
    pub bounds: TemporalBounds,
    pub selector: Option<IidSelector>,
    pub predicates: Vec<ColumnPredicate>,
    /// Content columns to copy; `None` copies every column
    pub projection: Option<Vec<String>>,
}

impl ScanSpec {
    /// Every entity, unbounded on both axes
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(mut self, bounds: TemporalBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_selector(mut self, selector: IidSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_iid(self, iid: Iid) -> Self {
        self.with_selector(IidSelector::exact(iid))
    }

    pub fn with_predicate(mut self, predicate: ColumnPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_projection(mut self, columns: Vec<String>) -> Self {
        self.projection = Some(columns);
        self
    }

    /// Whether the page can hold rows relevant to this scan at all
    pub fn page_relevant(&self, meta: &PageMeta) -> bool {
        meta.overlaps(&self.bounds)
            && self
                .selector
                .as_ref()
                .map_or(true, |selector| selector.may_match(meta))
    }

    /// Whether the page can hold a version matching the content predicates
    pub fn page_content_matches(&self, meta: &PageMeta) -> bool {
        PredicateFilter::may_match(meta, &self.predicates)
    }
}

/// `PagesFilter` applying a `ScanSpec` to each planned task
pub struct PageSelection<'q> {
    spec: &'q ScanSpec,
    metrics: Option<&'q MetricsRegistry>,
}

impl<'q> PageSelection<'q> {
    pub fn new(spec: &'q ScanSpec, metrics: Option<&'q MetricsRegistry>) -> Self {
        Self { spec, metrics }
    }

    fn pruned(&self, segments: &[Segment], page: &PageRef, reason: &str) {
        if let Some(metrics) = self.metrics {
            metrics.increment_pages_pruned();
        }
        let page_str = page.page_idx.to_string();
        log_event_with_fields(
            Event::PagePruned,
            &[
                ("segment", segments[page.segment].name()),
                ("page", &page_str),
                ("reason", reason),
            ],
        );
    }
}

impl PagesFilter for PageSelection<'_> {
    fn filter_pages(&self, segments: &[Segment], pages: Vec<PageRef>) -> Option<Vec<PageRef>> {
        let mut taken: Vec<PageRef> = Vec::with_capacity(pages.len());
        let mut content_failed: Vec<PageRef> = Vec::new();

        for page in pages {
            let segment = &segments[page.segment];
            if !segment.test_page(page.page_idx, &|meta: &PageMeta| self.spec.page_relevant(meta)) {
                self.pruned(segments, &page, "bounds");
            } else if segment.test_page(page.page_idx, &|meta: &PageMeta| {
                self.spec.page_content_matches(meta)
            }) {
                taken.push(page);
            } else {
                content_failed.push(page);
            }
        }

        if taken.is_empty() {
            for page in &content_failed {
                self.pruned(segments, page, "content");
            }
            return None;
        }

        if !content_failed.is_empty() {
            // pages without metadata could hold any iid
            let taken_blooms: Option<Vec<&IidBloom>> = taken
                .iter()
                .map(|page| segments[page.segment].page_meta(page.page_idx).map(|meta| &meta.iid_bloom))
                .collect();

            for page in content_failed {
                let rescued = match (&taken_blooms, segments[page.segment].page_meta(page.page_idx)) {
                    (Some(blooms), Some(meta)) => blooms.iter().any(|bloom| bloom.intersects(&meta.iid_bloom)),
                    _ => true,
                };
                if rescued {
                    taken.push(page);
                } else {
                    self.pruned(segments, &page, "content");
                }
            }

            // back to task order
            taken.sort_by_key(|page| page.segment);
        }

        Some(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::segment::{sort_for_write, FactVersion, MemorySegment, PersistedSegment};
    use crate::temporal::TemporalDimension;
    use serde_json::json;
    use tempfile::TempDir;

    fn put(key: &str, sf: i64, vf: i64, doc: serde_json::Value) -> FactVersion {
        FactVersion::put(Iid::for_key(key), sf, vf, doc.as_object().cloned().unwrap())
    }

    fn segment(config: &EngineConfig, name: &str, mut rows: Vec<FactVersion>) -> Segment {
        sort_for_write(&mut rows);
        PersistedSegment::write(config, name, &rows).unwrap().into()
    }

    fn refs(n: usize) -> Vec<PageRef> {
        (0..n)
            .map(|segment| PageRef {
                segment,
                page_idx: 0,
            })
            .collect()
    }

    #[test]
    fn test_prunes_pages_recorded_after_as_of() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::default().with_data_dir(dir.path());
        let segments = vec![
            segment(&config, "late", vec![put("a", 50, 0, json!({}))]),
            segment(&config, "early", vec![put("a", 5, 0, json!({}))]),
        ];

        let spec = ScanSpec::new().with_bounds(TemporalBounds::as_of(10));
        let metrics = MetricsRegistry::new();
        let selected = PageSelection::new(&spec, Some(&metrics)).filter_pages(&segments, refs(2));

        assert_eq!(selected, Some(vec![PageRef { segment: 1, page_idx: 0 }]));
        assert_eq!(metrics.snapshot().pages_pruned, 1);
    }

    #[test]
    fn test_keeps_pages_before_system_window() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::default().with_data_dir(dir.path());
        let segments = vec![segment(&config, "old", vec![put("a", 5, 0, json!({}))])];

        let spec = ScanSpec::new().with_bounds(
            TemporalBounds::unbounded().with_system_time(TemporalDimension::new(100, 200)),
        );
        let selected = PageSelection::new(&spec, None).filter_pages(&segments, refs(1));
        assert_eq!(selected, Some(refs(1)));
    }

    #[test]
    fn test_content_rescue_by_shared_entity() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::default().with_data_dir(dir.path());
        let segments = vec![
            // newer version of "a" no longer matching
            segment(&config, "newer", vec![put("a", 20, 0, json!({"n": 1}))]),
            // unrelated entity, no match
            segment(&config, "other", vec![put("zz", 15, 0, json!({"n": 2}))]),
            segment(&config, "older", vec![put("a", 10, 0, json!({"n": 100}))]),
        ];

        let spec = ScanSpec::new().with_predicate(ColumnPredicate::gte("n", json!(50)));
        let selected = PageSelection::new(&spec, None)
            .filter_pages(&segments, refs(3))
            .unwrap();

        assert!(selected.contains(&PageRef { segment: 0, page_idx: 0 }));
        assert!(selected.contains(&PageRef { segment: 2, page_idx: 0 }));
        assert!(selected.windows(2).all(|w| w[0].segment < w[1].segment));
    }

    #[test]
    fn test_drops_task_when_nothing_passes() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::default().with_data_dir(dir.path());
        let segments = vec![segment(&config, "s", vec![put("a", 20, 0, json!({"n": 1}))])];

        let spec = ScanSpec::new().with_predicate(ColumnPredicate::eq("n", json!(7)));
        assert_eq!(PageSelection::new(&spec, None).filter_pages(&segments, refs(1)), None);

        let spec = ScanSpec::new().with_iid(Iid::for_key("a"));
        assert!(PageSelection::new(&spec, None)
            .filter_pages(&segments, refs(1))
            .is_some());
    }

    #[test]
    fn test_memory_pages_always_taken() {
        let mut rows = vec![put("a", 20, 0, json!({"n": 1}))];
        sort_for_write(&mut rows);
        let segments: Vec<Segment> =
            vec![MemorySegment::write("mem", &rows, &EngineConfig::default())
                .unwrap()
                .into()];

        let spec = ScanSpec::new()
            .with_bounds(TemporalBounds::as_of(1))
            .with_predicate(ColumnPredicate::eq("n", json!(7)));
        assert_eq!(
            PageSelection::new(&spec, None).filter_pages(&segments, refs(1)),
            Some(refs(1))
        );
    }
}
