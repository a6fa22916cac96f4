//! Read-through cache over the published gallery listing.
//!
//! Keyed by the normalized query (search, filter, pagination). Publish and
//! unpublish invalidate every page since any of them may now be stale. A page
//! loaded across an invalidation is returned but not cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::Clock;
use crate::db::models::{GalleryPage, GalleryQuery};
use crate::error::AppError;

use super::cache::{CachePolicy, TtlCache};

pub const MAX_PAGE_SIZE: u32 = 100;

pub struct GalleryBrowseCache {
    pages: TtlCache<GalleryQuery, GalleryPage>,
    /// Bumped by every invalidation.
    generation: AtomicU64,
}

impl GalleryBrowseCache {
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            pages: TtlCache::new(policy, clock),
            generation: AtomicU64::new(0),
        }
    }

    /// Cached page for `query`, loading through `load` on a miss.
    pub fn browse<F>(&self, query: &GalleryQuery, load: F) -> Result<GalleryPage, AppError>
    where
        F: FnOnce(&GalleryQuery) -> Result<GalleryPage, AppError>,
    {
        let key = normalize_query(query);
        if let Some(page) = self.pages.get(&key) {
            tracing::debug!(page = key.page, "gallery cache hit");
            return Ok(page);
        }
        let generation = self.generation.load(Ordering::Acquire);
        let page = load(&key)?;
        self.pages.insert(key.clone(), page.clone());
        // An invalidation that bumped the generation before this check is
        // undone here; one that bumps after it clears the page itself.
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(page = key.page, "gallery invalidated during load, not caching");
            self.pages.invalidate(&key);
        }
        Ok(page)
    }

    pub fn invalidate_all(&self) {
        tracing::debug!(cached_pages = self.pages.len(), "invalidating gallery cache");
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.pages.invalidate_all();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Canonical form so equivalent queries share a cache slot.
pub fn normalize_query(query: &GalleryQuery) -> GalleryQuery {
    let clean = |s: &Option<String>| {
        s.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    GalleryQuery {
        search: clean(&query.search).map(|s| s.to_lowercase()),
        app_type: clean(&query.app_type),
        page: query.page.max(1),
        page_size: query.page_size.clamp(1, MAX_PAGE_SIZE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::Cell;

    fn page(total: i64) -> GalleryPage {
        GalleryPage {
            entries: vec![],
            total,
            page: 1,
            page_size: 20,
        }
    }

    #[test]
    fn test_equivalent_queries_share_slot() {
        let cache = GalleryBrowseCache::new(CachePolicy::new(300, 1800), Arc::new(ManualClock::default()));
        let loads = Cell::new(0);
        let q1 = GalleryQuery {
            search: Some("  Fitness ".into()),
            page: 0,
            ..Default::default()
        };
        let q2 = GalleryQuery {
            search: Some("fitness".into()),
            page: 1,
            ..Default::default()
        };
        for q in [&q1, &q2] {
            let p = cache
                .browse(q, |_| {
                    loads.set(loads.get() + 1);
                    Ok(page(3))
                })
                .unwrap();
            assert_eq!(p.total, 3);
        }
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn test_invalidation_forces_reload() {
        let cache = GalleryBrowseCache::new(CachePolicy::new(300, 1800), Arc::new(ManualClock::default()));
        let q = GalleryQuery::default();
        cache.browse(&q, |_| Ok(page(1))).unwrap();
        cache.invalidate_all();
        assert!(cache.is_empty());
        let p = cache.browse(&q, |_| Ok(page(2))).unwrap();
        assert_eq!(p.total, 2);
    }

    #[test]
    fn test_page_loaded_across_invalidation_is_not_cached() {
        let cache = GalleryBrowseCache::new(CachePolicy::new(300, 1800), Arc::new(ManualClock::default()));
        let q = GalleryQuery::default();
        let stale = cache
            .browse(&q, |_| {
                cache.invalidate_all();
                Ok(page(1))
            })
            .unwrap();
        assert_eq!(stale.total, 1);
        assert!(cache.is_empty());

        let fresh = cache.browse(&q, |_| Ok(page(2))).unwrap();
        assert_eq!(fresh.total, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_load_errors_are_not_cached() {
        let cache = GalleryBrowseCache::new(CachePolicy::new(300, 1800), Arc::new(ManualClock::default()));
        let q = GalleryQuery::default();
        assert!(cache
            .browse(&q, |_| Err(AppError::Internal("db down".into())))
            .is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_normalize_clamps_page_size() {
        let q = normalize_query(&GalleryQuery {
            page_size: 1_000,
            app_type: Some(" ".into()),
            ..Default::default()
        });
        assert_eq!(q.page_size, MAX_PAGE_SIZE);
        assert_eq!(q.app_type, None);
    }
}
