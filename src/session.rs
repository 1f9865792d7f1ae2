//! Open document and the currently selected page

use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::engine::Engine;
use crate::error::PagerError;
use crate::geometry::{Rect, Transform};

/// Owns the single open document and at most one loaded page.
///
/// A failed load leaves no page behind: the previous page is always
/// released before the next one is attempted, and renders no-op until a
/// later load succeeds. `current_page` keeps pointing at the last page that
/// loaded, so navigation resumes from there.
pub struct DocumentSession<E: Engine> {
    engine: E,
    path: PathBuf,
    document: E::Document,
    page_count: usize,
    page: Option<E::Page>,
    page_no: i64,
}

impl<E: Engine> DocumentSession<E> {
    /// Opens the document at `path`. Failure here is fatal for the process.
    pub fn open(engine: E, path: impl Into<PathBuf>) -> Result<Self, PagerError> {
        let path = path.into();
        let document = engine
            .open(&path)
            .map_err(|source| PagerError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        let page_count = engine.page_count(&document).unwrap_or_else(|e| {
            warn!("couldn't count pages of {}: {e}", path.display());
            0
        });
        info!("opened {} ({page_count} pages)", path.display());

        Ok(Self {
            engine,
            path,
            document,
            page_count,
            page: None,
            page_no: 0,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Page count as reported at open time, zero when unknown.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Index of the last page that loaded successfully.
    pub fn current_page(&self) -> i64 {
        self.page_no
    }

    pub fn page(&self) -> Option<&E::Page> {
        self.page.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.page.is_some()
    }

    /// Reduces `index` into the document's page range.
    ///
    /// With an unknown page count the index is passed through untouched.
    pub fn resolve_index(&self, index: i64) -> i64 {
        if self.page_count == 0 {
            index
        } else {
            index.rem_euclid(self.page_count as i64)
        }
    }

    /// Drops the current page, then loads page `index` modulo the page count.
    pub fn load_page(&mut self, index: i64) -> Result<&E::Page, PagerError> {
        if self.page.take().is_some() {
            debug!("released page {}", self.page_no);
        }

        let index = self.resolve_index(index);
        match self.engine.load_page(&self.document, index) {
            Ok(page) => {
                debug!("loaded page {index}");
                self.page_no = index;
                Ok(&*self.page.insert(page))
            }
            Err(source) => {
                error!("couldn't load page {index}: {source}");
                Err(PagerError::PageLoadFailed { index, source })
            }
        }
    }

    /// Loads the page `delta` steps away from the current one.
    pub fn advance(&mut self, delta: i64) -> Result<&E::Page, PagerError> {
        self.load_page(self.page_no.saturating_add(delta))
    }

    /// Bounding box of the loaded page after `transform`, if a page is loaded
    /// and the engine can measure it.
    pub fn page_bounds(&self, transform: &Transform) -> Option<Rect> {
        let page = self.page.as_ref()?;
        match self.engine.bound_page(page, transform) {
            Ok(rect) => Some(rect),
            Err(e) => {
                warn!("couldn't bound page {}: {e}", self.page_no);
                None
            }
        }
    }
}

impl<E: Engine> Drop for DocumentSession<E> {
    fn drop(&mut self) {
        // Pages go before the document they were loaded from.
        self.page = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock::MockEngine;

    fn session_with(engine: &MockEngine) -> DocumentSession<MockEngine> {
        DocumentSession::open(engine.clone(), "test.pdf").unwrap()
    }

    #[test]
    fn open_failure_is_reported() {
        let engine = MockEngine::with_pages(3);
        engine.fail_open(true);

        let err = DocumentSession::open(engine, "missing.pdf").err().unwrap();
        assert!(matches!(err, PagerError::OpenFailed { .. }));
    }

    #[test]
    fn every_valid_index_loads_and_holds_one_page() {
        let engine = MockEngine::with_pages(3);
        let mut session = session_with(&engine);

        for i in 0..9 {
            session.load_page(i).unwrap();
            assert_eq!(session.current_page(), i % 3);
            assert_eq!(engine.live_pages(), 1);
        }
    }

    #[test]
    fn unknown_page_count_uses_raw_index() {
        let engine = MockEngine::with_unknown_length(10);
        let mut session = session_with(&engine);
        assert_eq!(session.page_count(), 0);

        session.load_page(7).unwrap();
        assert_eq!(session.current_page(), 7);
        assert_eq!(engine.loaded_indices(), vec![7]);
    }

    #[test]
    fn failed_load_leaves_no_page() {
        let engine = MockEngine::with_pages(3);
        engine.fail_page(1);
        let mut session = session_with(&engine);

        session.load_page(0).unwrap();
        let err = session.advance(1).err().unwrap();

        assert!(matches!(err, PagerError::PageLoadFailed { index: 1, .. }));
        assert!(!session.is_loaded());
        assert_eq!(engine.live_pages(), 0);
        assert_eq!(session.current_page(), 0);
    }

    #[test]
    fn advance_wraps_both_ways() {
        let engine = MockEngine::with_pages(3);
        let mut session = session_with(&engine);

        session.load_page(0).unwrap();
        session.advance(-1).unwrap();
        assert_eq!(session.current_page(), 2);
        session.advance(1).unwrap();
        assert_eq!(session.current_page(), 0);
    }

    #[test]
    fn page_bounds_needs_a_page() {
        let engine = MockEngine::with_page_sizes(vec![(200.0, 100.0)]);
        let mut session = session_with(&engine);
        assert!(session.page_bounds(&Transform::identity()).is_none());

        session.load_page(0).unwrap();
        let rect = session.page_bounds(&Transform::identity()).unwrap();
        assert_eq!(rect, Rect::new(0.0, 0.0, 200.0, 100.0));
    }

    #[test]
    fn dropping_session_releases_page() {
        let engine = MockEngine::with_pages(2);
        {
            let mut session = session_with(&engine);
            session.load_page(1).unwrap();
            assert_eq!(engine.live_pages(), 1);
        }
        assert_eq!(engine.live_pages(), 0);
    }
}
