//! Document engine interface
//!
//! Everything the bridge needs from a document renderer: opening a file,
//! counting and loading pages, measuring a page and rasterizing it into a
//! host pixmap through a draw device.

#[cfg(feature = "pdf")]
mod pdf;

#[cfg(feature = "pdf")]
pub use self::pdf::{MupdfDevice, MupdfEngine};

use std::path::Path;

use crate::error::EngineError;
use crate::geometry::{DisplayGeometry, Rect, Transform};
use crate::pixmap::HostPixmap;

/// A document renderer.
///
/// Pages are released by dropping them. A device is created for one buffer
/// layout and must be recreated whenever that layout changes.
pub trait Engine {
    type Document;
    type Page;
    type Device;

    /// Parses and validates the document at `path`.
    fn open(&self, path: &Path) -> Result<Self::Document, EngineError>;

    /// Number of pages, zero when the engine cannot tell.
    fn page_count(&self, doc: &Self::Document) -> Result<usize, EngineError>;

    fn load_page(&self, doc: &Self::Document, index: i64) -> Result<Self::Page, EngineError>;

    /// Bounding box of `page` in device space after `transform`.
    fn bound_page(&self, page: &Self::Page, transform: &Transform) -> Result<Rect, EngineError>;

    /// Creates a draw device for buffers shaped like `geometry`, with the
    /// resolution taken from its density.
    fn new_draw_device(&self, geometry: &DisplayGeometry) -> Result<Self::Device, EngineError>;

    /// Composites the page contents over whatever `pixmap` already holds.
    fn run_page_contents(
        &self,
        page: &Self::Page,
        device: &mut Self::Device,
        pixmap: &mut HostPixmap<'_>,
        transform: &Transform,
    ) -> Result<(), EngineError>;
}
