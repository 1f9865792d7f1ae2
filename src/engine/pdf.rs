//! MuPDF-backed engine

use std::path::Path;

use mupdf::{Colorspace, Device, Document, Matrix, Page, Pixmap};

use super::Engine;
use crate::error::EngineError;
use crate::geometry::{BYTES_PER_PIXEL, DisplayGeometry, Rect, Transform};
use crate::pixmap::HostPixmap;

/// Engine backed by the process-wide MuPDF context
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfEngine;

/// Draw device bound to a staging RGBA pixmap.
///
/// MuPDF's binding cannot wrap foreign memory, so the device draws into a
/// pixmap of its own with the host buffer's exact size and resolution.
/// Host pixels are loaded before each run and stored back after it.
pub struct MupdfDevice {
    // Declared first so the device is dropped before the pixmap it draws into.
    device: Device,
    pixmap: Pixmap,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for MupdfDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MupdfDevice")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl MupdfDevice {
    fn check_shape(&self, pixmap: &HostPixmap<'_>) -> Result<(), EngineError> {
        if pixmap.width() != self.width || pixmap.height() != self.height {
            return Err(EngineError::generic(format!(
                "device built for {}x{} but buffer is {}x{}",
                self.width,
                self.height,
                pixmap.width(),
                pixmap.height()
            )));
        }
        Ok(())
    }

    fn staging_layout(&self) -> Result<(usize, usize), EngineError> {
        let n = self.pixmap.n() as usize;
        if n != BYTES_PER_PIXEL {
            return Err(EngineError::generic(format!(
                "Unsupported pixmap format: {n} channels"
            )));
        }
        let stride = self.pixmap.stride() as usize;
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        if row_bytes > stride {
            return Err(EngineError::generic("Pixmap buffer size mismatch"));
        }
        Ok((stride, row_bytes))
    }

    fn load(&mut self, source: &HostPixmap<'_>) -> Result<(), EngineError> {
        let (stride, row_bytes) = self.staging_layout()?;
        let samples = self.pixmap.samples_mut();
        for y in 0..self.height {
            let start = y as usize * stride;
            samples[start..start + row_bytes].copy_from_slice(source.row(y));
        }
        Ok(())
    }

    fn store(&self, target: &mut HostPixmap<'_>) -> Result<(), EngineError> {
        let (stride, row_bytes) = self.staging_layout()?;
        let samples = self.pixmap.samples();
        for y in 0..self.height {
            let start = y as usize * stride;
            target
                .row_mut(y)
                .copy_from_slice(&samples[start..start + row_bytes]);
        }
        Ok(())
    }
}

fn to_matrix(transform: &Transform) -> Matrix {
    let [a, b, c, d, e, f] = transform.matrix();
    Matrix::new(a, b, c, d, e, f)
}

fn to_i32(value: u32, what: &str) -> Result<i32, EngineError> {
    i32::try_from(value).map_err(|_| EngineError::generic(format!("{what} {value} out of range")))
}

impl Engine for MupdfEngine {
    type Document = Document;
    type Page = Page;
    type Device = MupdfDevice;

    fn open(&self, path: &Path) -> Result<Document, EngineError> {
        Ok(Document::open(path.to_string_lossy().as_ref())?)
    }

    fn page_count(&self, doc: &Document) -> Result<usize, EngineError> {
        Ok(doc.page_count()?.max(0) as usize)
    }

    fn load_page(&self, doc: &Document, index: i64) -> Result<Page, EngineError> {
        let index = i32::try_from(index)
            .map_err(|_| EngineError::generic(format!("page index {index} out of range")))?;
        Ok(doc.load_page(index)?)
    }

    fn bound_page(&self, page: &Page, transform: &Transform) -> Result<Rect, EngineError> {
        let bounds = page.bounds()?;
        Ok(transform.apply(Rect::new(bounds.x0, bounds.y0, bounds.x1, bounds.y1)))
    }

    fn new_draw_device(&self, geometry: &DisplayGeometry) -> Result<MupdfDevice, EngineError> {
        let width = to_i32(geometry.width, "width")?;
        let height = to_i32(geometry.height, "height")?;

        let rgb = Colorspace::device_rgb();
        let mut pixmap = Pixmap::new_with_w_h(&rgb, width, height, true)?;
        let dpi = geometry.dpi().round() as i32;
        pixmap.set_resolution(dpi, dpi);

        let device = Device::from_pixmap(&pixmap)?;

        Ok(MupdfDevice {
            device,
            pixmap,
            width: geometry.width,
            height: geometry.height,
        })
    }

    fn run_page_contents(
        &self,
        page: &Page,
        device: &mut MupdfDevice,
        pixmap: &mut HostPixmap<'_>,
        transform: &Transform,
    ) -> Result<(), EngineError> {
        device.check_shape(pixmap)?;
        device.load(pixmap)?;
        page.run_contents(&device.device, &to_matrix(transform))?;
        device.store(pixmap)
    }
}
