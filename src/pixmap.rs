//! Non-owning view of host pixel memory

use crate::geometry::{BYTES_PER_PIXEL, DisplayGeometry};

/// Opaque white, RGBA
pub const WHITE: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// RGBA pixels that belong to the display host.
///
/// The view only borrows the memory: whatever bridge handed it out keeps
/// ownership and is the only party that can release it. Rows are `stride`
/// bytes apart and only the first `width * 4` bytes of each row are pixels.
pub struct HostPixmap<'a> {
    pixels: &'a mut [u8],
    width: u32,
    height: u32,
    stride: usize,
}

impl<'a> HostPixmap<'a> {
    /// Wraps `pixels` with the layout described by `geometry`.
    ///
    /// Returns `None` when the slice is too small for the layout or the
    /// stride cannot hold a full row.
    pub fn wrap(pixels: &'a mut [u8], geometry: &DisplayGeometry) -> Option<Self> {
        let row_bytes = geometry.width as usize * BYTES_PER_PIXEL;
        if geometry.stride < row_bytes || pixels.len() < geometry.byte_len() {
            return None;
        }

        Some(Self {
            pixels,
            width: geometry.width,
            height: geometry.height,
            stride: geometry.stride,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Pixel bytes of row `y`, without the stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.pixels[start..start + self.row_bytes()]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.row_bytes();
        &mut self.pixels[start..start + len]
    }

    /// Sets every pixel, row by row, leaving stride padding untouched.
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for y in 0..self.height {
            for px in self.row_mut(y).chunks_exact_mut(BYTES_PER_PIXEL) {
                px.copy_from_slice(&rgba);
            }
        }
    }

    /// RGBA value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = x as usize * BYTES_PER_PIXEL;
        let row = self.row(y);
        [row[offset], row[offset + 1], row[offset + 2], row[offset + 3]]
    }
}

impl std::fmt::Debug for HostPixmap<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPixmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_rejects_short_buffers() {
        let geometry = DisplayGeometry::packed(4, 4, 38.4);
        let mut bytes = vec![0u8; 63];
        assert!(HostPixmap::wrap(&mut bytes, &geometry).is_none());
    }

    #[test]
    fn wrap_rejects_stride_narrower_than_a_row() {
        let mut geometry = DisplayGeometry::packed(4, 4, 38.4);
        geometry.stride = 12;
        let mut bytes = vec![0u8; 256];
        assert!(HostPixmap::wrap(&mut bytes, &geometry).is_none());
    }

    #[test]
    fn fill_skips_stride_padding() {
        let mut geometry = DisplayGeometry::packed(2, 2, 38.4);
        geometry.stride = 12;
        let mut bytes = vec![0u8; 24];

        let mut pixmap = HostPixmap::wrap(&mut bytes, &geometry).unwrap();
        pixmap.fill(WHITE);
        assert_eq!(pixmap.pixel(1, 1), WHITE);

        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
        assert_eq!(&bytes[20..24], &[0, 0, 0, 0]);
        assert!(bytes[..8].iter().all(|b| *b == 0xff));
    }
}
