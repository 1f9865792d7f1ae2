//! Buffer geometry, page rectangles and the page transform

use serde::{Deserialize, Serialize};

/// Pixels in every host buffer are packed RGBA.
pub const BYTES_PER_PIXEL: usize = 4;

/// Host density is reported in pixels per centimetre, the rasterizer wants inches.
pub const CM_PER_INCH: f32 = 2.54;

/// Density assumed when nothing better is known (pixels per centimetre).
pub const DEFAULT_DENSITY: f32 = 38.4;

/// Shape of the shared pixel buffer as the host currently provides it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayGeometry {
    /// Buffer width in pixels
    pub width: u32,
    /// Buffer height in pixels
    pub height: u32,
    /// Bytes between the starts of two consecutive rows
    pub stride: usize,
    /// Pixels per centimetre
    pub density: f32,
}

impl DisplayGeometry {
    /// Geometry with tightly packed rows.
    #[must_use]
    pub fn packed(width: u32, height: u32, density: f32) -> Self {
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            density,
        }
    }

    /// Resolution in dots per inch, the unit the rasterizer expects.
    #[must_use]
    pub fn dpi(&self) -> f32 {
        self.density * CM_PER_INCH
    }

    /// Bytes needed to back a buffer of this shape.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.stride * self.height as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Size and density the host last asked for through display hints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayHints {
    pub width: u32,
    pub height: u32,
    pub density: f32,
}

impl DisplayHints {
    #[must_use]
    pub fn from_geometry(geometry: &DisplayGeometry) -> Self {
        Self {
            width: geometry.width,
            height: geometry.height,
            density: geometry.density,
        }
    }
}

/// How the buffer size is chosen on every rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Buffer is sized to the page's bounding box at 100% scale
    #[default]
    Dynamic,
    /// Buffer keeps the size the host hinted
    Fixed,
}

impl FitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitMode::Dynamic => "dynamic",
            FitMode::Fixed => "fixed",
        }
    }
}

/// Rectangle in page space (points), or device space after a transform.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Smallest integer rectangle covering this one.
    ///
    /// Edges within 1/1000 of a pixel of an integer snap inward, so a box
    /// that is 612.0000x wide does not grow an extra column.
    #[must_use]
    pub fn round(&self) -> IRect {
        const EPSILON: f32 = 0.001;
        let clamp = |v: f32| v.clamp(i32::MIN as f32, i32::MAX as f32) as i32;

        IRect {
            x0: clamp((self.x0 + EPSILON).floor()),
            y0: clamp((self.y0 + EPSILON).floor()),
            x1: clamp((self.x1 - EPSILON).ceil()),
            y1: clamp((self.y1 - EPSILON).ceil()),
        }
    }
}

/// Integer pixel rectangle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct IRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl IRect {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0).max(0) as u32
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0).max(0) as u32
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Page-to-device transform: uniform scale followed by a rotation.
///
/// Only 100% and 0 degrees are used today.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Scale in percent
    pub scale_pct: u16,
    /// Clockwise rotation in degrees
    pub rotation: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            scale_pct: 100,
            rotation: 0.0,
        }
    }

    #[must_use]
    pub const fn new(scale_pct: u16, rotation: f32) -> Self {
        Self {
            scale_pct,
            rotation,
        }
    }

    /// Affine coefficients `[a, b, c, d, e, f]` mapping `(x, y)` to
    /// `(x*a + y*c + e, x*b + y*d + f)`.
    #[must_use]
    pub fn matrix(&self) -> [f32; 6] {
        let scale = f32::from(self.scale_pct) / 100.0;

        // Quarter turns are exact, anything else goes through sin/cos.
        let (cos, sin) = match self.rotation.rem_euclid(360.0) {
            r if r == 0.0 => (1.0, 0.0),
            r if r == 90.0 => (0.0, 1.0),
            r if r == 180.0 => (-1.0, 0.0),
            r if r == 270.0 => (0.0, -1.0),
            r => {
                let rad = r.to_radians();
                (rad.cos(), rad.sin())
            }
        };

        [scale * cos, scale * sin, -scale * sin, scale * cos, 0.0, 0.0]
    }

    /// Bounding box of `rect` after the transform.
    #[must_use]
    pub fn apply(&self, rect: Rect) -> Rect {
        let [a, b, c, d, e, f] = self.matrix();
        let corners = [
            (rect.x0, rect.y0),
            (rect.x1, rect.y0),
            (rect.x0, rect.y1),
            (rect.x1, rect.y1),
        ];

        let mut out = Rect::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for (x, y) in corners {
            let tx = x * a + y * c + e;
            let ty = x * b + y * d + f;
            out.x0 = out.x0.min(tx);
            out.y0 = out.y0.min(ty);
            out.x1 = out.x1.max(tx);
            out.y1 = out.y1.max(ty);
        }
        out
    }
}
