//! Connection to the display host that owns the shared pixel buffer

pub mod kitty;
pub mod protocol;
pub mod segment;
pub mod tracker;

pub use kitty::KittyBridge;

use crate::error::BridgeError;
use crate::geometry::DisplayGeometry;
use crate::pixmap::HostPixmap;

/// Input labels the bridge understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonLabel {
    /// Digital "activate", steps forward one page
    Activate,
    /// Steps back one page
    PreviousPage,
}

/// Size and density hint sent by the host.
///
/// Zero and missing values both mean "not part of this hint".
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DisplayHint {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Pixels per centimetre
    pub density: Option<f32>,
}

impl DisplayHint {
    #[must_use]
    pub fn size(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            density: None,
        }
    }

    #[must_use]
    pub fn density(density: f32) -> Self {
        Self {
            width: None,
            height: None,
            density: Some(density),
        }
    }
}

/// Where a content seek wants to go
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SeekTarget {
    First,
    Last,
    /// Fraction of the document, 0.0 to 1.0
    Relative(f32),
}

/// Events delivered by the display host.
///
/// The end of the stream (connection closed) is not an event: the bridge
/// reports it by returning `None` from [`DisplayBridge::wait_event`].
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    Button { label: ButtonLabel, active: bool },
    DisplayHint(DisplayHint),
    ContentSeek(SeekTarget),
    /// Incoming document data, described by whatever the host sent
    BufferChunkIn(String),
    Other,
}

impl HostEvent {
    /// Pressed "activate" button.
    #[must_use]
    pub fn activate() -> Self {
        Self::Button {
            label: ButtonLabel::Activate,
            active: true,
        }
    }
}

/// The host side of the shared buffer.
///
/// The bridge owns the pixel memory. Callers only ever borrow it through
/// [`DisplayBridge::pixmap`], and every resize may move it: `generation`
/// changes whenever the memory behind the buffer is replaced.
pub trait DisplayBridge {
    /// Current buffer geometry.
    fn geometry(&self) -> DisplayGeometry;

    /// Counter that changes every time the buffer memory is replaced.
    fn generation(&self) -> u64;

    /// Asks the host for a buffer of `width` x `height` pixels.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), BridgeError>;

    /// Borrows the buffer memory, `None` if there is none to borrow.
    fn pixmap(&mut self) -> Option<HostPixmap<'_>>;

    /// Tells the host the buffer holds a new frame. Does not wait for it.
    fn signal_frame_ready(&mut self) -> Result<(), BridgeError>;

    /// Blocks until the next event, `None` once the connection is closed.
    fn wait_event(&mut self) -> Result<Option<HostEvent>, BridgeError>;

    /// Next event if one is already queued.
    fn poll_event(&mut self) -> Result<Option<HostEvent>, BridgeError>;
}
