//! Display host backed by a terminal that speaks the Kitty graphics protocol
//!
//! The buffer lives in a shared-memory segment owned by the bridge. Each
//! frame is copied into a one-shot segment whose name is sent to the
//! terminal; the terminal maps it, copies the pixels and unlinks the name.
//! Names the terminal never gets to are unlinked by the [`FrameTracker`].

use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::{cursor, event, execute, queue, terminal};
use log::{debug, info, warn};

use super::protocol::{DeleteCommand, Quiet, TransmitCommand};
use super::segment::Segment;
use super::tracker::FrameTracker;
use super::{ButtonLabel, DisplayBridge, DisplayHint, HostEvent, SeekTarget};
use crate::error::BridgeError;
use crate::event_source::{Event, EventSource, KeyCode, KeyEventKind, KeyModifiers, TerminalEventSource};
use crate::geometry::DisplayGeometry;
use crate::pixmap::HostPixmap;

/// Largest buffer side the terminal is asked to show.
pub const MAX_DIMENSION: u32 = 10_000;

/// Size used when the terminal does not report its pixel size.
const FALLBACK_SIZE: (u32, u32) = (800, 600);

const IMAGE_ID: u32 = 1;
const PLACEMENT_ID: u32 = 1;

/// A terminal event, translated
#[derive(Debug, PartialEq)]
enum Incoming {
    Event(HostEvent),
    Closed,
}

fn button(label: ButtonLabel, kind: KeyEventKind) -> Incoming {
    Incoming::Event(HostEvent::Button {
        label,
        active: kind != KeyEventKind::Release,
    })
}

fn translate(event: Event, pixel_size: impl FnOnce() -> Option<(u32, u32)>) -> Incoming {
    match event {
        Event::Key(key) => {
            let pressed = key.kind != KeyEventKind::Release;
            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    if pressed {
                        Incoming::Closed
                    } else {
                        Incoming::Event(HostEvent::Other)
                    }
                }
                KeyCode::Char('q') | KeyCode::Esc => {
                    if pressed {
                        Incoming::Closed
                    } else {
                        Incoming::Event(HostEvent::Other)
                    }
                }
                KeyCode::Enter
                | KeyCode::Char(' ')
                | KeyCode::Char('n')
                | KeyCode::Char('j')
                | KeyCode::Right
                | KeyCode::Down
                | KeyCode::PageDown => button(ButtonLabel::Activate, key.kind),
                KeyCode::Char('p')
                | KeyCode::Char('k')
                | KeyCode::Left
                | KeyCode::Up
                | KeyCode::PageUp => button(ButtonLabel::PreviousPage, key.kind),
                KeyCode::Home if pressed => {
                    Incoming::Event(HostEvent::ContentSeek(SeekTarget::First))
                }
                KeyCode::End if pressed => Incoming::Event(HostEvent::ContentSeek(SeekTarget::Last)),
                _ => Incoming::Event(HostEvent::Other),
            }
        }
        Event::Paste(text) => Incoming::Event(HostEvent::BufferChunkIn(text)),
        Event::Resize(columns, rows) => {
            let hint = match pixel_size() {
                Some((width, height)) => DisplayHint::size(width, height),
                None => {
                    debug!("resize to {columns}x{rows} cells without a pixel size");
                    DisplayHint::default()
                }
            };
            Incoming::Event(HostEvent::DisplayHint(hint))
        }
        _ => Incoming::Event(HostEvent::Other),
    }
}

/// Kitty-graphics display host.
pub struct KittyBridge<S: EventSource = TerminalEventSource, W: Write = Stdout> {
    source: S,
    out: W,
    prefix: String,
    segment: Option<Segment>,
    handed: FrameTracker,
    geometry: DisplayGeometry,
    generation: u64,
    frame_seq: u64,
    closed: bool,
    owns_terminal: bool,
}

impl KittyBridge {
    /// Takes over the controlling terminal.
    ///
    /// `density` is the initial density in pixels per centimetre; terminals
    /// have no way of reporting one.
    pub fn connect(density: f32) -> Result<Self, BridgeError> {
        let mut source = TerminalEventSource;
        let (width, height) = source.pixel_size().unwrap_or_else(|| {
            warn!(
                "terminal did not report a pixel size, assuming {}x{}",
                FALLBACK_SIZE.0, FALLBACK_SIZE.1
            );
            FALLBACK_SIZE
        });

        terminal::enable_raw_mode()?;
        let mut out = io::stdout();
        if let Err(e) = execute!(
            out,
            terminal::EnterAlternateScreen,
            cursor::Hide,
            event::EnableBracketedPaste
        ) {
            restore_terminal(&mut out);
            return Err(e.into());
        }

        let mut bridge = Self::with_parts(source, out, density);
        bridge.owns_terminal = true;
        bridge.resize(width, height)?;
        info!("connected to terminal at {width}x{height}");
        Ok(bridge)
    }
}

impl<S: EventSource, W: Write> KittyBridge<S, W> {
    /// Bridge over an arbitrary input source and output, without touching
    /// terminal modes. It has no buffer until the first resize.
    pub fn with_parts(source: S, out: W, density: f32) -> Self {
        Self {
            source,
            out,
            prefix: format!("pagebridge_{}", std::process::id()),
            segment: None,
            handed: FrameTracker::new(),
            geometry: DisplayGeometry::packed(0, 0, density),
            generation: 0,
            frame_seq: 0,
            closed: false,
            owns_terminal: false,
        }
    }

    /// Overrides the shared-memory name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn next_event(&mut self, blocking: bool) -> Result<Option<HostEvent>, BridgeError> {
        if self.closed {
            return Ok(None);
        }
        if !blocking && !self.source.poll(Duration::ZERO)? {
            return Ok(None);
        }

        let event = self.source.read()?;
        let source = &mut self.source;
        match translate(event, || source.pixel_size()) {
            Incoming::Event(event) => Ok(Some(event)),
            Incoming::Closed => {
                info!("terminal input closed");
                self.closed = true;
                Ok(None)
            }
        }
    }
}

impl<S: EventSource, W: Write> DisplayBridge for KittyBridge<S, W> {
    fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), BridgeError> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(BridgeError::InvalidSize { width, height });
        }
        if self.segment.is_some() && (width, height) == (self.geometry.width, self.geometry.height)
        {
            return Ok(());
        }

        // Old memory goes before the new segment is mapped.
        self.segment = None;
        self.generation += 1;
        let geometry = DisplayGeometry::packed(width, height, self.geometry.density);
        let path = format!("/{}_buf_{}", self.prefix, self.generation);
        self.segment = Some(Segment::create(&path, geometry.byte_len())?);
        self.geometry = geometry;
        debug!("buffer resized to {width}x{height}");
        Ok(())
    }

    fn pixmap(&mut self) -> Option<HostPixmap<'_>> {
        let segment = self.segment.as_mut()?;
        HostPixmap::wrap(segment.as_mut_slice(), &self.geometry)
    }

    fn signal_frame_ready(&mut self) -> Result<(), BridgeError> {
        let Some(segment) = self.segment.as_ref() else {
            return Err(BridgeError::Io(io::Error::other("no buffer to present")));
        };

        self.frame_seq += 1;
        let path = format!("/{}_frame_{}", self.prefix, self.frame_seq);
        let frame = Segment::with_contents(&path, &segment.as_slice()[..self.geometry.byte_len()])?;

        queue!(self.out, cursor::MoveTo(0, 0))?;
        TransmitCommand::new(self.geometry.width, self.geometry.height)
            .image_id(IMAGE_ID)
            .placement_id(PLACEMENT_ID)
            .quiet(Quiet::Silent)
            .write_to(&mut self.out, frame.path())?;
        self.out.flush()?;

        // Only once the name reached the terminal; otherwise the drop unlinks it.
        let size = frame.len();
        self.handed.register(frame.hand_off(), size);
        Ok(())
    }

    fn wait_event(&mut self) -> Result<Option<HostEvent>, BridgeError> {
        self.next_event(true)
    }

    fn poll_event(&mut self) -> Result<Option<HostEvent>, BridgeError> {
        self.next_event(false)
    }
}

impl<S: EventSource, W: Write> Drop for KittyBridge<S, W> {
    fn drop(&mut self) {
        if !self.owns_terminal {
            return;
        }
        let _ = DeleteCommand::by_id(IMAGE_ID)
            .quiet(Quiet::Silent)
            .write_to(&mut self.out);
        restore_terminal(&mut self.out);
    }
}

fn restore_terminal<W: Write>(out: &mut W) {
    let _ = execute!(
        out,
        event::DisableBracketedPaste,
        cursor::Show,
        terminal::LeaveAlternateScreen
    );
    let _ = terminal::disable_raw_mode();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::segment::live_segments;
    use crate::bridge::tracker::HARD_LIMIT;
    use crate::dispatcher::EventDispatcher;
    use crate::event_source::SimulatedEventSource;
    use crate::geometry::FitMode;
    use crate::pixmap::WHITE;
    use crate::session::DocumentSession;
    use crate::test_utils::mock::MockEngine;
    use serial_test::serial;
    use std::ffi::CString;

    /// Output that never accepts a byte
    struct StalledWriter;

    impl Write for StalledWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn shm_exists(path: &str) -> bool {
        let c_path = CString::new(path).unwrap();
        let fd = unsafe { libc::shm_open(c_path.as_ptr(), libc::O_RDONLY, 0) };
        if fd >= 0 {
            unsafe { libc::close(fd) };
            true
        } else {
            false
        }
    }

    fn key(code: KeyCode) -> Event {
        SimulatedEventSource::key_event(code, KeyModifiers::empty())
    }

    fn bridge(events: Vec<Event>) -> KittyBridge<SimulatedEventSource, Vec<u8>> {
        let prefix = format!("pagebridge_kitty_test_{}", std::process::id());
        KittyBridge::with_parts(SimulatedEventSource::new(events), Vec::new(), 38.4)
            .with_prefix(prefix)
    }

    #[test]
    fn keys_map_to_buttons() {
        assert_eq!(translate(key(KeyCode::Enter), || None), Incoming::Event(HostEvent::activate()));
        assert_eq!(
            translate(key(KeyCode::Left), || None),
            Incoming::Event(HostEvent::Button {
                label: ButtonLabel::PreviousPage,
                active: true
            })
        );

        let release = SimulatedEventSource::key_event_of_kind(
            KeyCode::Char('n'),
            KeyModifiers::empty(),
            KeyEventKind::Release,
        );
        assert_eq!(
            translate(release, || None),
            Incoming::Event(HostEvent::Button {
                label: ButtonLabel::Activate,
                active: false
            })
        );
    }

    #[test]
    fn quit_keys_close_the_connection() {
        assert_eq!(translate(key(KeyCode::Esc), || None), Incoming::Closed);
        assert_eq!(translate(SimulatedEventSource::char_key('q'), || None), Incoming::Closed);
        assert_eq!(
            translate(SimulatedEventSource::ctrl_char_key('c'), || None),
            Incoming::Closed
        );
    }

    #[test]
    fn resize_becomes_display_hint() {
        assert_eq!(
            translate(Event::Resize(80, 24), || Some((1280, 768))),
            Incoming::Event(HostEvent::DisplayHint(DisplayHint::size(1280, 768)))
        );
        assert_eq!(
            translate(Event::Resize(80, 24), || None),
            Incoming::Event(HostEvent::DisplayHint(DisplayHint::default()))
        );
    }

    #[test]
    fn paste_and_seek_keys_are_stub_events() {
        assert_eq!(
            translate(Event::Paste("/tmp/doc.pdf".into()), || None),
            Incoming::Event(HostEvent::BufferChunkIn("/tmp/doc.pdf".into()))
        );
        assert_eq!(
            translate(key(KeyCode::End), || None),
            Incoming::Event(HostEvent::ContentSeek(SeekTarget::Last))
        );
        assert_eq!(translate(Event::FocusGained, || None), Incoming::Event(HostEvent::Other));
    }

    #[test]
    fn polling_stops_after_close() {
        let mut bridge = bridge(vec![
            key(KeyCode::Enter),
            SimulatedEventSource::char_key('q'),
            key(KeyCode::Enter),
        ]);

        assert_eq!(bridge.wait_event().unwrap(), Some(HostEvent::activate()));
        assert_eq!(bridge.poll_event().unwrap(), None);
        assert_eq!(bridge.wait_event().unwrap(), None);
    }

    #[test]
    #[serial]
    fn resize_replaces_the_buffer() {
        let mut bridge = bridge(Vec::new());
        assert!(bridge.pixmap().is_none());

        bridge.resize(4, 3).unwrap();
        let first = bridge.generation();
        assert_eq!(bridge.geometry().stride, 16);
        assert_eq!(bridge.pixmap().unwrap().height(), 3);

        bridge.resize(4, 3).unwrap();
        assert_eq!(bridge.generation(), first);

        bridge.resize(8, 2).unwrap();
        assert_eq!(bridge.generation(), first + 1);
        assert_eq!(bridge.pixmap().unwrap().width(), 8);
    }

    #[test]
    fn oversized_resize_is_refused() {
        let mut bridge = bridge(Vec::new());
        let err = bridge.resize(MAX_DIMENSION + 1, 10).err().unwrap();
        assert!(matches!(err, BridgeError::InvalidSize { .. }));
    }

    #[test]
    #[serial]
    fn frame_is_transmitted_through_shared_memory() {
        let mut bridge = bridge(Vec::new());
        bridge.resize(2, 2).unwrap();
        bridge.pixmap().unwrap().fill(WHITE);

        bridge.signal_frame_ready().unwrap();

        let output = String::from_utf8_lossy(bridge.output()).to_string();
        assert!(output.contains("a=T,t=s,f=32,s=2,v=2,i=1,p=1"));

        let frame = format!("/pagebridge_kitty_test_{}_frame_1", std::process::id());
        assert!(shm_exists(&frame));
        drop(bridge);
        assert!(!shm_exists(&frame));
    }

    #[test]
    #[serial]
    fn unread_frames_stay_bounded() {
        let before = live_segments();
        let mut bridge = bridge(Vec::new());
        bridge.resize(100, 100).unwrap();

        for _ in 0..50 {
            bridge.signal_frame_ready().unwrap();
        }

        let prefix = format!("/pagebridge_kitty_test_{}_frame_", std::process::id());
        let left = (1..=50)
            .filter(|seq| shm_exists(&format!("{prefix}{seq}")))
            .count();
        assert!(left <= HARD_LIMIT, "{left} frames left in shared memory");

        drop(bridge);
        assert_eq!(live_segments(), before);
        assert!((1..=50).all(|seq| !shm_exists(&format!("{prefix}{seq}"))));
    }

    #[test]
    #[serial]
    fn stalled_output_drops_frames_but_keeps_dispatching() {
        let engine = MockEngine::with_pages(3);
        let session = DocumentSession::open(engine, "doc.pdf").unwrap();
        let mut bridge = KittyBridge::with_parts(
            SimulatedEventSource::new(vec![key(KeyCode::Enter)]),
            StalledWriter,
            38.4,
        )
        .with_prefix(format!("pagebridge_kitty_stall_{}", std::process::id()));
        bridge.resize(64, 48).unwrap();
        let before = live_segments();

        let mut d = EventDispatcher::new(session, bridge, FitMode::Fixed);
        d.start();
        assert!(d.run_batch().unwrap());

        assert_eq!(d.session().current_page(), 1);
        assert_eq!(d.stats().failed_renders, 2);
        assert_eq!(d.stats().frames, 0);
        // Frames that never reached the terminal are unlinked right away.
        assert_eq!(live_segments(), before);
        assert!(!d.run_batch().unwrap());
    }

    #[test]
    fn frame_without_buffer_fails() {
        let mut bridge = bridge(Vec::new());
        assert!(bridge.signal_frame_ready().is_err());
    }
}
