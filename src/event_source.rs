pub use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::io;
use std::time::Duration;

/// Trait for abstracting terminal input to enable testing
pub trait EventSource {
    /// Poll for events with a timeout
    fn poll(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Read the next event, blocking until one arrives
    fn read(&mut self) -> io::Result<Event>;

    /// Terminal size in pixels, if the terminal reports it
    fn pixel_size(&mut self) -> Option<(u32, u32)>;
}

/// Real terminal event source using crossterm
pub struct TerminalEventSource;

impl EventSource for TerminalEventSource {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        crossterm::event::poll(timeout)
    }

    fn read(&mut self) -> io::Result<Event> {
        crossterm::event::read()
    }

    fn pixel_size(&mut self) -> Option<(u32, u32)> {
        let size = crossterm::terminal::window_size().ok()?;
        if size.width == 0 || size.height == 0 {
            return None;
        }
        Some((u32::from(size.width), u32::from(size.height)))
    }
}

/// Simulated event source for testing
pub struct SimulatedEventSource {
    pub(crate) events: Vec<Event>,
    current_index: usize,
    pub pixel_size: Option<(u32, u32)>,
}

impl SimulatedEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            current_index: 0,
            pixel_size: None,
        }
    }

    /// Helper method to create a key event
    pub fn key_event(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Self::key_event_of_kind(code, modifiers, KeyEventKind::Press)
    }

    pub fn key_event_of_kind(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            state: crossterm::event::KeyEventState::empty(),
        })
    }

    /// Helper method to create a simple character key event
    pub fn char_key(c: char) -> Event {
        Self::key_event(KeyCode::Char(c), KeyModifiers::empty())
    }

    /// Helper method to create a Ctrl+char key event
    pub fn ctrl_char_key(c: char) -> Event {
        Self::key_event(KeyCode::Char(c), KeyModifiers::CONTROL)
    }
}

impl EventSource for SimulatedEventSource {
    fn poll(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(self.current_index < self.events.len())
    }

    fn read(&mut self) -> io::Result<Event> {
        if self.current_index < self.events.len() {
            let event = self.events[self.current_index].clone();
            self.current_index += 1;
            Ok(event)
        } else {
            // Exhausted input behaves like the user quitting
            Ok(SimulatedEventSource::char_key('q'))
        }
    }

    fn pixel_size(&mut self) -> Option<(u32, u32)> {
        self.pixel_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_event_source() {
        let events = vec![
            SimulatedEventSource::char_key('n'),
            SimulatedEventSource::key_event(KeyCode::Enter, KeyModifiers::empty()),
            SimulatedEventSource::ctrl_char_key('c'),
        ];

        let mut source = SimulatedEventSource::new(events);

        // Should have events available
        assert!(source.poll(Duration::from_millis(0)).unwrap());

        if let Event::Key(key) = source.read().unwrap() {
            assert_eq!(key.code, KeyCode::Char('n'));
            assert!(key.modifiers.is_empty());
        }

        if let Event::Key(key) = source.read().unwrap() {
            assert_eq!(key.code, KeyCode::Enter);
        }

        if let Event::Key(key) = source.read().unwrap() {
            assert_eq!(key.code, KeyCode::Char('c'));
            assert!(key.modifiers.contains(KeyModifiers::CONTROL));
        }

        // No more events
        assert!(!source.poll(Duration::from_millis(0)).unwrap());

        // Reading past the end quits
        if let Event::Key(key) = source.read().unwrap() {
            assert_eq!(key.code, KeyCode::Char('q'));
        }
    }
}
