//! Kitty graphics protocol commands used to present frames

use std::io::{self, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Escape sequence bytes.
const ESC: u8 = 0x1B;
const APC_START: &[u8] = &[ESC, b'_', b'G'];
const APC_END: &[u8] = &[ESC, b'\\'];

/// Pixel format code for 32-bit RGBA.
const FORMAT_RGBA: u8 = 32;

/// Quiet mode for terminal responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quiet {
    /// Terminal responds to all commands.
    #[default]
    Normal,
    /// Terminal only responds on errors.
    ErrorsOnly,
    /// Terminal never responds.
    Silent,
}

impl Quiet {
    fn code(self) -> Option<u8> {
        match self {
            Quiet::Normal => None,
            Quiet::ErrorsOnly => Some(1),
            Quiet::Silent => Some(2),
        }
    }
}

fn write_command<W: Write>(writer: &mut W, params: &str, payload: &[u8]) -> io::Result<()> {
    writer.write_all(APC_START)?;
    writer.write_all(params.as_bytes())?;
    if !payload.is_empty() {
        writer.write_all(b";")?;
        writer.write_all(payload)?;
    }
    writer.write_all(APC_END)
}

/// Transmit-and-display of an RGBA frame held in POSIX shared memory.
///
/// The terminal maps the object named by the payload, copies the pixels and
/// unlinks the name.
pub struct TransmitCommand {
    width: u32,
    height: u32,
    image_id: Option<u32>,
    placement_id: Option<u32>,
    quiet: Quiet,
    no_cursor_move: bool,
}

impl TransmitCommand {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            image_id: None,
            placement_id: None,
            quiet: Quiet::default(),
            no_cursor_move: true,
        }
    }

    /// Reusing an image ID replaces the previous image in place.
    pub fn image_id(mut self, id: u32) -> Self {
        self.image_id = Some(id);
        self
    }

    pub fn placement_id(mut self, id: u32) -> Self {
        self.placement_id = Some(id);
        self
    }

    pub fn quiet(mut self, quiet: Quiet) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn no_cursor_move(mut self, no_move: bool) -> Self {
        self.no_cursor_move = no_move;
        self
    }

    /// Writes `ESC_G<params>;<base64 shm path>ESC\`.
    pub fn write_to<W: Write>(&self, writer: &mut W, shm_path: &str) -> io::Result<()> {
        let mut params = format!(
            "a=T,t=s,f={FORMAT_RGBA},s={},v={}",
            self.width, self.height
        );

        if let Some(id) = self.image_id {
            params.push_str(&format!(",i={id}"));
        }
        if let Some(id) = self.placement_id {
            params.push_str(&format!(",p={id}"));
        }
        if self.no_cursor_move {
            params.push_str(",C=1");
        }
        if let Some(q) = self.quiet.code() {
            params.push_str(&format!(",q={q}"));
        }

        let payload = BASE64.encode(shm_path.as_bytes());
        write_command(writer, &params, payload.as_bytes())
    }
}

/// Removes an image and frees its memory in the terminal.
pub struct DeleteCommand {
    image_id: u32,
    quiet: Quiet,
}

impl DeleteCommand {
    pub fn by_id(image_id: u32) -> Self {
        Self {
            image_id,
            quiet: Quiet::default(),
        }
    }

    pub fn quiet(mut self, quiet: Quiet) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut params = format!("a=d,d=I,i={}", self.image_id);
        if let Some(q) = self.quiet.code() {
            params.push_str(&format!(",q={q}"));
        }
        write_command(writer, &params, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transmit_names_shm_and_size() {
        let mut output = Vec::new();
        TransmitCommand::new(100, 50)
            .image_id(7)
            .placement_id(1)
            .quiet(Quiet::Silent)
            .write_to(&mut output, "/pagebridge_test")
            .unwrap();

        let output_str = String::from_utf8_lossy(&output);
        assert!(output_str.starts_with("\x1b_G"));
        assert!(output_str.ends_with("\x1b\\"));
        assert!(output_str.contains("a=T,t=s,f=32,s=100,v=50"));
        assert!(output_str.contains(",i=7,p=1,C=1,q=2;"));

        let payload = output_str
            .trim_end_matches("\x1b\\")
            .rsplit(';')
            .next()
            .unwrap();
        assert_eq!(BASE64.decode(payload).unwrap(), b"/pagebridge_test");
    }

    #[test]
    fn transmit_can_move_cursor() {
        let mut output = Vec::new();
        TransmitCommand::new(1, 1)
            .no_cursor_move(false)
            .write_to(&mut output, "/x")
            .unwrap();

        assert!(!String::from_utf8_lossy(&output).contains("C=1"));
    }

    #[test]
    fn delete_by_id_has_no_payload() {
        let mut output = Vec::new();
        DeleteCommand::by_id(3)
            .quiet(Quiet::ErrorsOnly)
            .write_to(&mut output)
            .unwrap();

        assert_eq!(output, b"\x1b_Ga=d,d=I,i=3,q=1\x1b\\");
    }
}
