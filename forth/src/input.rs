//! Input stream with a one-byte unread slot
//!
//! All stages share a single stdin; each consumes its prefix and leaves the
//! stream positioned for the next. The unread slot lets the lexer push back
//! the byte that terminated a token.

use std::io::Read;

pub struct InputStream {
    src: Box<dyn Read>,
    unread: Option<u8>,
}

impl InputStream {
    pub fn new(src: Box<dyn Read>) -> Self {
        Self { src, unread: None }
    }

    pub fn from_str(s: &str) -> Self {
        Self::new(Box::new(std::io::Cursor::new(s.as_bytes().to_vec())))
    }

    /// Read one byte. `None` at end of input.
    pub fn key(&mut self) -> std::io::Result<Option<u8>> {
        if let Some(b) = self.unread.take() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.src.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Push one byte back; the next `key` returns it. The slot holds a
    /// single byte.
    pub fn unread(&mut self, b: u8) {
        debug_assert!(self.unread.is_none());
        self.unread = Some(b);
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.unread.take() {
            buf[0] = b;
            return Ok(1);
        }
        self.src.read(buf)
    }
}
