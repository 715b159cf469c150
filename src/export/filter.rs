//! Streaming line filter applied to message bodies on their way into an mbox.

use std::io::{self, Write};

const FROM: &[u8] = b"From ";

/// Wraps a writer and rewrites the byte stream for mbox storage:
///
/// - `\r\n` line endings become `\n`
/// - lines starting with `From ` are escaped as `>From ` so they cannot be
///   mistaken for a message separator
///
/// State is carried across `write` calls, so a `From ` prefix or a CRLF pair
/// split between two writes is still handled. Call [`MboxFilter::finish`]
/// to flush any held-back bytes.
pub struct MboxFilter<W: Write> {
    inner: W,
    at_line_start: bool,
    pending_cr: bool,
    /// Bytes at the start of a line that may still turn out to be `From `.
    prefix: Vec<u8>,
    out: Vec<u8>,
}

impl<W: Write> MboxFilter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            at_line_start: true,
            pending_cr: false,
            prefix: Vec::with_capacity(FROM.len()),
            out: Vec::new(),
        }
    }

    /// Emit held-back bytes and return the wrapped writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.pending_cr {
            self.pending_cr = false;
            self.push(b'\r');
        }
        self.out.append(&mut self.prefix);
        self.drain()?;
        Ok(self.inner)
    }

    fn push(&mut self, b: u8) {
        if b == b'\n' {
            self.out.append(&mut self.prefix);
            self.out.push(b'\n');
            self.at_line_start = true;
            return;
        }
        if !self.at_line_start {
            self.out.push(b);
            return;
        }
        self.prefix.push(b);
        if !FROM.starts_with(&self.prefix) {
            self.out.append(&mut self.prefix);
            self.at_line_start = false;
        } else if self.prefix.len() == FROM.len() {
            self.out.push(b'>');
            self.out.append(&mut self.prefix);
            self.at_line_start = false;
        }
    }

    fn drain(&mut self) -> io::Result<()> {
        if !self.out.is_empty() {
            self.inner.write_all(&self.out)?;
            self.out.clear();
        }
        Ok(())
    }
}

impl<W: Write> Write for MboxFilter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &b in buf {
            if self.pending_cr {
                self.pending_cr = false;
                if b == b'\n' {
                    self.push(b'\n');
                    continue;
                }
                self.push(b'\r');
            }
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                self.push(b);
            }
        }
        self.drain()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        self.inner.flush()
    }
}
