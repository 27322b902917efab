//! Terminal output line decoder.
//!
//! Tools like tqdm redraw a single progress line with carriage returns and
//! decorate it with escape sequences. [`LineDecoder`] runs a reduced VT
//! parser over the raw bytes: printable characters accumulate in a line
//! buffer, a carriage return or line feed completes the line, and every
//! control function (CSI, OSC, DCS, plain ESC sequences, BEL and friends) is
//! recognised and dropped.
//!
//! A CR immediately followed by LF counts as a single terminator so that
//! CRLF output does not produce a spurious empty line. Two consecutive LFs
//! still produce an empty line.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

const BEL: u8 = 0x07;
const LF: u8 = 0x0a;
const CR: u8 = 0x0d;
const CAN: u8 = 0x18;
const SUB: u8 = 0x1a;
const ESC: u8 = 0x1b;
const DEL: u8 = 0x7f;

/// Size of the read buffer used by [`decode_stream`].
const READ_CHUNK: usize = 4096;

/// Longest line kept in the buffer; longer output is split into lines of
/// this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    EscapeIntermediate,
    Csi,
    /// OSC string, terminated by BEL or ST.
    Osc,
    /// DCS, SOS, PM and APC strings, terminated by ST.
    IgnoredString,
}

/// Incremental decoder turning raw terminal output into completed lines.
#[derive(Debug)]
pub struct LineDecoder {
    state: State,
    line: Vec<u8>,
    after_cr: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            line: Vec::new(),
            after_cr: false,
        }
    }

    /// Feed one byte, returning a line if the byte completed one.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        let after_cr = std::mem::replace(&mut self.after_cr, false);

        match self.state {
            State::Ground => match byte {
                ESC => self.state = State::Escape,
                0x00..=0x1f => return self.execute(byte, after_cr),
                DEL => {}
                _ => {
                    self.line.push(byte);
                    if self.line.len() >= MAX_LINE_BYTES {
                        return Some(self.take_line());
                    }
                }
            },
            State::Escape => match byte {
                ESC => {}
                CAN | SUB => self.state = State::Ground,
                0x00..=0x1f => return self.execute(byte, after_cr),
                b'[' => self.state = State::Csi,
                b']' => self.state = State::Osc,
                b'P' | b'X' | b'^' | b'_' => self.state = State::IgnoredString,
                0x20..=0x2f => self.state = State::EscapeIntermediate,
                DEL => {}
                _ => self.state = State::Ground,
            },
            State::EscapeIntermediate | State::Csi => match byte {
                ESC => self.state = State::Escape,
                CAN | SUB => self.state = State::Ground,
                0x00..=0x1f => return self.execute(byte, after_cr),
                // Parameters and intermediates.
                0x20..=0x3f if self.state == State::Csi => {}
                0x20..=0x2f => {}
                DEL => {}
                _ => self.state = State::Ground,
            },
            State::Osc | State::IgnoredString => match byte {
                BEL if self.state == State::Osc => self.state = State::Ground,
                ESC => self.state = State::Escape,
                CAN | SUB => self.state = State::Ground,
                _ => {}
            },
        }
        None
    }

    /// Feed a chunk of bytes, returning every line it completed.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Flush the pending buffer at end of stream. Returns `None` when the
    /// buffer is empty.
    pub fn finish(&mut self) -> Option<String> {
        self.state = State::Ground;
        if self.line.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn execute(&mut self, byte: u8, after_cr: bool) -> Option<String> {
        match byte {
            CR => {
                self.after_cr = true;
                Some(self.take_line())
            }
            LF if after_cr => None,
            LF => Some(self.take_line()),
            _ => None,
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();
        line
    }
}

/// Read `reader` to end of stream, sending every decoded line to `lines`.
///
/// Returns early without error when the receiving side has gone away.
pub async fn decode_stream<R>(mut reader: R, lines: mpsc::Sender<String>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for line in decoder.decode(&buf[..n]) {
            if lines.send(line).await.is_err() {
                return Ok(());
            }
        }
    }

    if let Some(line) = decoder.finish() {
        let _ = lines.send(line).await;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
