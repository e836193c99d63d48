//! Incremental detection of the blank line that ends a header block.
//!
//! [`HeaderBoundaryScanner`] is an [`io::Write`] sink: a whole message can
//! be streamed through it and only the header bytes are kept. Once the
//! boundary is found (or the byte limit is hit) every further byte is
//! discarded, so memory stays bounded regardless of message size.

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Inside a header line.
    InLine,
    /// Just after a line terminator.
    LineStart,
    /// A CR at the very start of a line.
    LineStartCr,
    /// Boundary found or limit reached; input is discarded.
    Done,
}

/// How the scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Still scanning.
    Pending,
    /// Found the blank line.
    Boundary { header_len: usize, body_offset: usize },
    /// Gave up after `limit` bytes without a boundary.
    LimitReached,
}

/// Stateful header/body boundary detector.
///
/// A line terminator is LF, optionally preceded by CR. The header block ends
/// at the first empty line, i.e. two consecutive terminators (`CRLF CRLF`,
/// `LF LF`, or a mix). The start of the stream counts as a line start, so a
/// message opening with a blank line has an empty header block.
#[derive(Debug)]
pub struct HeaderBoundaryScanner {
    state: State,
    /// Total bytes fed so far (including discarded ones).
    position: usize,
    /// Offset of the current line's first byte.
    line_start: usize,
    retained: Vec<u8>,
    limit: usize,
    outcome: ScanOutcome,
}

impl Default for HeaderBoundaryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderBoundaryScanner {
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Stop buffering after `limit` bytes if no boundary has been seen.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: State::LineStart,
            position: 0,
            line_start: 0,
            retained: Vec::new(),
            limit,
            outcome: ScanOutcome::Pending,
        }
    }

    /// Feed a chunk. Chunks may split a terminator anywhere.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.state == State::Done {
            self.position += chunk.len();
            return;
        }

        for (i, &byte) in chunk.iter().enumerate() {
            let offset = self.position + i;
            if offset >= self.limit {
                self.retained.extend_from_slice(&chunk[..i]);
                self.position += chunk.len();
                self.state = State::Done;
                self.outcome = ScanOutcome::LimitReached;
                return;
            }

            self.state = match (self.state, byte) {
                (State::LineStart, b'\n') | (State::LineStartCr, b'\n') => {
                    let header_len = self.line_start;
                    let body_offset = offset + 1;
                    self.retained.extend_from_slice(&chunk[..i]);
                    self.retained.truncate(header_len);
                    self.position += chunk.len();
                    self.state = State::Done;
                    self.outcome = ScanOutcome::Boundary {
                        header_len,
                        body_offset,
                    };
                    return;
                }
                (State::LineStart, b'\r') => State::LineStartCr,
                (_, b'\n') => {
                    self.line_start = offset + 1;
                    State::LineStart
                }
                _ => State::InLine,
            };
        }

        self.retained.extend_from_slice(chunk);
        self.position += chunk.len();
    }

    pub fn outcome(&self) -> ScanOutcome {
        self.outcome
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Length of the header block, terminator of its last line included.
    pub fn header_len(&self) -> Option<usize> {
        match self.outcome {
            ScanOutcome::Boundary { header_len, .. } => Some(header_len),
            _ => None,
        }
    }

    /// Offset of the first body byte.
    pub fn body_offset(&self) -> Option<usize> {
        match self.outcome {
            ScanOutcome::Boundary { body_offset, .. } => Some(body_offset),
            _ => None,
        }
    }

    /// Total bytes fed, discarded ones included.
    pub fn bytes_seen(&self) -> usize {
        self.position
    }

    /// The header bytes. Without a boundary the whole (possibly
    /// limit-truncated) stream is treated as header region.
    pub fn into_header_bytes(self) -> Vec<u8> {
        self.retained
    }

    pub fn header_bytes(&self) -> &[u8] {
        &self.retained
    }
}

impl io::Write for HeaderBoundaryScanner {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.feed(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Offset of the first body byte in `data`, if there is a header boundary.
pub fn find_body_offset(data: &[u8]) -> Option<usize> {
    let mut scanner = HeaderBoundaryScanner::new();
    scanner.feed(data);
    scanner.body_offset()
}
