// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The framed transport: a symmetric, length-independent, line-delimited
//! JSON codec. The codec never inspects message semantics; it only
//! produces a tagged [`Envelope`] per line, or reports that a line failed
//! to parse without losing the stream's place.

use crate::envelope::Envelope;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Lines longer than this are rejected loudly rather than silently
/// truncated or allowed to grow the buffer without bound.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1 << 20; // 1 MiB

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line exceeded {limit} bytes (read {len} so far)")]
    OversizeLine { limit: usize, len: usize },
}

/// Outcome of attempting to read one frame.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A line parsed cleanly into a typed envelope.
    Envelope(Envelope),
    /// A non-empty line that failed to parse as an envelope. The reader
    /// is positioned at the next line boundary — this does not
    /// desynchronize the stream.
    ParseError { raw: String, error: String },
    /// The stream has ended (stdin/stdout EOF).
    EndOfStream,
}

/// Reads one NDJSON-framed [`Envelope`] at a time from an async byte
/// stream, tolerant of a final partial line at EOF.
pub struct FramedReader<R> {
    reader: R,
    max_line_bytes: usize,
}

impl<R: AsyncBufRead + Unpin> FramedReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_line_bytes(reader, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(reader: R, max_line_bytes: usize) -> Self {
        Self { reader, max_line_bytes }
    }

    /// Reads and parses the next line. Empty lines are skipped. A line
    /// that exceeds `max_line_bytes` before a newline is found returns
    /// [`TransportError::OversizeLine`] rather than silently desyncing.
    pub async fn read_next(&mut self) -> Result<ReadOutcome, TransportError> {
        loop {
            let mut line_buf: Vec<u8> = Vec::new();
            let mut saw_any_bytes = false;
            loop {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    if !saw_any_bytes {
                        return Ok(ReadOutcome::EndOfStream);
                    }
                    // Partial line at true EOF: tolerate it, try to parse
                    // what we have.
                    break;
                }
                saw_any_bytes = true;
                if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                    line_buf.extend_from_slice(&available[..pos]);
                    self.reader.consume(pos + 1);
                    break;
                }
                line_buf.extend_from_slice(available);
                let consumed = available.len();
                self.reader.consume(consumed);
                if line_buf.len() > self.max_line_bytes {
                    return Err(TransportError::OversizeLine {
                        limit: self.max_line_bytes,
                        len: line_buf.len(),
                    });
                }
            }

            while line_buf.last() == Some(&b'\r') {
                line_buf.pop();
            }
            if line_buf.is_empty() {
                continue;
            }

            let text = String::from_utf8_lossy(&line_buf).into_owned();
            return Ok(match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => ReadOutcome::Envelope(envelope),
                Err(e) => ReadOutcome::ParseError { raw: text, error: e.to_string() },
            });
        }
    }
}

/// Writes one NDJSON-framed [`Envelope`] at a time to an async byte sink.
pub struct FramedWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_envelope(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(envelope).map_err(|e| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
