use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};

use super::frame::Frame;
use crate::errors::{ChatError, ChatResult};

/// Incremental decoder turning raw chunks into frames.
///
/// Chunks can split a frame (or a multi-byte character) anywhere, so bytes are
/// buffered until a newline completes a line. Once a decode error has been
/// returned the decoder refuses further input.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    // bytes of `buffer` already searched for a newline
    scanned: usize,
    failed: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a chunk as it arrived from the transport
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Number of buffered bytes not yet decoded into a frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete frame, if a full line is buffered
    pub fn next_frame(&mut self) -> ChatResult<Option<Frame>> {
        self.ensure_usable()?;

        loop {
            let newline = self.buffer[self.scanned..]
                .iter()
                .position(|byte| *byte == b'\n')
                .map(|offset| self.scanned + offset);

            let Some(end) = newline else {
                self.scanned = self.buffer.len();
                return Ok(None);
            };

            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            self.scanned = 0;

            if let Some(frame) = self.decode_line(&line[..line.len() - 1])? {
                return Ok(Some(frame));
            }
        }
    }

    /// Decode whatever is left once the stream has ended.
    ///
    /// A final line without a trailing newline is still a frame; leftovers that
    /// do not decode mean the stream was truncated mid-frame.
    pub fn finish(&mut self) -> ChatResult<Option<Frame>> {
        self.ensure_usable()?;
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        self.decode_line(&rest)
    }

    fn ensure_usable(&self) -> ChatResult<()> {
        if self.failed {
            return Err(ChatError::ProtocolDecode(
                "decoder cannot continue after a malformed frame".to_string(),
            ));
        }
        Ok(())
    }

    fn decode_line(&mut self, raw: &[u8]) -> ChatResult<Option<Frame>> {
        let result = std::str::from_utf8(raw)
            .map_err(|e| ChatError::ProtocolDecode(format!("frame is not valid UTF-8: {}", e)))
            .and_then(|line| {
                let line = line.strip_suffix('\r').unwrap_or(line);
                if line.trim().is_empty() {
                    Ok(None)
                } else {
                    Frame::parse_line(line).map(Some)
                }
            });

        if result.is_err() {
            self.failed = true;
            self.buffer.clear();
        }
        result
    }
}

/// Lazily decode a chunk stream into a frame stream.
///
/// The returned stream ends after the first error, whether it came from the
/// transport or from a malformed frame.
pub fn decode_frames<S>(chunks: S) -> BoxStream<'static, ChatResult<Frame>>
where
    S: Stream<Item = ChatResult<Bytes>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut decoder = FrameDecoder::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => decoder.push(&bytes),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }

            loop {
                match decoder.next_frame() {
                    Ok(Some(frame)) => yield Ok(frame),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        match decoder.finish() {
            Ok(Some(frame)) => yield Ok(frame),
            Ok(None) => {}
            Err(e) => yield Err(e),
        }
    })
}
