// src/connection/outbound.rs

use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encoded frames waiting to be written, with a cursor into the first one so a
/// partial write resumes where it stopped.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    frames: VecDeque<Bytes>,
    cursor: usize,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Bytes) {
        if !frame.is_empty() {
            self.frames.push_back(frame);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bytes still to be written, excluding what the cursor has already passed.
    pub fn pending_bytes(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum::<usize>() - self.cursor
    }

    /// Writes every queued frame to `writer`, in order, then flushes it.
    pub async fn flush_to<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(front) = self.frames.front() {
            let written = writer.write(&front[self.cursor..]).await?;
            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting data",
                ));
            }
            self.cursor += written;
            if self.cursor == front.len() {
                self.frames.pop_front();
                self.cursor = 0;
            }
        }
        writer.flush().await
    }
}
