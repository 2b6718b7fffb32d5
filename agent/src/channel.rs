// SPDX-License-Identifier: Apache-2.0

//! `MessageChannel`: the single bidirectional coupling to the BGP speaker.
//! Reads newline-delimited JSON on one descriptor, writes newline-terminated
//! command lines on another, mutually exclusive on the write side.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("operation timed out")]
    Timeout,

    #[error("channel closed")]
    ChannelClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// A line-oriented channel to the BGP speaker. Cloning shares the
/// underlying reader/writer, so every clone's `write_line` calls are
/// serialized by the same lock — the only mechanism that orders bytes on
/// the wire to the speaker.
#[derive(Clone)]
pub struct MessageChannel {
    reader: Arc<Mutex<BoxedReader>>,
    writer: Arc<Mutex<BoxedWriter>>,
}

impl MessageChannel {
    /// Couples to the speaker over this process's own stdio: the speaker
    /// is expected to have spawned the agent with its stdout piped to our
    /// stdin and our stdout piped back to its stdin.
    pub fn from_stdio() -> Self {
        Self::new(
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(tokio::io::stdout()),
        )
    }

    /// Couples to the speaker over a pair of named pipes, per the optional
    /// FIFO transport in the external-interface spec. `read_chunk_size` is
    /// accepted for interface parity with the spec's configuration key;
    /// `BufReader`'s internal buffer plays the same role here.
    pub async fn from_fifos(
        in_pipe: &str,
        out_pipe: &str,
        read_chunk_size: usize,
    ) -> Result<Self, ChannelError> {
        let in_file = tokio::fs::OpenOptions::new()
            .read(true)
            .open(in_pipe)
            .await?;
        let out_file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(out_pipe)
            .await?;
        Ok(Self::new(
            Box::new(BufReader::with_capacity(read_chunk_size, in_file)),
            Box::new(out_file),
        ))
    }

    fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Wires a channel to one end of an in-memory duplex pipe, returning
    /// the other end for a test to drive. Shared across this module's own
    /// tests and the Advertiser/Learner test suites.
    #[cfg(test)]
    pub(crate) fn test_pair() -> (Self, tokio::io::DuplexStream) {
        let (agent_side, test_side) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(agent_side);
        let channel = Self::new(Box::new(BufReader::new(read_half)), Box::new(write_half));
        (channel, test_side)
    }

    /// Yields one trimmed line. Fails with `Timeout` if no data arrives
    /// within `timeout`; fails with `ChannelClosed` on EOF. `timeout`
    /// defaults to unbounded (spec §5): pass `Duration::MAX` for that.
    pub async fn read_line(&self, timeout: Duration) -> Result<String, ChannelError> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        let read = tokio::time::timeout(timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| ChannelError::Timeout)??;
        if read == 0 {
            return Err(ChannelError::ChannelClosed);
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Appends `\n`, writes atomically under the write lock, and flushes.
    /// Fails with `Timeout` if the write does not complete within
    /// `timeout`; per spec the caller logs and continues rather than
    /// aborting its cycle.
    pub async fn write_line(&self, text: &str, timeout: Duration) -> Result<(), ChannelError> {
        let mut writer = self.writer.lock().await;
        let fut = async {
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| ChannelError::Timeout)??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn test_channel() -> (MessageChannel, DuplexStream) {
        MessageChannel::test_pair()
    }

    #[tokio::test]
    async fn read_line_trims_newline() {
        let (channel, mut test_side) = test_channel();
        test_side.write_all(b"hello world\n").await.unwrap();
        let line = channel.read_line(Duration::from_secs(1)).await.unwrap();
        assert_eq!(line, "hello world");
    }

    #[tokio::test]
    async fn read_line_times_out_without_data() {
        let (channel, _test_side) = test_channel();
        let result = channel.read_line(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ChannelError::Timeout)));
    }

    #[tokio::test]
    async fn read_line_reports_closed_on_eof() {
        let (channel, test_side) = test_channel();
        drop(test_side);
        let result = channel.read_line(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ChannelError::ChannelClosed)));
    }

    #[tokio::test]
    async fn write_line_appends_newline_and_flushes() {
        let (channel, mut test_side) = test_channel();
        channel
            .write_line("announce route 70::/32 next-hop 2000:69::1", Duration::from_secs(1))
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let n = test_side.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"announce route 70::/32 next-hop 2000:69::1\n");
    }

    #[tokio::test]
    async fn concurrent_writers_are_serialized() {
        let (channel, mut test_side) = test_channel();
        let a = channel.clone();
        let b = channel.clone();
        let (r1, r2) = tokio::join!(
            a.write_line("line-a", Duration::from_secs(1)),
            b.write_line("line-b", Duration::from_secs(1))
        );
        r1.unwrap();
        r2.unwrap();
        let mut buf = Vec::new();
        test_side.read_buf(&mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        // Each write is atomic: either full line appears, never interleaved.
        assert!(text == "line-a\nline-b\n" || text == "line-b\nline-a\n");
    }
}
