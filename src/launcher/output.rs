// src/launcher/output.rs

//! Continuous draining of child output pipes.
//!
//! A child whose stdout/stderr pipe is never read blocks once the OS pipe
//! buffer fills up. Every pipe handed out by [`super::process::BotProcess`]
//! is therefore read to EOF by one of these tasks, whether or not anybody is
//! interested in the output.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which pipe a drain task is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Spawn a task that reads `reader` line by line until EOF, logging each line
/// at debug under `label`.
///
/// Lines are split on `\n` and decoded lossily, so non-UTF-8 output does not
/// stop the drain. Returns the number of lines read when the pipe closes.
pub fn spawn_drain<R>(label: String, stream: Stream, reader: R) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        let mut lines = 0u64;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    lines += 1;
                    let line = String::from_utf8_lossy(&buf);
                    debug!(bot = %label, stream = stream.as_str(), "{}", line.trim_end());
                }
                Err(e) => {
                    warn!(
                        bot = %label,
                        stream = stream.as_str(),
                        error = %e,
                        "error reading child output; stopping drain"
                    );
                    break;
                }
            }
        }

        debug!(bot = %label, stream = stream.as_str(), lines, "child output closed");
        lines
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_non_utf8_output_to_eof() {
        let data: &[u8] = b"hello\n\xff\xfe broken\nlast line without newline";
        let handle = spawn_drain("test".to_string(), Stream::Stdout, data);
        assert_eq!(handle.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn drains_large_output() {
        let data = vec![b'x'; 1 << 20];
        let handle = spawn_drain("big".to_string(), Stream::Stderr, std::io::Cursor::new(data));
        assert_eq!(handle.await.unwrap(), 1);
    }
}
