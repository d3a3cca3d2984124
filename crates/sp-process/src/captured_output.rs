//! Buffers a child's stdout/stderr from spawn time and forwards it to the log.

use std::borrow::Cow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

/// Keep only the tail of very chatty servers.
pub(crate) const MAX_CAPTURED_BYTES: usize = 64 * 1024;

/// Consecutive read errors tolerated before a pipe is abandoned.
const MAX_READ_FAILURES: u32 = 16;

/// Output a child wrote since it was spawned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Live capture attached to one child's pipes.
pub(crate) struct OutputCapture {
    buffer: Arc<Mutex<CapturedOutput>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl OutputCapture {
    pub(crate) fn attach(
        pid: u32,
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
    ) -> Self {
        let buffer = Arc::new(Mutex::new(CapturedOutput::default()));
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = stdout {
            readers.push(forward(pid, stdout, Stream::Stdout, Arc::clone(&buffer)));
        }
        if let Some(stderr) = stderr {
            readers.push(forward(pid, stderr, Stream::Stderr, Arc::clone(&buffer)));
        }

        Self {
            buffer,
            readers: Mutex::new(readers),
        }
    }

    /// Output captured so far.
    pub(crate) fn snapshot(&self) -> CapturedOutput {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait (bounded) for both pipes to reach EOF, then snapshot.
    ///
    /// A grandchild can keep a pipe open after the child exits, so the wait
    /// gives up after `timeout` and returns what was read.
    pub(crate) async fn drain(&self, timeout: Duration) -> CapturedOutput {
        let readers: Vec<JoinHandle<()>> = self
            .readers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let _ = tokio::time::timeout(timeout, async {
            for reader in readers {
                let _ = reader.await;
            }
        })
        .await;

        self.snapshot()
    }
}

fn forward<R>(
    pid: u32,
    stream: R,
    kind: Stream,
    buffer: Arc<Mutex<CapturedOutput>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::new();
        let mut failures = 0u32;

        // The pipe stays open until EOF; closing it early would SIGPIPE the child
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => failures = 0,
                Err(e) => {
                    failures += 1;
                    if failures > MAX_READ_FAILURES {
                        warn!("Giving up on output of server (pid {pid}): {e}");
                        break;
                    }
                    debug!("Read error on output of server (pid {pid}): {e}");
                    continue;
                }
            }

            let line = decode_line(&raw);
            info!("[server:{pid}] {line}");

            let mut captured = buffer.lock().unwrap_or_else(PoisonError::into_inner);
            let target = match kind {
                Stream::Stdout => &mut captured.stdout,
                Stream::Stderr => &mut captured.stderr,
            };
            push_bounded(target, &line);
        }
    })
}

/// One raw output line without its terminator, invalid UTF-8 replaced.
pub(crate) fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let trimmed = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed)
}

pub(crate) fn push_bounded(target: &mut String, line: &str) {
    target.push_str(line);
    target.push('\n');

    if target.len() > MAX_CAPTURED_BYTES {
        let mut cut = target.len() - MAX_CAPTURED_BYTES;
        while !target.is_char_boundary(cut) {
            cut += 1;
        }
        target.drain(..cut);
    }
}
