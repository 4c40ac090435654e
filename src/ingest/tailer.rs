// * Access Log Tailer
// * Reads the beacon log line by line forever, waiting at end of file for new data

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::ops::telemetry::PipelineStats;

#[derive(Debug, Error)]
pub enum TailError {
    #[error("Cannot open log file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Follows one file from its beginning; consumed by [`Tailer::run`]
pub struct Tailer {
    path: PathBuf,
    reader: BufReader<File>,
    eof_backoff: Duration,
    progress_every: u64,
}

impl Tailer {
    /// Opens the file once; failure here is fatal for ingestion
    pub async fn open(
        path: impl AsRef<Path>,
        eof_backoff: Duration,
        progress_every: u64,
    ) -> Result<Self, TailError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|source| {
            warn!(path = %path.display(), error = %source, "Cannot open log file");
            TailError::Open {
                path: path.clone(),
                source,
            }
        })?;

        Ok(Self {
            path,
            reader: BufReader::new(file),
            eof_backoff,
            progress_every: progress_every.max(1),
        })
    }

    /// Streams complete lines into `tx` until cancelled or the queue closes
    ///
    /// Never reopens or seeks: after a pause at end of file, reading resumes
    /// from the current position. A trailing line without its newline is held
    /// back until the writer finishes it. Cancellation is only observed between
    /// lines, so a line that has been read is always handed off. Returns the
    /// number of lines sent.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<String>,
        token: CancellationToken,
        stats: Arc<PipelineStats>,
    ) -> u64 {
        let mut pending: Vec<u8> = Vec::new();
        let mut count: u64 = 0;

        info!(path = %self.path.display(), "Tailer started");

        loop {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                read = self.reader.read_until(b'\n', &mut pending) => read,
            };

            match read {
                Ok(0) => {
                    debug!(lines = count, "Reached end of file, waiting for more data");
                    if !self.pause(&token).await {
                        break;
                    }
                }
                Ok(_) if pending.last() != Some(&b'\n') => {
                    // * Partial line at end of file; wait for the rest
                    if !self.pause(&token).await {
                        break;
                    }
                }
                Ok(_) => {
                    let line = decode_line(&pending);
                    pending.clear();

                    trace!(line = %line, "line");

                    // * Not cancellable: parsers drain until this sender drops
                    if tx.send(line).await.is_err() {
                        warn!("Line queue closed, tailer stopping");
                        break;
                    }
                    count += 1;
                    stats.record_line();
                    if count % self.progress_every == 0 {
                        info!(lines = count, "Tailer progress");
                    }
                }
                Err(e) => {
                    warn!(error = %e, lines = count, "Read error on log file, continuing");
                    if !self.pause(&token).await {
                        break;
                    }
                }
            }
        }

        if !pending.is_empty() {
            debug!(bytes = pending.len(), "Discarding unterminated trailing line");
        }
        info!(lines = count, "Tailer stopped");
        count
    }

    // * Returns false when cancelled during the pause
    async fn pause(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(self.eof_backoff) => true,
        }
    }
}

// * Strips the line terminator and replaces invalid UTF-8
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
