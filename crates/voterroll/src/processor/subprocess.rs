use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::{parse_worker_output, ExtractedVoter, PageRange, VoterExtractor};
use crate::config::OcrConfig;
use crate::error::ExtractError;
use crate::sanitize::redact_path;

/// Diagnostics beyond this are drained but not kept.
const STDERR_CAPTURE_BYTES: usize = 64 * 1024;

/// Runs the OCR worker as `program args... <file> [start] [end]`.
#[derive(Debug, Clone)]
pub struct SubprocessExtractor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl SubprocessExtractor {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
            max_output_bytes,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            config.timeout(),
            config.max_output_bytes,
        )
    }

    /// Runs the worker to completion and returns its stdout.
    async fn run(&self, file_path: &Path, pages: PageRange) -> Result<String, ExtractError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(file_path)
            .args(pages.worker_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| ExtractError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("worker stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("worker stderr was not captured"))?;

        let limit = self.max_output_bytes;
        let outcome = tokio::time::timeout(self.timeout, async {
            let (out, err) = tokio::try_join!(read_capped(stdout, limit), read_diagnostics(stderr))?;
            let status = child.wait().await?;
            Ok::<_, ExtractError>((status, out, err))
        })
        .await;

        let (status, out, err) = match outcome {
            Ok(Ok(finished)) => finished,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(ExtractError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let diagnostics = String::from_utf8_lossy(&err).trim().to_string();
        if !status.success() {
            return Err(ExtractError::Subprocess {
                status: status.to_string(),
                stderr: diagnostics,
            });
        }
        if !diagnostics.is_empty() {
            tracing::debug!(diagnostics = %diagnostics, "OCR worker diagnostics");
        }

        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

#[async_trait]
impl VoterExtractor for SubprocessExtractor {
    async fn extract(
        &self,
        file_path: &Path,
        pages: PageRange,
    ) -> Result<Vec<ExtractedVoter>, ExtractError> {
        tracing::info!(
            program = %self.program,
            file = %redact_path(file_path),
            start_page = ?pages.start,
            end_page = ?pages.end,
            "Running OCR worker"
        );
        let stdout = self.run(file_path, pages).await?;
        parse_worker_output(&stdout)
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: R, limit: usize) -> Result<Vec<u8>, ExtractError> {
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > limit {
        return Err(ExtractError::OutputTooLarge { limit });
    }
    Ok(buf)
}

async fn read_diagnostics<R: AsyncRead + Unpin>(mut reader: R) -> Result<Vec<u8>, ExtractError> {
    let mut buf = Vec::new();
    (&mut reader)
        .take(STDERR_CAPTURE_BYTES as u64)
        .read_to_end(&mut buf)
        .await?;
    // keep the pipe drained so the worker never blocks on a full stderr
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(buf)
}
