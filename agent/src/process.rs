// SPDX-License-Identifier: Apache-2.0

//! `ProcessRunner`: the single point through which the agent spawns child
//! processes (`ping`/`ping6`, `ip route …`). Centralizing it keeps timeout
//! and error-logging behavior consistent across every subprocess call, the
//! way the teacher's `Frrmi` centralizes all traffic to the external
//! `frr-agent` process behind one timeout policy.

use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn '{0}': {1}")]
    Spawn(String, std::io::Error),

    #[error("io error communicating with '{0}': {1}")]
    Io(String, std::io::Error),

    #[error("'{0}' did not complete within {1:?}")]
    Timeout(String, Duration),
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutcome {
    pub fn succeeded(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }
}

/// Spawns a process with the given arguments, optionally feeding it
/// `stdin_payload` before closing its stdin, and enforces `timeout` across
/// the whole invocation (spawn + optional write + wait).
pub struct ProcessRunner;

impl ProcessRunner {
    pub async fn run(
        program: &str,
        args: &[impl AsRef<OsStr>],
        stdin_payload: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<ProcessOutcome, ProcessError> {
        let fut = Self::run_inner(program, args, stdin_payload);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProcessError::Timeout(program.to_string(), timeout)),
        }
    }

    async fn run_inner(
        program: &str,
        args: &[impl AsRef<OsStr>],
        stdin_payload: Option<&[u8]>,
    ) -> Result<ProcessOutcome, ProcessError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| ProcessError::Spawn(program.to_string(), e))?;

        if let Some(payload) = stdin_payload {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(payload)
                    .await
                    .map_err(|e| ProcessError::Io(program.to_string(), e))?;
            }
        } else {
            // Close stdin so children that read until EOF don't hang.
            drop(child.stdin.take());
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProcessError::Io(program.to_string(), e))?;

        Ok(ProcessOutcome {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
