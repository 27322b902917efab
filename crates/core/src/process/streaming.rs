//! Streaming runs: decoded output lines are handed out while the tool runs.

use std::collections::VecDeque;
use std::io;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::supervisor::{spawn, SupervisedChild};
use super::{ProcessError, ToolCommand};
use crate::terminal::decode_stream;

/// Capacity of the reader-to-handler line channel.
const LINE_CHANNEL_CAPACITY: usize = 64;

/// Number of trailing lines kept for the error report of a failed run.
const TAIL_LINES: usize = 20;

/// How a streaming run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Canceled,
}

/// A tool whose stdout and stderr are being decoded into lines.
///
/// Pull lines with [`next_line`](Self::next_line) until it returns `None`,
/// then call [`finish`](Self::finish) for the outcome. Lines from stdout and
/// stderr are interleaved in arrival order.
#[derive(Debug)]
pub struct StreamingRun {
    child: SupervisedChild,
    scope: CancellationToken,
    lines: mpsc::Receiver<String>,
    readers: Vec<JoinHandle<io::Result<()>>>,
    tail: VecDeque<String>,
}

/// Start `command` and decode its combined output.
pub fn run_streaming(
    scope: &CancellationToken,
    command: &ToolCommand,
) -> Result<StreamingRun, ProcessError> {
    let mut child = spawn(scope, command)?;
    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.take_stdout() {
        readers.push(tokio::spawn(decode_stream(stdout, tx.clone())));
    }
    if let Some(stderr) = child.take_stderr() {
        readers.push(tokio::spawn(decode_stream(stderr, tx)));
    }

    Ok(StreamingRun {
        child,
        scope: scope.clone(),
        lines: rx,
        readers,
        tail: VecDeque::with_capacity(TAIL_LINES),
    })
}

impl StreamingRun {
    /// Next completed output line. `None` at end of output or once the scope
    /// is canceled.
    pub async fn next_line(&mut self) -> Option<String> {
        if self.scope.is_cancelled() {
            return None;
        }

        let line = tokio::select! {
            biased;
            _ = self.scope.cancelled() => None,
            line = self.lines.recv() => line,
        }?;

        if self.tail.len() == TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.clone());
        Some(line)
    }

    /// Drain any remaining output, reap the tool and report the outcome.
    pub async fn finish(mut self) -> Result<StreamOutcome, ProcessError> {
        while self.next_line().await.is_some() {}

        let status = self.child.wait().await?;

        if self.scope.is_cancelled() && !status.success() {
            for reader in &self.readers {
                reader.abort();
            }
            return Ok(StreamOutcome::Canceled);
        }

        for reader in self.readers.drain(..) {
            match reader.await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    return Err(ProcessError::Read {
                        program: self.child.program().to_string(),
                        source,
                    })
                }
                Err(e) => return Err(ProcessError::Io(io::Error::other(e))),
            }
        }

        if !status.success() {
            return Err(ProcessError::Failed {
                program: self.child.program().to_string(),
                exit_code: status.code(),
                output: Vec::from(std::mem::take(&mut self.tail)).join("\n"),
            });
        }
        Ok(StreamOutcome::Completed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("/bin/sh").args(["-c", script])
    }

    async fn collect(run: &mut StreamingRun) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = run.next_line().await {
            lines.push(line);
        }
        lines
    }

    /// True once `pid` no longer exists or is a zombie awaiting its reaper.
    fn process_gone(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        }
    }

    #[tokio::test]
    async fn progress_redraws_arrive_as_lines() {
        let scope = CancellationToken::new();
        let mut run = run_streaming(&scope, &sh(r"printf '5%%|\r10%%|\r20%%|\n'")).unwrap();

        assert_eq!(collect(&mut run).await, vec!["5%|", "10%|", "20%|"]);
        assert_eq!(run.finish().await.unwrap(), StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn stderr_is_part_of_the_stream() {
        let scope = CancellationToken::new();
        let mut run = run_streaming(&scope, &sh("echo out; echo err >&2")).unwrap();

        let mut lines = collect(&mut run).await;
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
        assert_eq!(run.finish().await.unwrap(), StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn failure_reports_trailing_output() {
        let scope = CancellationToken::new();
        let run = run_streaming(&scope, &sh("echo loading; echo 'model missing'; exit 4")).unwrap();

        assert_matches!(
            run.finish().await,
            Err(ProcessError::Failed { exit_code: Some(4), output, .. }) if output == "loading\nmodel missing"
        );
    }

    #[tokio::test]
    async fn cancel_kills_the_whole_process_group() {
        let scope = CancellationToken::new();
        let mut run = run_streaming(
            &scope,
            &sh("trap '' TERM; sleep 30 & echo $!; wait"),
        )
        .unwrap();

        let grandchild: i32 = run
            .next_line()
            .await
            .expect("grandchild pid line")
            .trim()
            .parse()
            .unwrap();
        let leader = run.child.pid();

        scope.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), run.finish())
            .await
            .expect("canceled run should finish promptly")
            .unwrap();
        assert_eq!(outcome, StreamOutcome::Canceled);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !(process_gone(grandchild) && process_gone(leader)) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "process group survived cancellation"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn no_lines_after_cancellation() {
        let scope = CancellationToken::new();
        let mut run = run_streaming(&scope, &sh("while true; do echo tick; sleep 0.05; done")).unwrap();

        assert_eq!(run.next_line().await.as_deref(), Some("tick"));
        scope.cancel();
        assert_eq!(run.next_line().await, None);
        assert_eq!(run.finish().await.unwrap(), StreamOutcome::Canceled);
    }
}
