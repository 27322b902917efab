//! Process-group spawning, the cancellation watcher and fire-and-collect runs.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

use super::{ProcessError, ToolCommand};

/// Maximum stdout or stderr size captured per stream by [`run`] (10 MiB).
///
/// Output beyond the limit is read and discarded so the child never blocks
/// on a full pipe.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// A running tool that leads its own process group.
///
/// Canceling the scope passed to [`spawn`] kills the whole group. Dropping a
/// child that has not been waited for does the same.
#[derive(Debug)]
pub struct SupervisedChild {
    child: Child,
    pgid: i32,
    program: String,
    /// Canceled once the child has been reaped; releases the watcher.
    exited: CancellationToken,
}

/// Start `command` in a new process group with piped stdout and stderr.
pub fn spawn(
    scope: &CancellationToken,
    command: &ToolCommand,
) -> Result<SupervisedChild, ProcessError> {
    let program = command.display_name();

    let mut cmd = Command::new(command.program());
    cmd.args(command.arguments())
        .stdin(if command.stdin_bytes().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    if let Some(dir) = command.working_dir() {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let pgid = child
        .id()
        .ok_or_else(|| io::Error::other(format!("{program} exited before its pid was read")))?
        as i32;

    tracing::debug!(program = %program, pgid, "Spawned tool process");

    if let (Some(mut stdin), Some(bytes)) = (child.stdin.take(), command.stdin_bytes()) {
        let bytes = bytes.to_vec();
        tokio::spawn(async move {
            // The tool may exit without reading its input.
            let _ = stdin.write_all(&bytes).await;
        });
    }

    let exited = CancellationToken::new();
    let watcher_scope = scope.clone();
    let watcher_exited = exited.clone();
    let watcher_program = program.clone();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = watcher_exited.cancelled() => {}
            _ = watcher_scope.cancelled() => {
                tracing::info!(program = %watcher_program, pgid, "Killing canceled process group");
                kill_process_group(pgid);
            }
        }
    });

    Ok(SupervisedChild {
        child,
        pgid,
        program,
        exited,
    })
}

impl SupervisedChild {
    pub fn pid(&self) -> i32 {
        self.pgid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the group leader to exit and release the watcher.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        let status = self.child.wait().await?;
        self.exited.cancel();
        Ok(status)
    }
}

impl Drop for SupervisedChild {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            kill_process_group(self.pgid);
        }
        self.exited.cancel();
    }
}

/// Send `SIGKILL` to every process in the group led by `pgid`.
pub(crate) fn kill_process_group(pgid: i32) {
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            pgid,
            error = %io::Error::last_os_error(),
            "Process group already gone"
        );
    }
}

/// Run `command` to completion and return its output, stdout followed by
/// stderr.
///
/// A non-zero exit yields [`ProcessError::Failed`] carrying the output. If
/// `scope` is canceled first, the process group is killed and
/// [`ProcessError::Canceled`] is returned.
pub async fn run(scope: &CancellationToken, command: &ToolCommand) -> Result<String, ProcessError> {
    let mut child = spawn(scope, command)?;
    let program = child.program().to_string();
    let pgid = child.pid();
    let stdout = child.take_stdout();
    let stderr = child.take_stderr();

    // Helpers forked by the tool may hold the pipes open after the leader exits.
    let collected = tokio::select! {
        biased;
        _ = scope.cancelled() => None,
        collected = async {
            tokio::try_join!(
                child.wait(),
                read_output(&program, stdout),
                read_output(&program, stderr),
            )
        } => Some(collected),
    };
    let Some(collected) = collected else {
        kill_process_group(pgid);
        return Err(ProcessError::Canceled { program });
    };
    let (status, stdout, stderr) = collected?;

    let mut output = String::from_utf8_lossy(&stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&stderr));

    if !status.success() {
        return Err(ProcessError::Failed {
            program,
            exit_code: status.code(),
            output,
        });
    }
    Ok(output)
}

async fn read_output<R: AsyncRead + Unpin>(
    program: &str,
    handle: Option<R>,
) -> Result<Vec<u8>, ProcessError> {
    read_capped(handle)
        .await
        .map_err(|source| ProcessError::Read {
            program: program.to_string(),
            source,
        })
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await?;
        tokio::io::copy(&mut h, &mut tokio::io::sink()).await?;
    }
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
